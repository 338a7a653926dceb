use chrono::Local;
use serde::{Serialize, Serializer, ser::SerializeStruct};
use uuid::Uuid;

use crate::{geocode::LocationDetails, reviews::TravelerScores};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Output column order. `to_csv_row` must stay in step with it.
pub const CSV_COLUMNS: [&str; 30] = [
    "property_id",
    "scrape_timestamp",
    "property_url",
    "category",
    "general_review",
    "general_review_count",
    "comfort_score",
    "value_score",
    "location_score",
    "wifi_score",
    "avg_review_score_all",
    "avg_review_score_all_count",
    "avg_review_score_families",
    "avg_review_score_families_count",
    "avg_review_score_couples",
    "avg_review_score_couples_count",
    "avg_review_score_solo_travelers",
    "avg_review_score_solo_travelers_count",
    "avg_review_score_business_travellers",
    "avg_review_score_business_travellers_count",
    "avg_review_score_groups_friends",
    "avg_review_score_groups_friends_count",
    "min_price",
    "max_price",
    "latitude",
    "longitude",
    "address",
    "zone",
    "city",
    "wifi_speed",
];

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreAverage {
    pub average: f64,
    pub count: usize,
}

impl ScoreAverage {
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        if scores.is_empty() {
            return None;
        }
        Some(ScoreAverage {
            average: scores.iter().sum::<f64>() / scores.len() as f64,
            count: scores.len(),
        })
    }
}

/// One output row. Serialises flat, with the same field names and order as
/// `CSV_COLUMNS`.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyRecord {
    pub property_id: Uuid,
    pub scrape_timestamp: String,
    pub property_url: String,
    pub category: Option<String>,
    pub general_review: Option<f64>,
    pub general_review_count: Option<u64>,
    pub comfort_score: Option<f64>,
    pub value_score: Option<f64>,
    pub location_score: Option<f64>,
    pub wifi_score: Option<f64>,
    pub avg_review_score_all: Option<ScoreAverage>,
    pub avg_review_score_families: Option<ScoreAverage>,
    pub avg_review_score_couples: Option<ScoreAverage>,
    pub avg_review_score_solo_travelers: Option<ScoreAverage>,
    pub avg_review_score_business_travellers: Option<ScoreAverage>,
    pub avg_review_score_groups_friends: Option<ScoreAverage>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub zone: Option<String>,
    pub city: Option<String>,
    pub wifi_speed: Option<String>,
}

impl PropertyRecord {
    /// A record carrying only identity fields, stamped now.
    pub fn new(property_url: &str) -> Self {
        PropertyRecord {
            property_id: Uuid::new_v4(),
            scrape_timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            property_url: property_url.to_string(),
            category: None,
            general_review: None,
            general_review_count: None,
            comfort_score: None,
            value_score: None,
            location_score: None,
            wifi_score: None,
            avg_review_score_all: None,
            avg_review_score_families: None,
            avg_review_score_couples: None,
            avg_review_score_solo_travelers: None,
            avg_review_score_business_travellers: None,
            avg_review_score_groups_friends: None,
            min_price: None,
            max_price: None,
            latitude: None,
            longitude: None,
            address: None,
            zone: None,
            city: None,
            wifi_speed: None,
        }
    }

    pub fn apply_traveler_scores(&mut self, scores: &TravelerScores) {
        self.avg_review_score_all = scores.all;
        self.avg_review_score_families = scores.families;
        self.avg_review_score_couples = scores.couples;
        self.avg_review_score_solo_travelers = scores.solo_travelers;
        self.avg_review_score_business_travellers = scores.business_travellers;
        self.avg_review_score_groups_friends = scores.groups_friends;
    }

    pub fn apply_location(&mut self, location: LocationDetails) {
        self.address = location.address;
        self.zone = location.zone;
        self.city = location.city;
    }

    /// Average and count column names for each traveler group, with its
    /// value.
    fn review_groups(&self) -> [(&'static str, &'static str, Option<ScoreAverage>); 6] {
        [
            (
                "avg_review_score_all",
                "avg_review_score_all_count",
                self.avg_review_score_all,
            ),
            (
                "avg_review_score_families",
                "avg_review_score_families_count",
                self.avg_review_score_families,
            ),
            (
                "avg_review_score_couples",
                "avg_review_score_couples_count",
                self.avg_review_score_couples,
            ),
            (
                "avg_review_score_solo_travelers",
                "avg_review_score_solo_travelers_count",
                self.avg_review_score_solo_travelers,
            ),
            (
                "avg_review_score_business_travellers",
                "avg_review_score_business_travellers_count",
                self.avg_review_score_business_travellers,
            ),
            (
                "avg_review_score_groups_friends",
                "avg_review_score_groups_friends_count",
                self.avg_review_score_groups_friends,
            ),
        ]
    }

    /// Row in `CSV_COLUMNS` order. Missing text and coordinates are written
    /// empty, missing numbers as 0.
    pub fn to_csv_row(&self) -> Vec<String> {
        let mut row = vec![
            self.property_id.to_string(),
            self.scrape_timestamp.clone(),
            self.property_url.clone(),
            text_or_empty(&self.category),
            number_or_zero(self.general_review),
            number_or_zero(self.general_review_count),
            number_or_zero(self.comfort_score),
            number_or_zero(self.value_score),
            number_or_zero(self.location_score),
            number_or_zero(self.wifi_score),
        ];
        for (_, _, group) in self.review_groups() {
            row.push(number_or_zero(group.map(|g| g.average)));
            row.push(number_or_zero(group.map(|g| g.count)));
        }
        row.extend([
            number_or_zero(self.min_price),
            number_or_zero(self.max_price),
            number_or_empty(self.latitude),
            number_or_empty(self.longitude),
            text_or_empty(&self.address),
            text_or_empty(&self.zone),
            text_or_empty(&self.city),
            text_or_empty(&self.wifi_speed),
        ]);
        row
    }
}

impl Serialize for PropertyRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut row = serializer.serialize_struct("PropertyRecord", CSV_COLUMNS.len())?;
        row.serialize_field("property_id", &self.property_id)?;
        row.serialize_field("scrape_timestamp", &self.scrape_timestamp)?;
        row.serialize_field("property_url", &self.property_url)?;
        row.serialize_field("category", &self.category)?;
        row.serialize_field("general_review", &self.general_review)?;
        row.serialize_field("general_review_count", &self.general_review_count)?;
        row.serialize_field("comfort_score", &self.comfort_score)?;
        row.serialize_field("value_score", &self.value_score)?;
        row.serialize_field("location_score", &self.location_score)?;
        row.serialize_field("wifi_score", &self.wifi_score)?;
        for (average_column, count_column, group) in self.review_groups() {
            row.serialize_field(average_column, &group.map(|g| g.average))?;
            row.serialize_field(count_column, &group.map(|g| g.count))?;
        }
        row.serialize_field("min_price", &self.min_price)?;
        row.serialize_field("max_price", &self.max_price)?;
        row.serialize_field("latitude", &self.latitude)?;
        row.serialize_field("longitude", &self.longitude)?;
        row.serialize_field("address", &self.address)?;
        row.serialize_field("zone", &self.zone)?;
        row.serialize_field("city", &self.city)?;
        row.serialize_field("wifi_speed", &self.wifi_speed)?;
        row.end()
    }
}

fn text_or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn number_or_zero<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "0".to_string(), |v| v.to_string())
}

fn number_or_empty<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}
