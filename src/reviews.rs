use std::{collections::HashMap, sync::LazyLock};

use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};

use crate::{
    error::ScrapeError,
    property::ScoreAverage,
    text_manipulators::{extract_text, own_text, parse_score},
};

pub const CUSTOMER_TYPE_ALL: &str = "ALL";
pub const CUSTOMER_TYPE_BUSINESS: &str = "BUSINESS_TRAVELLERS";
pub const REVIEWS_PER_PAGE: usize = 10;

static SCORED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Scored\s+(\d+(?:[.,]\d+)?)").expect("static regex")
});
static PROPERTY_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/hotel/([a-z]{2})/([^/?#]+?)(?:\.[a-z\-]+)?\.html").expect("static regex")
});

/// Traveler groups that get their own output columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TravelerGroup {
    Families,
    Couples,
    SoloTravelers,
    BusinessTravellers,
    GroupsFriends,
    Other(String),
}

/// Maps a review's traveler label ("Solo traveller", "Group of friends") to
/// its group.
pub fn normalize_traveler_type(label: &str) -> TravelerGroup {
    let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
    match normalized.as_str() {
        "couple" | "couples" => TravelerGroup::Couples,
        "group" | "group_of_friends" | "groups_friends" => TravelerGroup::GroupsFriends,
        "solo_traveler" | "solo_traveller" | "solo_travelers" => TravelerGroup::SoloTravelers,
        "family" | "families" => TravelerGroup::Families,
        "business_traveler" | "business_traveller" | "business_travellers" => {
            TravelerGroup::BusinessTravellers
        }
        _ => TravelerGroup::Other(normalized),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewCard {
    pub score: f64,
    pub traveler_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewPage {
    pub cards: Vec<ReviewCard>,
    pub has_next: bool,
    pub customer_types: Vec<String>,
}

pub fn parse_review_page(html: &str) -> ReviewPage {
    let document = Html::parse_document(html);
    let card_selector = Selector::parse(r#"[data-testid="review-card"]"#).unwrap();
    let traveler_selector = Selector::parse(r#"[data-testid="review-traveler-type"]"#).unwrap();
    let any_selector = Selector::parse("*").unwrap();
    let next_selector = Selector::parse("a.pagenext").unwrap();
    let option_selector = Selector::parse(r#"select[name="customerType"] option"#).unwrap();

    let mut cards = vec![];
    for card in document.select(&card_selector) {
        // Cards without a readable score are skipped, like a blank review.
        let Some(score) = card
            .select(&any_selector)
            .map(own_text)
            .find_map(|text| scored_value(&text))
        else {
            continue;
        };
        let traveler_type = card
            .select(&traveler_selector)
            .next()
            .map(|el| extract_text(el).trim().to_string())
            .filter(|t| !t.is_empty());
        cards.push(ReviewCard {
            score,
            traveler_type,
        });
    }

    let customer_types = document
        .select(&option_selector)
        .filter_map(|opt| opt.value().attr("value"))
        .map(str::to_string)
        .collect();

    ReviewPage {
        cards,
        has_next: document.select(&next_selector).next().is_some(),
        customer_types,
    }
}

fn scored_value(text: &str) -> Option<f64> {
    let caps = SCORED.captures(text)?;
    parse_score(caps.get(1)?.as_str())
}

/// Review list endpoint for the property at `property_url`.
pub fn review_list_url(
    base_url: &str,
    property_url: &str,
    customer_type: &str,
    offset: usize,
) -> anyhow::Result<String> {
    let Some(caps) = PROPERTY_PATH.captures(property_url) else {
        return Err(ScrapeError::InvalidPropertyUrl(property_url.to_string()).into());
    };
    let country = &caps[1];
    let pagename = &caps[2];
    let mut url = Url::parse(&format!("{base_url}/reviewlist.html"))?;
    url.query_pairs_mut()
        .append_pair("cc1", country)
        .append_pair("pagename", pagename)
        .append_pair("type", "total")
        .append_pair("rows", &REVIEWS_PER_PAGE.to_string())
        .append_pair("offset", &offset.to_string())
        .append_pair("customer_type", customer_type);
    Ok(url.into())
}

/// Per-group averages plus the aggregate over every typed review.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TravelerScores {
    pub all: Option<ScoreAverage>,
    pub families: Option<ScoreAverage>,
    pub couples: Option<ScoreAverage>,
    pub solo_travelers: Option<ScoreAverage>,
    pub business_travellers: Option<ScoreAverage>,
    pub groups_friends: Option<ScoreAverage>,
}

impl TravelerScores {
    /// `business_override` holds the scores from a dedicated business
    /// traveller pass; when non-empty they replace the business group taken
    /// from `cards`. The aggregate only counts `cards`.
    pub fn from_cards(cards: &[ReviewCard], business_override: &[f64]) -> Self {
        let mut by_group: HashMap<TravelerGroup, Vec<f64>> = HashMap::new();
        let mut all = vec![];
        for card in cards {
            let Some(label) = &card.traveler_type else {
                continue;
            };
            all.push(card.score);
            by_group
                .entry(normalize_traveler_type(label))
                .or_default()
                .push(card.score);
        }
        if !business_override.is_empty() {
            by_group.insert(TravelerGroup::BusinessTravellers, business_override.to_vec());
        }

        let average = |group: TravelerGroup| {
            by_group
                .get(&group)
                .and_then(|scores| ScoreAverage::from_scores(scores))
        };
        TravelerScores {
            all: ScoreAverage::from_scores(&all),
            families: average(TravelerGroup::Families),
            couples: average(TravelerGroup::Couples),
            solo_travelers: average(TravelerGroup::SoloTravelers),
            business_travellers: average(TravelerGroup::BusinessTravellers),
            groups_friends: average(TravelerGroup::GroupsFriends),
        }
    }
}
