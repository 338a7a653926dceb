use std::collections::HashMap;

use log::warn;
use reqwest::Url;
use serde::Deserialize;

use crate::{scraping_context::ScrapingContext, text_manipulators::strip_non_latin};

const ZONE_FIELDS: [&str; 5] = [
    "neighbourhood",
    "suburb",
    "quarter",
    "city_district",
    "district",
];
const CITY_FIELDS: [&str; 4] = ["city", "town", "municipality", "village"];

/// Subset of a Nominatim `/reverse?format=json` response.
#[derive(Debug, Deserialize)]
pub struct ReverseGeocodeResponse {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub address: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocationDetails {
    pub address: Option<String>,
    pub zone: Option<String>,
    pub city: Option<String>,
}

impl From<ReverseGeocodeResponse> for LocationDetails {
    fn from(response: ReverseGeocodeResponse) -> Self {
        let address = strip_non_latin(&response.display_name).replace(',', " ");
        let zone = ZONE_FIELDS
            .iter()
            .filter_map(|field| response.address.get(*field))
            .map(|value| strip_non_latin(value))
            .find(|value| !value.is_empty());
        let city = CITY_FIELDS
            .iter()
            .filter_map(|field| response.address.get(*field))
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty());
        LocationDetails {
            address: Some(address).filter(|a| !a.is_empty()),
            zone,
            city,
        }
    }
}

pub fn reverse_geocode_url(nominatim_url: &str, lat: f64, lon: f64) -> anyhow::Result<String> {
    let mut url = Url::parse(&format!("{nominatim_url}/reverse"))?;
    url.query_pairs_mut()
        .append_pair("format", "json")
        .append_pair("lat", &lat.to_string())
        .append_pair("lon", &lon.to_string())
        .append_pair("accept-language", "en");
    Ok(url.into())
}

/// Address, zone and city for a coordinate pair. Failures are logged and
/// yield empty details.
pub async fn reverse_geocode(ctx: &ScrapingContext, lat: f64, lon: f64) -> LocationDetails {
    let result = async {
        let url = reverse_geocode_url(&ctx.scraping_config.nominatim_url, lat, lon)?;
        ctx.request_client
            .fetch_json::<ReverseGeocodeResponse>(&url, &ctx.scraping_config.geocoder_user_agent)
            .await
    }
    .await;
    match result {
        Ok(response) => response.into(),
        Err(e) => {
            warn!("Error getting location for ({lat}, {lon}): {e:#}");
            LocationDetails::default()
        }
    }
}
