//! Field extraction from a server-rendered Booking.com property page.
//!
//! Every extractor is a pure function over the parsed document and returns
//! `None` when the field is absent, so one missing block never costs the rest
//! of the record. Booking reshuffles its markup often; where it has shipped
//! several layouts the selectors are tried from newest to oldest.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

use crate::text_manipulators::{digits_only, extract_text, own_text, parse_score};

pub const WIFI_SPEED_NOT_SPECIFIED: &str = "Not specified";

static PARENTHESISED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]+)\)").expect("static regex"));
static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("static regex"));
static CURRENCY_AMOUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[€$£]\s?(\d{2,5})").expect("static regex"));
static COORDINATE_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r#""latitude":([0-9.\-]+),"longitude":([0-9.\-]+)"#).expect("static regex"),
        Regex::new(r#""lat":([0-9.\-]+),"lng":([0-9.\-]+)"#).expect("static regex"),
    ]
});

const PRIMARY_PRICE_SELECTOR: &str = "td.hprt-table-cell-price div.hprt-price-block div.prco-wrapper span.prco-valign-middle-helper";
const FALLBACK_PRICE_SELECTORS: [&str; 7] = [
    "td.hp-price-left-align.hprt-table-cell.hprt-table-cell-price div.hprt-price-block span.prc-no-css",
    "td.hprt-table-cell-price span.prc-no-css",
    "div.hprt-price-block span.prc-no-css",
    "span[data-testid='price-and-discounted-price']",
    "div[data-testid='price-and-discounted-price']",
    "span.hprt-price-price-standard",
    "span.fcab3ed991.bd73d13072",
];

const SCORECARD: &str = "#js--hp-gallery-scorecard > a > div > div > div";
const SUBSCORE_BLOCK: &str = "div[data-testid=\"review-subscore\"]";
const SUBSCORE_VALUE: &str = "div[aria-hidden=\"true\"]";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceRange {
    pub min: u64,
    pub max: u64,
}

impl PriceRange {
    fn from_prices(prices: &[u64]) -> Option<Self> {
        Some(PriceRange {
            min: *prices.iter().min()?,
            max: *prices.iter().max()?,
        })
    }
}

/// Guest-review category scores. Each is out of 10.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SubScores {
    pub comfort: Option<f64>,
    pub value: Option<f64>,
    pub location: Option<f64>,
    pub wifi: Option<f64>,
}

/// Property type from the breadcrumb, e.g. "Riad Dar Anika (Riad) (Marrakech)".
pub fn extract_category(document: &Html) -> Option<String> {
    let element = document
        .select(&selector(r#"span[data-testid="breadcrumb-current"] span"#))
        .next()?;
    let text = extract_text(element).trim().to_string();
    if text.is_empty() {
        return None;
    }
    Some(normalize_category(&category_from_breadcrumb(&text)))
}

fn category_from_breadcrumb(text: &str) -> String {
    let groups: Vec<&str> = PARENTHESISED
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect();
    // The last group is usually the city, so the type sits one before it.
    match groups.as_slice() {
        [] => text.to_string(),
        [only] => only.to_string(),
        [.., category, _] => category.to_string(),
    }
}

pub fn normalize_category(category: &str) -> String {
    match category {
        "Guest House" => "Riad".to_string(),
        "Condo Hotel" => "Apartment-Hotel".to_string(),
        other => other.to_string(),
    }
}

pub fn extract_prices(document: &Html, raw_html: &str) -> Option<PriceRange> {
    let mut prices: Vec<u64> = document
        .select(&selector(PRIMARY_PRICE_SELECTOR))
        .filter_map(|el| digits_only(extract_text(el).trim()).parse().ok())
        .collect();

    if prices.is_empty() {
        for css in FALLBACK_PRICE_SELECTORS {
            for el in document.select(&selector(css)) {
                let text = extract_text(el).replace(',', "");
                let digits = DIGIT_RUN
                    .find_iter(text.trim())
                    .map(|m| m.as_str())
                    .collect::<String>();
                if let Ok(price) = digits.parse() {
                    prices.push(price);
                }
            }
        }
    }

    if prices.is_empty() {
        prices = CURRENCY_AMOUNT
            .captures_iter(raw_html)
            .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
            .collect();
    }

    PriceRange::from_prices(&prices)
}

/// Advertised connection speed, e.g. "Free WiFi • 47 Mbps" -> "47 Mbps".
pub fn extract_wifi_speed(document: &Html) -> String {
    document
        .select(&selector("div"))
        .find(|div| own_text(*div).contains("Mbps"))
        .and_then(|div| {
            extract_text(div)
                .split('•')
                .next_back()
                .map(|s| s.trim().to_string())
        })
        .filter(|speed| !speed.is_empty())
        .unwrap_or_else(|| WIFI_SPEED_NOT_SPECIFIED.to_string())
}

pub fn extract_general_review(document: &Html) -> Option<f64> {
    let element = document
        .select(&selector(&format!("{SCORECARD} > div:nth-of-type(2)")))
        .next()?;
    parse_score(&extract_text(element))
}

pub fn extract_general_review_count(document: &Html) -> Option<u64> {
    let element = document
        .select(&selector(&format!(
            "{SCORECARD} > div:nth-of-type(4) > div:nth-of-type(2)"
        )))
        .next()?;
    digits_only(&extract_text(element)).parse().ok()
}

/// Category scores, looked up by label first and by position second.
pub fn extract_sub_scores(document: &Html) -> SubScores {
    let value_selector = selector(SUBSCORE_VALUE);
    let mut scores = SubScores::default();
    let mut labelled = false;

    for block in document.select(&selector(SUBSCORE_BLOCK)) {
        let Some(value) = block.select(&value_selector).next() else {
            continue;
        };
        let score = parse_score(&extract_text(value));
        let label = extract_text(block)
            .to_lowercase()
            .replace(|c: char| c == '-' || c.is_whitespace(), "");
        let slot = if label.contains("wifi") {
            &mut scores.wifi
        } else if label.contains("comfort") {
            &mut scores.comfort
        } else if label.contains("value") {
            &mut scores.value
        } else if label.contains("location") {
            &mut scores.location
        } else {
            continue;
        };
        labelled = true;
        if slot.is_none() {
            *slot = score;
        }
    }

    if labelled {
        return scores;
    }

    // Unlabelled layout: staff, facilities, cleanliness, comfort, value,
    // location, wifi.
    let positional: Vec<Option<f64>> = document
        .select(&selector(&format!("{SUBSCORE_BLOCK} {SUBSCORE_VALUE}")))
        .map(|el| parse_score(&extract_text(el)))
        .collect();
    let nth = |n: usize| positional.get(n - 1).copied().flatten();
    SubScores {
        comfort: nth(4),
        value: nth(5),
        location: nth(6),
        wifi: nth(7),
    }
}

/// First coordinate pair embedded in the page's inline JSON.
pub fn extract_coordinates(raw_html: &str) -> Option<(f64, f64)> {
    COORDINATE_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(raw_html)?;
        let lat = caps.get(1)?.as_str().parse::<f64>().ok()?;
        let lon = caps.get(2)?.as_str().parse::<f64>().ok()?;
        valid_coordinates(lat, lon).then_some((lat, lon))
    })
}

fn valid_coordinates(lat: f64, lon: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lon) && !(lat == 0.0 && lon == 0.0)
}
