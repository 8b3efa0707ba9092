//! Record Normalizer: the only place that interprets loosely-shaped adapter maps.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Months, NaiveDate};
use regex::Regex;

use crate::error::CoreError;
use crate::identity::{clean, normalize};
use crate::review::{Platform, Rating, Review, ReviewFields};

const REVIEWER_KEYS: &[&str] = &["reviewer", "prenom", "displayName"];
const RATING_KEYS: &[&str] = &["rating", "note", "starRating"];
const TEXT_KEYS: &[&str] = &["text", "texte", "comment"];
const DATE_KEYS: &[&str] = &["date", "createTime"];
const YEAR_KEYS: &[&str] = &["year", "annee"];
const PROGRAM_KEYS: &[&str] = &["program", "formation"];
const LOCATION_KEYS: &[&str] = &["url_or_location", "url", "location", "name"];
const INSTITUTION_KEYS: &[&str] = &["institution", "etablissement"];
const CITY_KEYS: &[&str] = &["city", "ville"];
const PLATFORM_KEYS: &[&str] = &["platform", "site"];
const REPLY_KEYS: [&[&str]; 3] = [
    &["reply_1", "reponse_1", "reviewReply"],
    &["reply_2", "reponse_2"],
    &["reply_3", "reponse_3"],
];

/// A raw review map as produced by a source adapter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawReview(BTreeMap<String, String>);

impl RawReview {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|s| s.as_str())
    }

    /// First non-blank value among `keys`, cleaned.
    fn first(&self, keys: &[&str]) -> String {
        keys.iter()
            .filter_map(|k| self.get(k))
            .map(clean)
            .find(|v| !v.is_empty())
            .unwrap_or_default()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawReview {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

pub struct Normalizer {
    default_platform: Option<Platform>,
    today: NaiveDate,
}

impl Normalizer {
    /// `today` anchors relative dates such as "3 months ago".
    pub fn new(today: NaiveDate) -> Self {
        Self {
            default_platform: None,
            today,
        }
    }

    /// Platform used when a record neither tags nor implies one.
    pub fn with_default_platform(mut self, platform: Platform) -> Self {
        self.default_platform = Some(platform);
        self
    }

    pub fn normalize(&self, raw: &RawReview) -> Result<Review, CoreError> {
        let url_or_location = raw.first(LOCATION_KEYS);
        let platform = Platform::parse(&raw.first(PLATFORM_KEYS))
            .or_else(|| Platform::detect_from_url(&url_or_location))
            .or(self.default_platform)
            .ok_or_else(|| {
                CoreError::InvalidData(format!("cannot determine platform for {url_or_location:?}"))
            })?;

        let (date, year) = self.date_and_year(&raw.first(DATE_KEYS), &raw.first(YEAR_KEYS));

        let fields = ReviewFields {
            reviewer: raw.first(REVIEWER_KEYS),
            rating: parse_rating(&raw.first(RATING_KEYS)),
            date,
            year,
            program: raw.first(PROGRAM_KEYS),
            text: raw.first(TEXT_KEYS),
            url_or_location,
            institution: normalize(&raw.first(INSTITUTION_KEYS)),
            city: capitalize(&raw.first(CITY_KEYS)),
            replies: REPLY_KEYS.map(|keys| raw.first(keys)),
        };
        Ok(Review::new(platform, fields))
    }

    fn date_and_year(&self, date: &str, explicit_year: &str) -> (String, String) {
        if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
            let utc = dt.to_utc();
            let year = if explicit_year.is_empty() {
                utc.year().to_string()
            } else {
                explicit_year.to_string()
            };
            return (utc.format("%Y-%m-%d %H:%M:%S").to_string(), year);
        }
        if !explicit_year.is_empty() {
            return (date.to_string(), explicit_year.to_string());
        }
        let years = find_years(date);
        if !years.is_empty() {
            return (date.to_string(), years.join(", "));
        }
        let year = relative_year(date, self.today)
            .map(|y| y.to_string())
            .unwrap_or_default();
        (date.to_string(), year)
    }
}

/// Star words, integers, and decimals with `.` or `,`. Zero means "not rated".
pub fn parse_rating(raw: &str) -> Rating {
    let s = raw.trim().to_uppercase();
    let stars = match s.as_str() {
        "ONE" => Some(1.0),
        "TWO" => Some(2.0),
        "THREE" => Some(3.0),
        "FOUR" => Some(4.0),
        "FIVE" => Some(5.0),
        _ => s.replace(',', ".").parse::<f64>().ok(),
    };
    match stars {
        Some(v) if v.is_finite() && v > 0.0 => Rating::Stars(v),
        _ => Rating::Missing,
    }
}

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid year pattern"));
static FR_RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"il y a (\d+)\s*(mois|an|ans)").expect("valid relative-date pattern")
});
static EN_RELATIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s*(month|year)s?\s+ago\b").expect("valid relative-date pattern")
});

/// Distinct standalone four-digit years, sorted.
fn find_years(text: &str) -> Vec<String> {
    let mut years: Vec<String> = YEAR_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();
    years.sort();
    years.dedup();
    years
}

/// Resolves "il y a 3 mois", "il y a 2 ans", "3 months ago", "1 year ago".
fn relative_year(text: &str, today: NaiveDate) -> Option<i32> {
    let lower = text.to_lowercase();
    let caps = FR_RELATIVE_RE
        .captures(&lower)
        .or_else(|| EN_RELATIVE_RE.captures(&lower))?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    let months = match caps.get(2)?.as_str() {
        "mois" | "month" => n,
        _ => n.checked_mul(12)?,
    };
    today.checked_sub_months(Months::new(months)).map(|d| d.year())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
