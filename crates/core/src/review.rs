use serde::{Deserialize, Serialize};
use std::fmt;

use crate::identity::{exact_key, soft_key};
use crate::ids::Fingerprint;
use crate::layout::ReviewColumn;

/// Cell text written for a review that carries no usable rating.
pub const NO_RATING: &str = "no rating";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Platform {
    Diplomeo,
    CapitaineStudy,
    Custplace,
    Gmb,
}

impl Platform {
    /// Known platforms in summary column order.
    pub const ALL: [Platform; 4] = [
        Platform::Diplomeo,
        Platform::CapitaineStudy,
        Platform::Custplace,
        Platform::Gmb,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diplomeo => "diplomeo",
            Self::CapitaineStudy => "capitainestudy",
            Self::Custplace => "custplace",
            Self::Gmb => "gmb",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "diplomeo" => Some(Self::Diplomeo),
            "capitainestudy" => Some(Self::CapitaineStudy),
            "custplace" => Some(Self::Custplace),
            "gmb" => Some(Self::Gmb),
            _ => None,
        }
    }

    /// Best-effort platform detection from a scraped page url.
    pub fn detect_from_url(url: &str) -> Option<Self> {
        let u = url.to_lowercase();
        if u.contains("custplace") {
            Some(Self::Custplace)
        } else if u.contains("diplomeo") {
            Some(Self::Diplomeo)
        } else if u.contains("capitainestudy") || u.contains("capitaine") {
            Some(Self::CapitaineStudy)
        } else if u.starts_with("accounts/") && u.contains("/locations/") {
            Some(Self::Gmb)
        } else {
            None
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Rating {
    Stars(f64),
    #[default]
    Missing,
}

impl Rating {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Stars(v) => Some(*v),
            Self::Missing => None,
        }
    }

    pub fn to_cell(&self) -> String {
        match self {
            Self::Stars(v) => v.to_string(),
            Self::Missing => NO_RATING.to_string(),
        }
    }
}

/// Parse a stored rating cell. Accepts `.` or `,` as decimal separator.
/// The sentinel and anything non-numeric yield `None`.
pub fn parse_rating_cell(cell: &str) -> Option<f64> {
    let s = cell.trim().replace(',', ".");
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Normalized review content, before identity is derived.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReviewFields {
    pub reviewer: String,
    pub rating: Rating,
    pub date: String,
    pub year: String,
    pub program: String,
    pub text: String,
    pub url_or_location: String,
    pub institution: String,
    pub city: String,
    pub replies: [String; 3],
}

/// Canonical review. Identity keys are derived once at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    platform: Platform,
    fields: ReviewFields,
    exact_key: Fingerprint,
    soft_key: Fingerprint,
}

impl Review {
    pub fn new(platform: Platform, fields: ReviewFields) -> Self {
        let exact = exact_key(&platform, &fields.reviewer, &fields.text, &fields.url_or_location);
        let soft = soft_key(&platform, &fields.reviewer, &fields.text);
        Self {
            platform,
            fields,
            exact_key: exact,
            soft_key: soft,
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn exact_key(&self) -> Fingerprint {
        self.exact_key
    }

    pub fn soft_key(&self) -> Fingerprint {
        self.soft_key
    }

    pub fn reviewer(&self) -> &str {
        &self.fields.reviewer
    }

    pub fn rating(&self) -> Rating {
        self.fields.rating
    }

    pub fn date(&self) -> &str {
        &self.fields.date
    }

    pub fn year(&self) -> &str {
        &self.fields.year
    }

    pub fn text(&self) -> &str {
        &self.fields.text
    }

    pub fn url_or_location(&self) -> &str {
        &self.fields.url_or_location
    }

    pub fn institution(&self) -> &str {
        &self.fields.institution
    }

    pub fn city(&self) -> &str {
        &self.fields.city
    }

    pub fn fields(&self) -> &ReviewFields {
        &self.fields
    }

    pub fn cell(&self, column: ReviewColumn) -> String {
        match column {
            ReviewColumn::Uid => self.exact_key.to_hex(),
            ReviewColumn::Reviewer => self.fields.reviewer.clone(),
            ReviewColumn::Rating => self.rating().to_cell(),
            ReviewColumn::Date => self.fields.date.clone(),
            ReviewColumn::Year => self.fields.year.clone(),
            ReviewColumn::Program => self.fields.program.clone(),
            ReviewColumn::Text => self.fields.text.clone(),
            ReviewColumn::Url => self.fields.url_or_location.clone(),
            ReviewColumn::Institution => self.fields.institution.clone(),
            ReviewColumn::City => self.fields.city.clone(),
            ReviewColumn::Reply1 => self.fields.replies[0].clone(),
            ReviewColumn::Reply2 => self.fields.replies[1].clone(),
            ReviewColumn::Reply3 => self.fields.replies[2].clone(),
            ReviewColumn::Platform => self.platform.as_str().to_string(),
        }
    }

    /// Full row in review-tab column order.
    pub fn to_row(&self) -> Vec<String> {
        ReviewColumn::ALL.iter().map(|c| self.cell(*c)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::REVIEW_HEADER;

    fn fields(reviewer: &str, text: &str, url: &str) -> ReviewFields {
        ReviewFields {
            reviewer: reviewer.into(),
            text: text.into(),
            url_or_location: url.into(),
            rating: Rating::Stars(4.0),
            ..Default::default()
        }
    }

    #[test]
    fn keys_follow_inputs() {
        let a = Review::new(Platform::Custplace, fields("Ana", "Nice", "https://a"));
        let b = Review::new(Platform::Custplace, fields("ana", "nice", "https://a"));
        let c = Review::new(Platform::Custplace, fields("Ana", "Nice", "https://b"));
        assert_eq!(a.exact_key(), b.exact_key());
        assert_ne!(a.exact_key(), c.exact_key());
        assert_eq!(a.soft_key(), c.soft_key());
    }

    #[test]
    fn row_matches_header_order() {
        let r = Review::new(Platform::Gmb, fields("Ana", "Nice", "accounts/1/locations/2"));
        let row = r.to_row();
        assert_eq!(row.len(), REVIEW_HEADER.len());
        assert_eq!(row[0], r.exact_key().to_hex());
        assert_eq!(row[2], "4");
        assert_eq!(row[13], "gmb");
    }

    #[test]
    fn missing_rating_renders_sentinel() {
        let r = Review::new(Platform::Diplomeo, ReviewFields::default());
        assert_eq!(r.rating(), Rating::Missing);
        assert_eq!(r.cell(ReviewColumn::Rating), NO_RATING);
    }

    #[test]
    fn rating_cells_parse_both_separators() {
        assert_eq!(parse_rating_cell("3,5"), Some(3.5));
        assert_eq!(parse_rating_cell(" 4 "), Some(4.0));
        assert_eq!(parse_rating_cell("foo"), None);
        assert_eq!(parse_rating_cell(NO_RATING), None);
        assert_eq!(parse_rating_cell(""), None);
    }

    #[test]
    fn platform_detection() {
        assert_eq!(Platform::detect_from_url("https://fr.custplace.com/x"), Some(Platform::Custplace));
        assert_eq!(Platform::detect_from_url("https://diplomeo.com/avis-x"), Some(Platform::Diplomeo));
        assert_eq!(Platform::detect_from_url("https://capitainestudy.fr/y"), Some(Platform::CapitaineStudy));
        assert_eq!(Platform::detect_from_url("accounts/12/locations/34"), Some(Platform::Gmb));
        assert_eq!(Platform::detect_from_url("https://example.com"), None);
        assert_eq!(Platform::parse(" GMB "), Some(Platform::Gmb));
    }
}
