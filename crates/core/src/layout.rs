//! Fixed column layouts of the review tab and the summary tab.

pub const DEFAULT_REVIEW_TAB: &str = "Reviews";
pub const DEFAULT_SUMMARY_TAB: &str = "Summary";

pub const REVIEW_HEADER: [&str; 14] = [
    "uid",
    "reviewer",
    "rating",
    "date",
    "year",
    "program",
    "text",
    "url",
    "institution",
    "city",
    "reply_1",
    "reply_2",
    "reply_3",
    "platform",
];

pub const SUMMARY_HEADER: [&str; 6] = [
    "institution",
    "mean_diplomeo",
    "mean_capitainestudy",
    "mean_custplace",
    "mean_gmb",
    "mean_overall",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewColumn {
    Uid,
    Reviewer,
    Rating,
    Date,
    Year,
    Program,
    Text,
    Url,
    Institution,
    City,
    Reply1,
    Reply2,
    Reply3,
    Platform,
}

impl ReviewColumn {
    pub const ALL: [ReviewColumn; 14] = [
        Self::Uid,
        Self::Reviewer,
        Self::Rating,
        Self::Date,
        Self::Year,
        Self::Program,
        Self::Text,
        Self::Url,
        Self::Institution,
        Self::City,
        Self::Reply1,
        Self::Reply2,
        Self::Reply3,
        Self::Platform,
    ];

    /// 1-based column number in the review tab.
    pub fn number(&self) -> u32 {
        match self {
            Self::Uid => 1,
            Self::Reviewer => 2,
            Self::Rating => 3,
            Self::Date => 4,
            Self::Year => 5,
            Self::Program => 6,
            Self::Text => 7,
            Self::Url => 8,
            Self::Institution => 9,
            Self::City => 10,
            Self::Reply1 => 11,
            Self::Reply2 => 12,
            Self::Reply3 => 13,
            Self::Platform => 14,
        }
    }

    pub fn name(&self) -> &'static str {
        REVIEW_HEADER[self.number() as usize - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_numbers_match_header() {
        for (i, col) in ReviewColumn::ALL.iter().enumerate() {
            assert_eq!(col.number() as usize, i + 1);
            assert_eq!(col.name(), REVIEW_HEADER[i]);
        }
    }
}
