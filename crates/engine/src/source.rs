use reviewsync_core::{Platform, RawReview};
use thiserror::Error;

use crate::error::EngineError;

/// A source page that could not be retrieved or parsed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn into_engine_error(self, page: &str) -> EngineError {
        EngineError::Fetch {
            page: page.to_string(),
            message: self.message,
        }
    }
}

/// Produces raw review maps for one kind of source page. The maps carry at
/// least reviewer, rating, text, date and url-or-location under any of the
/// keys the normalizer accepts.
pub trait SourceAdapter {
    fn name(&self) -> &str;

    /// Whether this adapter knows how to read `source`.
    fn handles(&self, source: &str) -> bool;

    /// Platform for reviews that neither tag nor url identify.
    fn platform(&self) -> Option<Platform> {
        None
    }

    fn fetch(&mut self, source: &str) -> Result<Vec<RawReview>, FetchError>;
}

/// Host part of a source: the authority of a url, or the first path segment
/// of a bare resource name such as `accounts/1/locations/2`.
pub fn source_host(source: &str) -> &str {
    let s = source.trim();
    let rest = s.split_once("://").map(|(_, r)| r).unwrap_or(s);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}
