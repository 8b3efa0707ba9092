use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use reviewsync_core::{Platform, RawReview};
use reviewsync_engine::{FetchError, SourceAdapter};

/// Adapter serving canned pages. Sources containing `marker` are handled;
/// a handled source with no scripted page yields no reviews.
pub struct ScriptedSource {
    name: String,
    marker: String,
    platform: Option<Platform>,
    pages: HashMap<String, Result<Vec<RawReview>, String>>,
    fetched: Rc<RefCell<Vec<String>>>,
}

impl ScriptedSource {
    pub fn new(name: &str, marker: &str) -> Self {
        Self {
            name: name.to_string(),
            marker: marker.to_string(),
            platform: None,
            pages: HashMap::new(),
            fetched: Rc::default(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    pub fn page(mut self, source: &str, reviews: Vec<RawReview>) -> Self {
        self.pages.insert(source.to_string(), Ok(reviews));
        self
    }

    pub fn failing_page(mut self, source: &str, message: &str) -> Self {
        self.pages.insert(source.to_string(), Err(message.to_string()));
        self
    }

    /// Shared log of every source fetched, in order.
    pub fn fetch_log(&self) -> Rc<RefCell<Vec<String>>> {
        Rc::clone(&self.fetched)
    }
}

impl SourceAdapter for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, source: &str) -> bool {
        source.contains(&self.marker)
    }

    fn platform(&self) -> Option<Platform> {
        self.platform
    }

    fn fetch(&mut self, source: &str) -> Result<Vec<RawReview>, FetchError> {
        self.fetched.borrow_mut().push(source.to_string());
        match self.pages.get(source) {
            Some(Ok(reviews)) => Ok(reviews.clone()),
            Some(Err(message)) => Err(FetchError::new(message.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// A raw map with the keys scraped review pages carry.
pub fn raw_review(reviewer: &str, text: &str, url: &str, date: &str, rating: &str) -> RawReview {
    RawReview::new()
        .with("prenom", reviewer)
        .with("texte", text)
        .with("url", url)
        .with("date", date)
        .with("note", rating)
}
