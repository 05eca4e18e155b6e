use std::time::Duration;
use tracing::debug;

use crate::browser::{BrowserSession, PageElement};
use crate::error::{Result, ScrapingError};
use crate::registry::Locator;

/// Walks an ordered fallback chain of locators against one session.
///
/// Candidates are probed strictly in order and probing stops at the first
/// match. A candidate that fails inside the engine counts as a miss; the page
/// is never touched on a miss.
pub struct SelectorResolver<'a> {
    session: &'a dyn BrowserSession,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(session: &'a dyn BrowserSession) -> Self {
        Self { session }
    }

    /// First match and its index in `candidates`, or `None` when all missed.
    pub async fn probe(
        &self,
        candidates: &[Locator],
        per_candidate: Duration,
    ) -> Option<(usize, Box<dyn PageElement>)> {
        for (index, locator) in candidates.iter().enumerate() {
            match self.session.find(locator, per_candidate).await {
                Ok(Some(element)) => {
                    debug!("Matched candidate {} ({})", index, locator);
                    return Some((index, element));
                }
                Ok(None) => debug!("No match for {} within {:?}", locator, per_candidate),
                Err(e) => debug!("Probe of {} failed: {}", locator, e),
            }
        }
        None
    }

    /// Like [`probe`](Self::probe), but a complete miss is an `ElementNotFound`
    /// naming `what` and every candidate tried.
    pub async fn resolve(
        &self,
        what: &str,
        candidates: &[Locator],
        per_candidate: Duration,
    ) -> Result<Box<dyn PageElement>> {
        match self.probe(candidates, per_candidate).await {
            Some((_, element)) => Ok(element),
            None => Err(ScrapingError::ElementNotFound {
                what: what.to_string(),
                candidates: candidates.iter().map(|l| l.to_string()).collect(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Call, FakeBrowser};

    fn chain() -> Vec<Locator> {
        vec![
            Locator::css("#old-input"),
            Locator::css(".legacy textarea"),
            Locator::css("textarea"),
            Locator::css("[contenteditable]"),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_at_first_match() {
        let browser = FakeBrowser::new().with_element(Locator::css("textarea"), "");
        let session = browser.session();
        let resolver = SelectorResolver::new(&session);

        let (index, _) = resolver.probe(&chain(), Duration::from_secs(2)).await.unwrap();

        // two misses, then the match; the fourth candidate is never probed
        assert_eq!(index, 2);
        assert_eq!(browser.finds(), chain()[..3].to_vec());
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_miss_waits_its_own_budget() {
        let browser = FakeBrowser::new().with_element(Locator::css("[contenteditable]"), "");
        let session = browser.session();
        let resolver = SelectorResolver::new(&session);

        let started = tokio::time::Instant::now();
        resolver
            .resolve("query input", &chain(), Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(started.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_error_falls_through() {
        let browser = FakeBrowser::new()
            .with_broken(Locator::css("#old-input"))
            .with_element(Locator::css(".legacy textarea"), "");
        let session = browser.session();
        let resolver = SelectorResolver::new(&session);

        let (index, _) = resolver.probe(&chain(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(index, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_total_miss_lists_every_candidate() {
        let browser = FakeBrowser::new();
        let session = browser.session();
        let resolver = SelectorResolver::new(&session);

        let err = resolver
            .resolve("query input", &chain(), Duration::from_millis(500))
            .await
            .err()
            .unwrap();

        match err {
            ScrapingError::ElementNotFound { what, candidates } => {
                assert_eq!(what, "query input");
                assert_eq!(candidates.len(), 4);
                assert_eq!(candidates[0], "css=#old-input");
            }
            other => panic!("unexpected error: {}", other),
        }

        // misses never interact with the page
        assert!(browser.calls().iter().all(|c| matches!(c, Call::Find(_))));
    }
}
