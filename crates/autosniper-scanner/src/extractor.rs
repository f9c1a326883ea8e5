//! Drives a rendering session through one results page.

use crate::strategy::{ResultPage, StrategyChain};
use crate::url_builder::build_search_url;
use autosniper_browser::BrowserActions;
use autosniper_core::{RawListing, ScanningConfig, SearchCriteria};
use std::time::Duration;

/// Title fragments of the source's block and error pages.
const BLOCKED_TITLE_MARKERS: &[&str] = &["503", "Backend fetch failed"];

/// Body fragment shown instead of results when the source refuses a query.
const NO_RESULTS_MARKER: &str = "Sonuç bulunamadı";

/// Whether a loaded page must be treated as a soft failure.
#[must_use]
pub fn is_blocked(title: &str, content: &str, min_length: usize) -> bool {
    BLOCKED_TITLE_MARKERS.iter().any(|m| title.contains(m))
        || content.contains(NO_RESULTS_MARKER)
        || content.len() < min_length
}

/// Loads a results page and applies the strategy chain to it.
pub struct ExtractionEngine {
    config: ScanningConfig,
    chain: StrategyChain,
}

impl ExtractionEngine {
    /// Engine with the standard strategy chain.
    #[must_use]
    pub fn new(config: ScanningConfig) -> Self {
        let chain = StrategyChain::standard(&config);
        Self { config, chain }
    }

    /// Engine with a custom chain.
    #[must_use]
    pub fn with_chain(config: ScanningConfig, chain: StrategyChain) -> Self {
        Self { config, chain }
    }

    /// Extract raw records for `criteria` using `session`.
    ///
    /// Never fails: a page that cannot be loaded, or that still looks blocked
    /// after one reload, yields an empty vector.
    pub async fn extract(
        &self,
        session: &dyn BrowserActions,
        criteria: &SearchCriteria,
    ) -> Vec<RawListing> {
        let url = build_search_url(&self.config.base_url, criteria);
        tracing::info!(url = %url, "loading results page");

        let Some(content) = self.load(session, &url).await else {
            return Vec::new();
        };

        let records = self.extract_records(&content);
        tracing::info!(url = %url, count = records.len(), "raw listings extracted");
        records
    }

    async fn load(&self, session: &dyn BrowserActions, url: &str) -> Option<String> {
        let retry_pause = Duration::from_secs(self.config.block_retry_pause_secs);
        let settle_pause = Duration::from_secs(self.config.settle_pause_secs);

        match session.navigate(url).await {
            Ok(state) => tracing::debug!(?state, "navigation settled"),
            Err(e) => {
                tracing::warn!(url = %url, "navigation failed, reloading: {}", e);
                tokio::time::sleep(retry_pause).await;
                if let Err(e) = session.reload().await {
                    tracing::error!(url = %url, "reload failed: {}", e);
                    return None;
                }
            }
        }

        tokio::time::sleep(settle_pause).await;
        if let Err(e) = session.scroll_full_height().await {
            tracing::warn!("scroll failed, continuing with what is rendered: {}", e);
        }
        tokio::time::sleep(settle_pause).await;

        let (title, content) = Self::snapshot(session).await?;
        tracing::debug!(title = %title, length = content.len(), "page snapshot taken");
        if !is_blocked(&title, &content, self.config.min_page_length) {
            return Some(content);
        }

        tracing::warn!(url = %url, title = %title, "page looks blocked, retrying once");
        tokio::time::sleep(retry_pause).await;
        if let Err(e) = session.reload().await {
            tracing::error!(url = %url, "reload failed: {}", e);
            return None;
        }
        tokio::time::sleep(settle_pause).await;

        let (title, content) = Self::snapshot(session).await?;
        if is_blocked(&title, &content, self.config.min_page_length) {
            tracing::error!(
                url = %url,
                title = %title,
                length = content.len(),
                "still blocked, giving up"
            );
            return None;
        }
        Some(content)
    }

    async fn snapshot(session: &dyn BrowserActions) -> Option<(String, String)> {
        let title = match session.title().await {
            Ok(title) => title,
            Err(e) => {
                tracing::error!("could not read page title: {}", e);
                return None;
            }
        };
        match session.content().await {
            Ok(content) => Some((title, content)),
            Err(e) => {
                tracing::error!("could not read page content: {}", e);
                None
            }
        }
    }

    // Kept synchronous: the parsed document must not live across an await.
    fn extract_records(&self, content: &str) -> Vec<RawListing> {
        let page = ResultPage::parse(content, &self.config.base_url);
        self.chain.run(&page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_detection() {
        let long = "x".repeat(6000);
        assert!(!is_blocked("arabam.com", &long, 5000));
        assert!(is_blocked("503 Service Unavailable", &long, 5000));
        assert!(is_blocked("Backend fetch failed", &long, 5000));
        assert!(is_blocked("arabam.com", "short", 5000));
        assert!(is_blocked("arabam.com", &format!("{long}Sonuç bulunamadı"), 5000));
    }
}
