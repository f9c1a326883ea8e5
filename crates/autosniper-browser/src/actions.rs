use crate::error::{BrowserError, Result};

/// How far a page got before [`BrowserActions::navigate`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Network activity settled
    NetworkIdle,
    /// Quiescence timed out; the document finished parsing
    ContentLoaded,
}

/// Page-level operations the extraction engine needs from a rendering session.
#[async_trait::async_trait]
pub trait BrowserActions: Send + Sync {
    /// Navigate to a URL and wait for quiescence, falling back to the
    /// content-loaded signal
    async fn navigate(&self, url: &str) -> Result<LoadState>;

    /// Reload the current page with the same waiting rules as `navigate`
    async fn reload(&self) -> Result<LoadState>;

    /// Scroll through the full page height so lazy content materializes
    async fn scroll_full_height(&self) -> Result<()>;

    /// Current document title
    async fn title(&self) -> Result<String>;

    /// Current serialized HTML
    async fn content(&self) -> Result<String>;

    /// Tear the session down. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Creates a fresh session owned by a single scan.
#[async_trait::async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Launch a session with countermeasures applied
    async fn launch(&self) -> Result<Box<dyn BrowserActions>>;
}

/// Helper to extract domain from URL
pub fn extract_domain(url: &str) -> Result<String> {
    let url = url::Url::parse(url)
        .map_err(|e| BrowserError::NavigationError(format!("Invalid URL: {e}")))?;

    url.host_str()
        .ok_or_else(|| BrowserError::NavigationError("No host in URL".to_string()))
        .map(ToString::to_string)
}
