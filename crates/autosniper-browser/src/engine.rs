use crate::actions::{extract_domain, BrowserActions, LoadState, SessionLauncher};
use crate::error::{BrowserError, Result};
use crate::fingerprint::{FingerprintConfig, LAUNCH_ARGS, STEALTH_SCRIPT};
use autosniper_core::BrowserConfig as SessionSettings;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetTimezoneOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, Headers, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Page;
use futures::stream::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
const IDLE_STABLE_POLLS: u32 = 3;
const CONTENT_LOADED_TIMEOUT: Duration = Duration::from_secs(10);

const RESOURCE_COUNT_JS: &str = "String(performance.getEntriesByType('resource').length)";

const SCROLL_JS: &str = r"
new Promise((resolve) => {
    let y = 0;
    const step = () => {
        y += 400;
        window.scrollTo(0, y);
        if (y < document.body.scrollHeight) {
            setTimeout(step, 100);
        } else {
            window.scrollTo(0, document.body.scrollHeight);
            resolve('done');
        }
    };
    step();
})
";

/// Spaces out navigations to the same domain across every session the
/// engine launches.
#[derive(Debug)]
struct RateLimiter {
    next_slot: HashMap<String, Instant>,
    min_delay: Duration,
}

impl RateLimiter {
    fn new(min_delay_ms: u64) -> Self {
        Self {
            next_slot: HashMap::new(),
            min_delay: Duration::from_millis(min_delay_ms),
        }
    }

    /// Reserve the next slot for `domain` and return how long to wait for it.
    fn reserve(&mut self, domain: &str) -> Duration {
        let now = Instant::now();
        let slot = match self.next_slot.get(domain) {
            Some(next) if *next > now => *next,
            _ => now,
        };
        self.next_slot
            .insert(domain.to_string(), slot + self.min_delay);
        slot - now
    }
}

/// Launches one stealth-configured Chromium session per scan.
pub struct BrowserEngine {
    settings: SessionSettings,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl BrowserEngine {
    /// Create an engine from the `[browser]` configuration section
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(2000))),
        }
    }

    /// Launch a browser, open a page and apply session countermeasures.
    pub async fn launch_session(&self) -> Result<BrowserSession> {
        let fingerprint = FingerprintConfig::randomized(
            &self.settings.locale,
            &self.settings.timezone,
            self.settings.window_width,
            self.settings.window_height,
        );

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(fingerprint.viewport_width, fingerprint.viewport_height)
            .request_timeout(Duration::from_secs(self.settings.navigation_timeout_secs))
            .args(LAUNCH_ARGS.iter().copied());
        if !self.settings.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::trace!("browser handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(BrowserError::Launch(e.to_string()));
            }
        };

        let session = BrowserSession {
            browser: tokio::sync::Mutex::new(Some(browser)),
            page,
            handler,
            navigation_timeout: Duration::from_secs(self.settings.navigation_timeout_secs),
            idle_timeout: Duration::from_secs(self.settings.network_idle_timeout_secs),
            rate_limiter: Arc::clone(&self.rate_limiter),
        };

        if let Err(e) = session.apply_countermeasures(&fingerprint).await {
            let _ = session.close().await;
            return Err(BrowserError::Launch(e.to_string()));
        }

        tracing::debug!(
            user_agent = %fingerprint.user_agent,
            width = fingerprint.viewport_width,
            height = fingerprint.viewport_height,
            "browser session launched"
        );
        Ok(session)
    }
}

#[async_trait::async_trait]
impl SessionLauncher for BrowserEngine {
    async fn launch(&self) -> Result<Box<dyn BrowserActions>> {
        Ok(Box::new(self.launch_session().await?))
    }
}

/// A single browser process with one page, owned by one scan.
pub struct BrowserSession {
    browser: tokio::sync::Mutex<Option<Browser>>,
    page: Page,
    handler: JoinHandle<()>,
    navigation_timeout: Duration,
    idle_timeout: Duration,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl BrowserSession {
    async fn apply_countermeasures(&self, fingerprint: &FingerprintConfig) -> Result<()> {
        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(fingerprint.user_agent.clone())
            .accept_language(fingerprint.accept_language())
            .build()
            .map_err(BrowserError::ChromiumError)?;
        self.page.execute(user_agent).await?;

        self.page
            .execute(SetTimezoneOverrideParams::new(fingerprint.timezone.clone()))
            .await?;

        self.page.execute(EnableParams::default()).await?;
        self.page
            .execute(SetExtraHttpHeadersParams::new(Headers::new(
                fingerprint.navigation_headers(),
            )))
            .await?;

        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await?;
        Ok(())
    }

    async fn eval_string(&self, expression: &str) -> Result<String> {
        self.page
            .evaluate(expression)
            .await?
            .into_value::<String>()
            .map_err(|e| BrowserError::ChromiumError(e.to_string()))
    }

    /// Poll the resource-timing count until it stops changing. Falls back to
    /// waiting for the document to finish parsing.
    async fn wait_for_quiescence(&self) -> LoadState {
        let deadline = Instant::now() + self.idle_timeout;
        let mut last_count: Option<String> = None;
        let mut stable_polls = 0;

        while Instant::now() < deadline {
            match self.eval_string(RESOURCE_COUNT_JS).await {
                Ok(count) => {
                    if last_count.as_ref() == Some(&count) {
                        stable_polls += 1;
                        if stable_polls >= IDLE_STABLE_POLLS {
                            return LoadState::NetworkIdle;
                        }
                    } else {
                        stable_polls = 0;
                        last_count = Some(count);
                    }
                }
                Err(e) => {
                    tracing::debug!("resource count unavailable: {}", e);
                    break;
                }
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }

        tracing::warn!("network quiescence timed out, falling back to content-loaded");
        let deadline = Instant::now() + CONTENT_LOADED_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(state) = self.eval_string("document.readyState").await {
                if state != "loading" {
                    break;
                }
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
        LoadState::ContentLoaded
    }

    async fn wait_for_rate_limit(&self, url: &str) {
        let Ok(domain) = extract_domain(url) else {
            return;
        };
        let wait = match self.rate_limiter.lock() {
            Ok(mut limiter) => limiter.reserve(&domain),
            Err(poisoned) => poisoned.into_inner().reserve(&domain),
        };
        if !wait.is_zero() {
            tracing::debug!(domain = %domain, wait_ms = wait.as_millis(), "spacing navigation");
            tokio::time::sleep(wait).await;
        }
    }

    async fn ensure_open(&self) -> Result<()> {
        if self.browser.lock().await.is_some() {
            Ok(())
        } else {
            Err(BrowserError::Closed)
        }
    }
}

#[async_trait::async_trait]
impl BrowserActions for BrowserSession {
    async fn navigate(&self, url: &str) -> Result<LoadState> {
        self.ensure_open().await?;
        self.wait_for_rate_limit(url).await;

        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Err(_) => return Err(BrowserError::Timeout(format!("navigating to {url}"))),
            Ok(Err(e)) => return Err(BrowserError::NavigationError(e.to_string())),
            Ok(Ok(_)) => {}
        }
        Ok(self.wait_for_quiescence().await)
    }

    async fn reload(&self) -> Result<LoadState> {
        self.ensure_open().await?;
        match tokio::time::timeout(self.navigation_timeout, self.page.reload()).await {
            Err(_) => return Err(BrowserError::Timeout("reloading page".to_string())),
            Ok(Err(e)) => return Err(BrowserError::NavigationError(e.to_string())),
            Ok(Ok(_)) => {}
        }
        Ok(self.wait_for_quiescence().await)
    }

    async fn scroll_full_height(&self) -> Result<()> {
        self.ensure_open().await?;
        self.page.evaluate(SCROLL_JS).await?;
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        self.ensure_open().await?;
        Ok(self.page.get_title().await?.unwrap_or_default())
    }

    async fn content(&self) -> Result<String> {
        self.ensure_open().await?;
        Ok(self.page.content().await?)
    }

    async fn close(&self) -> Result<()> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("page close failed: {}", e);
        }
        if let Err(e) = browser.close().await {
            tracing::warn!("browser close failed: {}", e);
        }
        self.handler.abort();
        tracing::debug!("browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
    }
}
