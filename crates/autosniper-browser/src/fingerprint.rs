use rand::Rng;
use serde_json::json;

/// Chromium flags that hide the automation banner and keep the sandboxed
/// container stable.
pub const LAUNCH_ARGS: &[&str] = &[
    "--disable-blink-features=AutomationControlled",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--lang=tr-TR",
];

/// Injected before any page script runs.
pub const STEALTH_SCRIPT: &str = r"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = { runtime: {} };
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
Object.defineProperty(navigator, 'languages', { get: () => ['tr-TR', 'tr', 'en-US', 'en'] });
";

/// Fingerprint configuration for anti-detection
#[derive(Debug, Clone)]
pub struct FingerprintConfig {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
    pub timezone: String,
}

impl FingerprintConfig {
    /// Generate a randomized desktop fingerprint for the given locale and timezone.
    ///
    /// Only viewports fitting in `max_width` x `max_height` are picked; when
    /// none fits, the window size itself is used.
    pub fn randomized(locale: &str, timezone: &str, max_width: u32, max_height: u32) -> Self {
        let mut rng = rand::thread_rng();

        let user_agents = [
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
        ];

        let viewports: Vec<(u32, u32)> = [(1920, 1080), (1366, 768), (1536, 864), (1440, 900)]
            .into_iter()
            .filter(|&(w, h)| w <= max_width && h <= max_height)
            .collect();

        let ua_idx = rng.gen_range(0..user_agents.len());
        let (width, height) = if viewports.is_empty() {
            (max_width, max_height)
        } else {
            viewports[rng.gen_range(0..viewports.len())]
        };

        Self {
            user_agent: user_agents[ua_idx].to_string(),
            viewport_width: width,
            viewport_height: height,
            locale: locale.to_string(),
            timezone: timezone.to_string(),
        }
    }

    /// `Accept-Language` value derived from the locale, e.g. `tr-TR,tr;q=0.9,...`
    pub fn accept_language(&self) -> String {
        let primary = self.locale.split('-').next().unwrap_or("tr");
        format!("{},{primary};q=0.9,en-US;q=0.8,en;q=0.7", self.locale)
    }

    /// Headers a regular top-level navigation carries.
    pub fn navigation_headers(&self) -> serde_json::Value {
        json!({
            "Accept": "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            "Accept-Language": self.accept_language(),
            "Upgrade-Insecure-Requests": "1",
            "Sec-Fetch-Dest": "document",
            "Sec-Fetch-Mode": "navigate",
            "Sec-Fetch-Site": "none",
            "Sec-Fetch-User": "?1",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_randomized_fingerprint() {
        let config = FingerprintConfig::randomized("tr-TR", "Europe/Istanbul", 1920, 1080);
        assert!(!config.user_agent.is_empty());
        assert!(config.viewport_width > 0);
        assert!(config.viewport_height > 0);
        assert_eq!(config.timezone, "Europe/Istanbul");
    }

    #[test]
    fn test_viewport_fits_window() {
        for _ in 0..20 {
            let config = FingerprintConfig::randomized("tr-TR", "Europe/Istanbul", 1400, 800);
            assert_eq!((config.viewport_width, config.viewport_height), (1366, 768));
        }

        let small = FingerprintConfig::randomized("tr-TR", "Europe/Istanbul", 1024, 700);
        assert_eq!((small.viewport_width, small.viewport_height), (1024, 700));
    }

    #[test]
    fn test_fingerprint_variation() {
        let configs: Vec<_> = (0..20)
            .map(|_| FingerprintConfig::randomized("tr-TR", "Europe/Istanbul", 1920, 1080))
            .collect();

        let first_ua = &configs[0].user_agent;
        let all_same = configs.iter().all(|c| &c.user_agent == first_ua);
        assert!(!all_same, "Expected variation in user agents");
    }

    #[test]
    fn test_accept_language() {
        let config = FingerprintConfig::randomized("tr-TR", "Europe/Istanbul", 1920, 1080);
        assert!(config.accept_language().starts_with("tr-TR,tr;q=0.9"));
    }

    #[test]
    fn test_navigation_headers() {
        let config = FingerprintConfig::randomized("tr-TR", "Europe/Istanbul", 1920, 1080);
        let headers = config.navigation_headers();
        assert_eq!(headers["Upgrade-Insecure-Requests"], "1");
        assert_eq!(headers["Sec-Fetch-Mode"], "navigate");
        assert!(headers["Accept-Language"]
            .as_str()
            .is_some_and(|v| v.contains("tr")));
    }

    #[test]
    fn test_stealth_script_masks_markers() {
        assert!(STEALTH_SCRIPT.contains("navigator, 'webdriver'"));
        assert!(STEALTH_SCRIPT.contains("window.chrome"));
        assert!(STEALTH_SCRIPT.contains("'plugins'"));
    }
}
