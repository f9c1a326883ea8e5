//! Detail-page enrichment with bounded concurrency.
//!
//! Every record with an identity URL gets one detail fetch. Admission is
//! gated by a semaphore and each fetch carries its own timeout, so a slow or
//! failing page only costs its own record's extra fields.

use crate::error::{Result, ScanError};
use crate::normalize::{is_valid_image, parse_price};
use async_trait::async_trait;
use autosniper_core::{
    AccidentHistory, DamageCategory, DamageReport, RawListing, ScanningConfig,
};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

const DETAIL_IMAGE_HOSTS: &[&str] = &["arbstorage", "mncdn", "ilanfoto"];
const DETAIL_IMAGE_REJECT: &[&str] = &["logo", "icon", "placeholder", "1x1", "pixel"];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector literal")
}

static IMG: Lazy<Selector> = Lazy::new(|| selector("img"));
static OG_IMAGE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:image"]"#));
static LOCATION: Lazy<Selector> = Lazy::new(|| selector("span.product-location span"));
static TABLE_ROW: Lazy<Selector> = Lazy::new(|| selector("tr"));
static CELL: Lazy<Selector> = Lazy::new(|| selector("td"));
static SCRIPT: Lazy<Selector> = Lazy::new(|| selector("script"));
static TRAMER_INFO: Lazy<Selector> = Lazy::new(|| selector("div.tramer-info"));
static PROPERTY_KEY: Lazy<Selector> = Lazy::new(|| selector("p.property-key"));
static PRODUCT_PRICE: Lazy<Selector> = Lazy::new(|| selector("span.product-price"));

static DAMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.damage\s*=\s*(\[.*?\]);").expect("valid damage regex")
});
/// An amount next to its currency marker, either `15.000 TL` or `₺15.000`.
static AMOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d[\d.,]*)\s*(?:TL|₺)|₺\s*(\d[\d.,]*)").expect("valid amount regex")
});

/// Where detail pages come from.
#[async_trait]
pub trait DetailSource: Send + Sync {
    /// Fetch the HTML of the detail page at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Plain HTTP detail fetches; detail pages do not need a rendering session.
pub struct HttpDetailSource {
    client: reqwest::Client,
}

impl HttpDetailSource {
    /// Client sending `user_agent` with a whole-request `timeout`.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client })
    }

    /// Client configured from the `[scanning]` section.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn from_config(config: &ScanningConfig) -> Result<Self> {
        Self::new(&config.user_agent, config.detail_timeout())
    }
}

#[async_trait]
impl DetailSource for HttpDetailSource {
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::DetailStatus(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Supplementary fields recovered from a detail page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailInfo {
    /// Photo URLs, primary image first
    pub images: Vec<String>,
    /// City from the location line
    pub city: Option<String>,
    /// Odometer reading in km
    pub mileage: Option<i64>,
    /// Paint/replacement report and accident history
    pub damage: Option<DamageReport>,
    /// Current asking price
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DamageEntry {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "ValueText", default)]
    value_text: Option<serde_json::Value>,
    #[serde(rename = "Value", default)]
    value: Option<serde_json::Value>,
}

impl DamageEntry {
    fn category(&self) -> DamageCategory {
        let text = self
            .value_text
            .as_ref()
            .map(json_text)
            .unwrap_or_default()
            .replace(' ', "");
        DamageCategory::from_value_text(&text).unwrap_or_else(|| {
            let code = self
                .value
                .as_ref()
                .and_then(|v| v.as_i64().or_else(|| json_text(v).trim().parse().ok()))
                .unwrap_or(-1);
            DamageCategory::from_value_code(code)
        })
    }
}

fn json_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn text_of(element: scraper::ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Parse the accident-history marker text.
///
/// An explicit "not declared" is [`AccidentHistory::Unspecified`]; text
/// without any amount is `None`.
#[must_use]
pub fn parse_accident_history(text: &str) -> Option<AccidentHistory> {
    if text.to_lowercase().contains("belirtilmemiş") {
        return Some(AccidentHistory::Unspecified);
    }
    let caps = AMOUNT_RE.captures(text)?;
    let amount = caps.get(1).or_else(|| caps.get(2))?;
    Some(AccidentHistory::Amount(parse_price(amount.as_str())))
}

fn parse_damage(document: &Html) -> DamageReport {
    let mut report = DamageReport::default();

    let entries = document
        .select(&SCRIPT)
        .map(|script| script.text().collect::<String>())
        .find(|text| text.contains("window.damage"))
        .and_then(|text| {
            let json = DAMAGE_RE.captures(&text)?.get(1)?.as_str().to_string();
            match serde_json::from_str::<Vec<DamageEntry>>(&json) {
                Ok(entries) => Some(entries),
                Err(e) => {
                    tracing::debug!("unreadable damage data: {}", e);
                    None
                }
            }
        })
        .unwrap_or_default();

    for entry in &entries {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            continue;
        };
        let category = entry.category();
        if !report.parts(category).iter().any(|p| p == name) {
            report.insert(category, name);
        }
    }

    report.accident_history = document
        .select(&TRAMER_INFO)
        .next()
        .and_then(|el| parse_accident_history(&text_of(el)))
        .or_else(|| {
            document
                .select(&PROPERTY_KEY)
                .map(text_of)
                .find(|text| text.to_lowercase().contains("tramer"))
                .and_then(|text| parse_accident_history(&text))
        });

    report
}

/// Parse a listing detail page.
#[must_use]
pub fn parse_detail_page(html: &str, max_images: usize) -> DetailInfo {
    let document = Html::parse_document(html);

    let mut images: Vec<String> = Vec::new();
    for img in document.select(&IMG) {
        let attrs = img.value();
        let src = attrs
            .attr("data-src")
            .or_else(|| attrs.attr("src"))
            .or_else(|| attrs.attr("data-original"))
            .unwrap_or_default();
        let lower = src.to_lowercase();
        if DETAIL_IMAGE_HOSTS.iter().any(|h| lower.contains(h))
            && !DETAIL_IMAGE_REJECT.iter().any(|b| lower.contains(b))
            && !images.iter().any(|i| i == src)
        {
            images.push(src.to_string());
        }
    }
    if let Some(primary) = document
        .select(&OG_IMAGE)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .filter(|src| is_valid_image(src))
    {
        images.retain(|i| i != primary);
        images.insert(0, primary.to_string());
    }
    images.truncate(max_images);

    let city = document
        .select(&LOCATION)
        .next()
        .map(text_of)
        .and_then(|location| location.rsplit(',').next().map(|c| c.trim().to_string()))
        .filter(|c| !c.is_empty());

    let mileage = document.select(&TABLE_ROW).find_map(|row| {
        let cells: Vec<_> = row.select(&CELL).collect();
        if cells.len() < 2 || !text_of(cells[0]).to_lowercase().contains("kilometre") {
            return None;
        }
        let digits: String = text_of(cells[1]).chars().filter(char::is_ascii_digit).collect();
        digits.parse::<i64>().ok()
    });

    let damage = Some(parse_damage(&document)).filter(|report| !report.is_empty());

    let price = document
        .select(&PRODUCT_PRICE)
        .next()
        .map(text_of)
        .and_then(|text| {
            let digits: String = text.chars().filter(char::is_ascii_digit).collect();
            digits.parse::<f64>().ok()
        })
        .filter(|price| *price > 0.0);

    DetailInfo {
        images,
        city,
        mileage,
        damage,
        price,
    }
}

/// Fills raw records from their detail pages.
#[derive(Clone)]
pub struct DetailEnricher {
    source: Arc<dyn DetailSource>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    max_images: usize,
}

impl DetailEnricher {
    /// Enricher admitting at most `concurrency` fetches at a time.
    pub fn new(
        source: Arc<dyn DetailSource>,
        concurrency: usize,
        timeout: Duration,
        max_images: usize,
    ) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            timeout,
            max_images,
        }
    }

    /// Enricher sized from the `[scanning]` section.
    pub fn from_config(source: Arc<dyn DetailSource>, config: &ScanningConfig) -> Self {
        Self::new(
            source,
            config.detail_concurrency,
            config.detail_timeout(),
            config.max_detail_images,
        )
    }

    /// Fetch and parse one detail page; any failure yields an empty result.
    pub async fn fetch_detail(&self, url: &str) -> DetailInfo {
        let Ok(_permit) = self.permits.acquire().await else {
            return DetailInfo::default();
        };

        match tokio::time::timeout(self.timeout, self.source.fetch(url)).await {
            Ok(Ok(html)) => parse_detail_page(&html, self.max_images),
            Ok(Err(e)) => {
                tracing::warn!(url = %url, "detail fetch failed: {}", e);
                DetailInfo::default()
            }
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?self.timeout, "detail fetch timed out");
                DetailInfo::default()
            }
        }
    }

    /// Enrich every record that has an identity URL.
    pub async fn enrich(&self, records: &mut [RawListing]) {
        let fetches = records
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.source_url.is_empty())
            .map(|(i, record)| {
                let url = record.source_url.clone();
                async move { (i, self.fetch_detail(&url).await) }
            });
        let details = futures::future::join_all(fetches).await;

        let mut enriched = 0usize;
        for (i, detail) in details {
            if detail != DetailInfo::default() {
                enriched += 1;
            }
            apply_detail(&mut records[i], detail);
        }
        tracing::info!(total = records.len(), enriched, "detail enrichment finished");
    }
}

/// Merge `detail` into `record` without overwriting what the results page gave.
pub fn apply_detail(record: &mut RawListing, detail: DetailInfo) {
    if record.images.is_empty() && !detail.images.is_empty() {
        record.images = detail.images;
    }
    if record.city.is_none() {
        record.city = detail.city;
    }
    if detail.mileage.is_some() {
        record.mileage = detail.mileage;
    }
    if detail.damage.is_some() {
        record.damage = detail.damage;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DETAIL_PAGE: &str = r#"<html><head>
        <meta property="og:image" content="https://arbstorage.mncdn.com/ilanfotograflari/2024/main.jpg">
        </head><body>
        <span class="product-location"><span>Merkez Kapaklı, Tekirdağ</span></span>
        <span class="product-price">1.245.000 TL</span>
        <img src="https://arbstorage.mncdn.com/ilanfotograflari/2024/1.jpg">
        <img data-src="https://arbstorage.mncdn.com/ilanfotograflari/2024/2.jpg" src="blank.gif">
        <img src="https://arbstorage.mncdn.com/ilanfotograflari/2024/main.jpg">
        <img src="https://www.arabam.com/logo.png">
        <table>
            <tr><td>Yıl</td><td>2018</td></tr>
            <tr><td>Kilometre</td><td>125.000 km</td></tr>
        </table>
        <script>
            window.damage = [
                {"Name": "Sol Ön Çamurluk", "ValueText": "painted", "Value": 3},
                {"Name": "Kaput", "ValueText": "Local Painted", "Value": 2},
                {"Name": "Tavan", "ValueText": "", "Value": 4},
                {"Name": "Bagaj", "ValueText": "original", "Value": 1},
                {"Name": "Sağ Kapı", "Value": "-1"}
            ];
        </script>
        <div class="tramer-info">Tramer tutarı 15.000 TL</div>
        </body></html>"#;

    #[test]
    fn test_parse_detail_page() {
        let info = parse_detail_page(DETAIL_PAGE, 5);

        assert_eq!(
            info.images,
            vec![
                "https://arbstorage.mncdn.com/ilanfotograflari/2024/main.jpg".to_string(),
                "https://arbstorage.mncdn.com/ilanfotograflari/2024/1.jpg".to_string(),
                "https://arbstorage.mncdn.com/ilanfotograflari/2024/2.jpg".to_string(),
            ]
        );
        assert_eq!(info.city.as_deref(), Some("Tekirdağ"));
        assert_eq!(info.mileage, Some(125_000));
        assert_eq!(info.price, Some(1_245_000.0));

        let damage = info.damage.expect("damage report");
        assert_eq!(damage.painted, vec!["Sol Ön Çamurluk".to_string()]);
        assert_eq!(damage.local_painted, vec!["Kaput".to_string()]);
        assert_eq!(damage.changed, vec!["Tavan".to_string()]);
        assert_eq!(damage.original, vec!["Bagaj".to_string()]);
        assert_eq!(damage.unspecified, vec!["Sağ Kapı".to_string()]);
        assert_eq!(damage.accident_history, Some(AccidentHistory::Amount(15_000.0)));
    }

    #[test]
    fn test_painted_code_lands_only_in_painted() {
        let html = r#"<script>window.damage = [{"Name": "Kaput", "ValueText": "x", "Value": 3}];</script>"#;
        let damage = parse_detail_page(html, 5).damage.expect("damage report");

        assert_eq!(damage.parts(DamageCategory::Painted), ["Kaput".to_string()]);
        for other in [
            DamageCategory::Original,
            DamageCategory::LocalPainted,
            DamageCategory::Changed,
            DamageCategory::Unspecified,
        ] {
            assert!(damage.parts(other).is_empty());
        }
    }

    #[test]
    fn test_accident_history_markers() {
        assert_eq!(
            parse_accident_history("Tramer tutarı Belirtilmemiş"),
            Some(AccidentHistory::Unspecified)
        );
        assert_eq!(
            parse_accident_history("Tramer tutarı 42.500 TL"),
            Some(AccidentHistory::Amount(42_500.0))
        );
        assert_eq!(parse_accident_history("Tramer tutarı"), None);
        assert_eq!(
            parse_accident_history("2019 model, tramer kaydı 8.750 TL"),
            Some(AccidentHistory::Amount(8_750.0))
        );
        assert_eq!(
            parse_accident_history("Tramer: ₺ 3.200"),
            Some(AccidentHistory::Amount(3_200.0))
        );
        assert_eq!(parse_accident_history("2021 yılında hasar kaydı"), None);

        let html = r#"<p class="property-key">Tramer Belirtilmemiş</p>"#;
        let damage = parse_detail_page(html, 5).damage.expect("damage report");
        assert_eq!(damage.accident_history, Some(AccidentHistory::Unspecified));
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        assert_eq!(parse_detail_page("<html></html>", 5), DetailInfo::default());
    }

    #[test]
    fn test_apply_detail_keeps_page_fields() {
        let mut record = RawListing::new("https://x/ilan/1", "Audi", 1.0);
        record.city = Some("İzmir".to_string());
        record.images = vec!["page.jpg".to_string()];

        apply_detail(
            &mut record,
            DetailInfo {
                images: vec!["detail.jpg".to_string()],
                city: Some("Ankara".to_string()),
                mileage: Some(90_000),
                damage: None,
                price: Some(2.0),
            },
        );

        assert_eq!(record.city.as_deref(), Some("İzmir"));
        assert_eq!(record.images, vec!["page.jpg".to_string()]);
        assert_eq!(record.mileage, Some(90_000));
        assert_eq!(record.price, 1.0);
    }

    struct FakeSource {
        pages: HashMap<String, String>,
        hang: Option<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeSource {
        fn new(pages: HashMap<String, String>, hang: Option<String>) -> Self {
            Self {
                pages,
                hang,
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DetailSource for FakeSource {
        async fn fetch(&self, url: &str) -> Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if self.hang.as_deref() == Some(url) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            } else {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.pages
                .get(url)
                .cloned()
                .ok_or(ScanError::DetailStatus(404))
        }
    }

    #[tokio::test]
    async fn test_enrich_is_bounded_and_isolates_failures() {
        let urls: Vec<String> = (0..12).map(|i| format!("https://x/ilan/{i}")).collect();
        let mut pages: HashMap<String, String> = urls
            .iter()
            .map(|u| (u.clone(), DETAIL_PAGE.to_string()))
            .collect();
        pages.remove(&urls[1]);

        let source = Arc::new(FakeSource::new(pages, Some(urls[2].clone())));
        let enricher = DetailEnricher::new(
            Arc::clone(&source) as Arc<dyn DetailSource>,
            5,
            Duration::from_millis(500),
            5,
        );

        let mut records: Vec<RawListing> = urls
            .iter()
            .map(|u| RawListing::new(u.clone(), "Audi A4", 850_000.0))
            .collect();
        records.push(RawListing::new("", "no url", 0.0));

        enricher.enrich(&mut records).await;

        assert!(source.peak.load(Ordering::SeqCst) <= 5);
        assert_eq!(records[0].mileage, Some(125_000));
        assert_eq!(records[1].mileage, None, "failed fetch keeps baseline fields");
        assert_eq!(records[2].mileage, None, "timed-out fetch keeps baseline fields");
        assert_eq!(records[11].city.as_deref(), Some("Tekirdağ"));
        assert!(records[12].images.is_empty());
    }
}
