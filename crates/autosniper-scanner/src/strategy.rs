//! Prioritized extraction strategies over a rendered results page.
//!
//! Each strategy turns a [`ResultPage`] into raw records on its own. The
//! [`StrategyChain`] runs them most-specific first and stops once the
//! records collected so far reach the minimum yield; records from earlier
//! strategies are kept, later ones only add identity URLs not seen yet.

use crate::normalize::{
    extract_brand, extract_city, extract_fuel_type, extract_price_from_text, extract_transmission,
    extract_year, is_valid_image, parse_price, resolve_url, title_from_url, truncate_chars,
    MIN_PLAUSIBLE_PRICE,
};
use autosniper_core::{RawListing, ScanningConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};

/// Longest title kept from page markup.
pub const MAX_TITLE_CHARS: usize = 200;

/// Path fragments of links that are never listings.
const SKIP_PATTERNS: &[&str] = &["/satildi", "/login", "/kayit", "/filtre", "/compare", "/favori"];

/// Titles shorter than this are replaced by a slug-derived one.
const MIN_TITLE_CHARS: usize = 10;

/// Images kept per record from the results page.
const MAX_PAGE_IMAGES: usize = 3;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector literal")
}

static ROW_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "table.listing-table tr.listing-list-item",
        "tr.listing-list-item",
        "table.listing-table tbody tr",
    ]
    .into_iter()
    .map(selector)
    .collect()
});
static LINK_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    [
        "a.link-overlay",
        "a[href*='/ilan/'][href*='/detay']",
        "a[href*='/ilan/']",
    ]
    .into_iter()
    .map(selector)
    .collect()
});
static ROW_IMAGE: Lazy<Selector> =
    Lazy::new(|| selector("img.listing-image, img[class*='listing']"));
static ANY_IMAGE: Lazy<Selector> = Lazy::new(|| selector("img"));
static LISTING_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href*='/ilan/']"));
static PRICE_CELL: Lazy<Selector> =
    Lazy::new(|| selector("[class*='price'], .listing-price, td:last-child"));
static STORAGE_IMAGE: Lazy<Selector> = Lazy::new(|| selector("img[src*='arbstorage']"));

static IMAGE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{7,10})/").expect("valid image id regex"));
static LISTING_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(\d{7,10})(?:/|$|\?)").expect("valid listing id regex"));
static HREF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"href="([^"]*/ilan/[^"]*)""#).expect("valid href regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));

/// A rendered results page, parsed once and shared by every strategy.
pub struct ResultPage<'a> {
    raw: &'a str,
    document: Html,
    base_url: &'a str,
}

impl<'a> ResultPage<'a> {
    /// Parse `raw` HTML served from `base_url`.
    #[must_use]
    pub fn parse(raw: &'a str, base_url: &'a str) -> Self {
        Self {
            raw,
            document: Html::parse_document(raw),
            base_url,
        }
    }

    fn resolve(&self, href: &str) -> Option<String> {
        let url = resolve_url(self.base_url, href)?;
        let lower = url.to_lowercase();
        if !lower.contains("/ilan/") || SKIP_PATTERNS.iter().any(|p| lower.contains(p)) {
            return None;
        }
        Some(url)
    }
}

/// One way of pulling raw records out of a results page.
pub trait ExtractionStrategy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Extract records; an empty vector means this strategy found nothing.
    fn extract(&self, page: &ResultPage<'_>) -> Vec<RawListing>;
}

fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    SPACE_RE.replace_all(joined.trim(), " ").into_owned()
}

/// Fill the attributes inferred from free text.
fn infer_attributes(record: &mut RawListing, text: &str) {
    record.year = extract_year(text);
    record.brand = extract_brand(text);
    record.city = extract_city(text);
    record.fuel_type = extract_fuel_type(text);
    record.transmission = extract_transmission(text);
}

/// Dedicated listing-row markup: the most reliable source when present.
pub struct ListingRowStrategy {
    max_rows: usize,
}

impl ListingRowStrategy {
    /// Consider at most `max_rows` rows.
    #[must_use]
    pub fn new(max_rows: usize) -> Self {
        Self { max_rows }
    }

    fn parse_row(page: &ResultPage<'_>, row: ElementRef<'_>) -> Option<RawListing> {
        let img = row
            .select(&ROW_IMAGE)
            .next()
            .or_else(|| row.select(&ANY_IMAGE).next())?;
        let alt = img.value().attr("alt").unwrap_or_default().trim();
        if alt.is_empty() {
            return None;
        }

        let href = row.select(&LISTING_LINK).next()?.value().attr("href")?;
        let url = page.resolve(href)?;

        let mut src = img.value().attr("src").unwrap_or_default();
        if src.is_empty() || src.to_lowercase().contains("placeholder") || src.contains("1x1") {
            src = img
                .value()
                .attr("data-src")
                .or_else(|| img.value().attr("data-original"))
                .unwrap_or_default();
        }

        let mut price = row
            .select(&PRICE_CELL)
            .next()
            .map_or(0.0, |cell| parse_price(&element_text(cell)));
        if price == 0.0 {
            price = extract_price_from_text(&element_text(row));
        }

        let mut record = RawListing::new(url, truncate_chars(alt, MAX_TITLE_CHARS), price);
        infer_attributes(&mut record, alt);
        record.description = Some(alt.to_string());
        if is_valid_image(src) {
            if let Some(src) = resolve_url(page.base_url, src) {
                record.images.push(src);
            }
        }
        Some(record)
    }
}

impl ExtractionStrategy for ListingRowStrategy {
    fn name(&self) -> &'static str {
        "listing-rows"
    }

    fn extract(&self, page: &ResultPage<'_>) -> Vec<RawListing> {
        let rows: Vec<ElementRef<'_>> = ROW_SELECTORS
            .iter()
            .map(|sel| page.document.select(sel).collect::<Vec<_>>())
            .find(|rows| !rows.is_empty())
            .unwrap_or_default();

        rows.into_iter()
            .take(self.max_rows)
            .filter_map(|row| Self::parse_row(page, row))
            .collect()
    }
}

struct LinkCandidate {
    url: String,
    href: String,
    texts: Vec<String>,
    container_text: Option<String>,
}

/// Listing links anywhere on the page, with context from the enclosing card.
pub struct LinkStrategy {
    max_links: usize,
}

impl LinkStrategy {
    /// Consider at most `max_links` distinct listing URLs.
    #[must_use]
    pub fn new(max_links: usize) -> Self {
        Self { max_links }
    }

    /// Closest card-like ancestor, else the third ancestor element.
    fn container(link: ElementRef<'_>) -> Option<ElementRef<'_>> {
        let mut ancestors = link.ancestors().filter_map(ElementRef::wrap);
        let card = link.ancestors().filter_map(ElementRef::wrap).find(|el| {
            let name = el.value().name();
            let class = el.value().attr("class").unwrap_or_default();
            matches!(name, "tr" | "article" | "li")
                || class.contains("listing-item")
                || class.contains("card")
        });
        card.or_else(|| ancestors.nth(2))
    }

    fn candidates(&self, page: &ResultPage<'_>) -> Vec<LinkCandidate> {
        let links: Vec<ElementRef<'_>> = LINK_SELECTORS
            .iter()
            .map(|sel| page.document.select(sel).collect::<Vec<_>>())
            .find(|links| !links.is_empty())
            .unwrap_or_default();

        let mut candidates: Vec<LinkCandidate> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for link in links {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Some(url) = page.resolve(href) else {
                continue;
            };

            let slot = *index.entry(url.clone()).or_insert_with(|| {
                candidates.push(LinkCandidate {
                    url,
                    href: href.to_string(),
                    texts: Vec::new(),
                    container_text: None,
                });
                candidates.len() - 1
            });
            let candidate = &mut candidates[slot];

            let text = element_text(link);
            if !text.is_empty() {
                candidate.texts.push(text);
            }
            if candidate.container_text.is_none() {
                candidate.container_text = Self::container(link).map(element_text);
            }
        }

        candidates
    }

    /// Listing id → (image URLs, alt text) for storage-hosted images.
    fn storage_images(page: &ResultPage<'_>) -> HashMap<String, (Vec<String>, String)> {
        let mut images: HashMap<String, (Vec<String>, String)> = HashMap::new();
        for img in page.document.select(&STORAGE_IMAGE) {
            let src = img.value().attr("src").unwrap_or_default();
            let Some(caps) = IMAGE_ID_RE.captures(src) else {
                continue;
            };
            let entry = images.entry(caps[1].to_string()).or_insert_with(|| {
                (
                    Vec::new(),
                    img.value().attr("alt").unwrap_or_default().trim().to_string(),
                )
            });
            if !entry.0.iter().any(|s| s == src) {
                entry.0.push(src.to_string());
            }
        }
        images
    }
}

impl ExtractionStrategy for LinkStrategy {
    fn name(&self) -> &'static str {
        "listing-links"
    }

    fn extract(&self, page: &ResultPage<'_>) -> Vec<RawListing> {
        let images = Self::storage_images(page);
        let mut records = Vec::new();

        for candidate in self.candidates(page).into_iter().take(self.max_links) {
            let listing_id = LISTING_ID_RE
                .captures(&candidate.href)
                .map(|caps| caps[1].to_string());

            let (mut title, found_images): (String, Vec<String>) = listing_id
                .and_then(|id| images.get(&id))
                .map(|(imgs, alt)| {
                    let imgs = imgs.iter().take(MAX_PAGE_IMAGES).cloned().collect();
                    (alt.clone(), imgs)
                })
                .unwrap_or_default();
            if title.chars().count() < MIN_TITLE_CHARS {
                title = title_from_url(&candidate.href);
            }
            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }

            let mut price = candidate
                .texts
                .iter()
                .filter(|t| t.contains("TL") || t.contains('₺'))
                .map(|t| parse_price(t))
                .find(|p| *p > MIN_PLAUSIBLE_PRICE)
                .unwrap_or(0.0);
            if price == 0.0 {
                if let Some(text) = &candidate.container_text {
                    price = extract_price_from_text(text);
                }
            }

            let mut record =
                RawListing::new(candidate.url, truncate_chars(&title, MAX_TITLE_CHARS), price);
            infer_attributes(&mut record, &title);
            record.description = Some(title);
            record.images = found_images;
            records.push(record);
        }

        records
    }
}

/// Regex over the raw markup, for pages whose structure matches nothing else.
pub struct RawTextStrategy {
    max_links: usize,
}

impl RawTextStrategy {
    /// Consider at most `max_links` distinct listing URLs.
    #[must_use]
    pub fn new(max_links: usize) -> Self {
        Self { max_links }
    }
}

impl ExtractionStrategy for RawTextStrategy {
    fn name(&self) -> &'static str {
        "raw-text"
    }

    fn extract(&self, page: &ResultPage<'_>) -> Vec<RawListing> {
        let hits: Vec<(usize, usize, &str)> = HREF_RE
            .captures_iter(page.raw)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let href = caps.get(1)?;
                Some((whole.start(), whole.end(), href.as_str()))
            })
            .collect();

        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for (i, (_, end, href)) in hits.iter().enumerate() {
            if records.len() >= self.max_links {
                break;
            }
            let Some(url) = page.resolve(href) else {
                continue;
            };
            if !seen.insert(url.clone()) {
                continue;
            }

            let title = title_from_url(href);
            if title.chars().count() < MIN_TITLE_CHARS {
                continue;
            }

            let segment_end = hits.get(i + 1).map_or(page.raw.len(), |next| next.0);
            let segment = page.raw.get(*end..segment_end).unwrap_or_default();
            let text = SPACE_RE
                .replace_all(&TAG_RE.replace_all(segment, " "), " ")
                .trim()
                .to_string();

            let mut record = RawListing::new(
                url,
                truncate_chars(&title, MAX_TITLE_CHARS),
                extract_price_from_text(&text),
            );
            infer_attributes(&mut record, &format!("{title} {text}"));
            record.year = extract_year(href).or_else(|| extract_year(&text));
            record.description = Some(title);
            records.push(record);
        }

        records
    }
}

/// Ordered strategies with a minimum-yield fallthrough rule.
pub struct StrategyChain {
    strategies: Vec<Box<dyn ExtractionStrategy>>,
    min_yield: usize,
}

impl StrategyChain {
    /// Chain `strategies` in priority order.
    #[must_use]
    pub fn new(strategies: Vec<Box<dyn ExtractionStrategy>>, min_yield: usize) -> Self {
        Self {
            strategies,
            min_yield,
        }
    }

    /// Rows, then links, then raw text, sized from `config`.
    #[must_use]
    pub fn standard(config: &ScanningConfig) -> Self {
        Self::new(
            vec![
                Box::new(ListingRowStrategy::new(config.max_rows)),
                Box::new(LinkStrategy::new(config.max_links)),
                Box::new(RawTextStrategy::new(config.max_links)),
            ],
            config.min_strategy_yield,
        )
    }

    /// Run strategies until the collected records reach the minimum yield.
    ///
    /// The result never holds two records with the same identity URL.
    #[must_use]
    pub fn run(&self, page: &ResultPage<'_>) -> Vec<RawListing> {
        let mut records: Vec<RawListing> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for strategy in &self.strategies {
            let found = strategy.extract(page);
            let yielded = found.len();
            for record in found {
                if seen.insert(record.source_url.clone()) {
                    records.push(record);
                }
            }
            tracing::debug!(
                strategy = strategy.name(),
                yielded,
                total = records.len(),
                "extraction strategy finished"
            );
            if records.len() >= self.min_yield {
                break;
            }
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.arabam.com";

    fn row(id: u32, title: &str, price: &str) -> String {
        format!(
            r#"<tr class="listing-list-item">
                <td><img class="listing-image" src="https://arbstorage.mncdn.com/ilanfotograflari/{id}/a.jpg" alt="{title}"></td>
                <td><a href="/ilan/galeriden-satilik-audi-a4/{id}">{title}</a></td>
                <td class="listing-price">{price}</td>
            </tr>"#
        )
    }

    fn rows_page(count: u32) -> String {
        let rows: String = (0..count)
            .map(|i| {
                let title = format!("2018 Audi A4 2.0 TDI Dizel Otomatik #{i}");
                row(30_000_000 + i, &title, "1.250.000 TL")
            })
            .collect();
        format!(
            r#"<html><body><table class="listing-table"><tbody>{rows}</tbody></table></body></html>"#
        )
    }

    #[test]
    fn test_listing_rows() {
        let html = rows_page(3);
        let page = ResultPage::parse(&html, BASE);
        let records = ListingRowStrategy::new(25).extract(&page);

        assert_eq!(records.len(), 3);
        let first = &records[0];
        assert_eq!(
            first.source_url,
            "https://www.arabam.com/ilan/galeriden-satilik-audi-a4/30000000"
        );
        assert_eq!(first.price, 1_250_000.0);
        assert_eq!(first.year, Some(2018));
        assert_eq!(first.brand.as_deref(), Some("Audi"));
        assert_eq!(first.fuel_type.as_deref(), Some("dizel"));
        assert_eq!(first.transmission.as_deref(), Some("otomatik"));
        assert_eq!(first.images.len(), 1);
    }

    #[test]
    fn test_listing_rows_respects_cap() {
        let html = rows_page(30);
        let page = ResultPage::parse(&html, BASE);
        assert_eq!(ListingRowStrategy::new(25).extract(&page).len(), 25);
    }

    #[test]
    fn test_row_uses_lazy_image_and_text_price() {
        let html = r#"<table class="listing-table"><tr class="listing-list-item">
            <td><img src="https://www.arabam.com/placeholder.png" data-src="https://arbstorage.mncdn.com/x/31000000/b.jpg" alt="BMW 320i 2016 Benzin"></td>
            <td><a href="/ilan/bmw-320i/31000000">BMW</a></td>
            <td>Fiyat 980.000 TL</td>
        </tr></table>"#;
        let page = ResultPage::parse(html, BASE);
        let records = ListingRowStrategy::new(25).extract(&page);

        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].images,
            vec!["https://arbstorage.mncdn.com/x/31000000/b.jpg".to_string()]
        );
        assert_eq!(records[0].price, 980_000.0);
    }

    #[test]
    fn test_row_without_title_is_skipped() {
        let html = r#"<table class="listing-table"><tr class="listing-list-item">
            <td><img src="a.jpg"></td><td><a href="/ilan/x/31000000">x</a></td>
        </tr></table>"#;
        let page = ResultPage::parse(html, BASE);
        assert!(ListingRowStrategy::new(25).extract(&page).is_empty());
    }

    #[test]
    fn test_link_strategy() {
        let html = r#"<html><body><ul>
            <li class="card">
                <img src="https://arbstorage.mncdn.com/ilan/34567890/1.jpg" alt="Volkswagen Passat 1.6 TDI BlueMotion">
                <a class="link-overlay" href="/ilan/sahibinden-volkswagen-passat/34567890">Passat</a>
                <span>1.150.000 TL</span>
            </li>
            <li class="card">
                <a class="link-overlay" href="/ilan/galeriden-satilik-renault-clio-1-5-dci-touch-2019-model-izmir/34567891">Clio 720.000 TL</a>
            </li>
            <li><a class="link-overlay" href="/ilan/satildi/34567892">sold</a></li>
        </ul></body></html>"#;
        let page = ResultPage::parse(html, BASE);
        let records = LinkStrategy::new(50).extract(&page);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Volkswagen Passat 1.6 TDI BlueMotion");
        assert_eq!(records[0].price, 1_150_000.0);
        assert_eq!(records[0].images.len(), 1);
        assert_eq!(records[1].title, "Renault Clio Dci Touch");
        assert_eq!(records[1].price, 720_000.0);
    }

    #[test]
    fn test_raw_text_strategy() {
        let html = r#"<div><a href="/ilan/galeriden-satilik-fiat-egea-1-3-multijet-urban-2020-model/35000001">x</a>
            <p>2020</p><p>Dizel</p><p>615.000 TL</p></div>
            <div><a href="/ilan/sahibinden-toyota-corolla-1-6-vision/35000002">y</a><p>845.000 TL</p></div>"#;
        let page = ResultPage::parse(html, BASE);
        let records = RawTextStrategy::new(50).extract(&page);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "Fiat Egea Multijet Urban");
        assert_eq!(records[0].price, 615_000.0);
        assert_eq!(records[0].year, Some(2020));
        assert_eq!(records[0].fuel_type.as_deref(), Some("dizel"));
        assert_eq!(records[1].price, 845_000.0);
    }

    struct Fixed(&'static str, Vec<&'static str>);

    impl ExtractionStrategy for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        fn extract(&self, _page: &ResultPage<'_>) -> Vec<RawListing> {
            self.1
                .iter()
                .map(|url| RawListing::new(*url, self.0, 500_000.0))
                .collect()
        }
    }

    #[test]
    fn test_chain_stops_at_threshold() {
        let chain = StrategyChain::new(
            vec![
                Box::new(Fixed("first", vec!["a", "b"])),
                Box::new(Fixed("second", vec!["c"])),
            ],
            2,
        );
        let page = ResultPage::parse("", BASE);
        let records = chain.run(&page);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.title == "first"));
    }

    #[test]
    fn test_chain_falls_through_and_unions() {
        let chain = StrategyChain::new(
            vec![
                Box::new(Fixed("first", vec!["a"])),
                Box::new(Fixed("second", vec!["a", "b", "b"])),
                Box::new(Fixed("third", vec!["c"])),
            ],
            5,
        );
        let page = ResultPage::parse("", BASE);
        let records = chain.run(&page);

        let urls: Vec<_> = records.iter().map(|r| r.source_url.as_str()).collect();
        assert_eq!(urls, vec!["a", "b", "c"]);
        assert_eq!(records[0].title, "first");
    }
}
