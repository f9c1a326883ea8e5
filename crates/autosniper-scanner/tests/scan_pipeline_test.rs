use async_trait::async_trait;
use autosniper_browser::{BrowserActions, BrowserError, LoadState, SessionLauncher};
use autosniper_core::{ScanOrigin, ScanningConfig, SearchCriteria, UserId};
use autosniper_db::{filters, listings, Database};
use autosniper_notify::{ConnectionRegistry, NotificationEvent, Notifier};
use autosniper_scanner::{DetailSource, ExtractionEngine, ScanError, ScanOrchestrator};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BASE: &str = "https://www.arabam.com";

fn row(id: u32, title: &str, price: &str) -> String {
    format!(
        r#"<tr class="listing-list-item">
            <td><img class="listing-image" src="https://arbstorage.mncdn.com/ilanfotograflari/{id}/a.jpg" alt="{title}"></td>
            <td><a href="/ilan/galeriden-satilik/{id}">{title}</a></td>
            <td class="listing-price">{price}</td>
        </tr>"#
    )
}

/// One Audi at 850.000 TL followed by four BMWs at 1.500.000 TL.
fn results_page() -> String {
    let mut rows = row(40_000_000, "2018 Audi A4 2.0 TDI Dizel Otomatik", "850.000 TL");
    for i in 1..5 {
        rows.push_str(&row(
            40_000_000 + i,
            &format!("2019 BMW 320i Benzin Otomatik #{i}"),
            "1.500.000 TL",
        ));
    }
    format!(
        r#"<html><head><title>İkinci El Otomobil</title></head><body>
        <table class="listing-table"><tbody>{rows}</tbody></table>
        </body></html>"#
    )
}

struct FakeSession {
    title: String,
    content: String,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserActions for FakeSession {
    async fn navigate(&self, _url: &str) -> autosniper_browser::Result<LoadState> {
        Ok(LoadState::NetworkIdle)
    }

    async fn reload(&self) -> autosniper_browser::Result<LoadState> {
        Ok(LoadState::NetworkIdle)
    }

    async fn scroll_full_height(&self) -> autosniper_browser::Result<()> {
        Ok(())
    }

    async fn title(&self) -> autosniper_browser::Result<String> {
        Ok(self.title.clone())
    }

    async fn content(&self) -> autosniper_browser::Result<String> {
        Ok(self.content.clone())
    }

    async fn close(&self) -> autosniper_browser::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeLauncher {
    title: String,
    content: String,
    unavailable: bool,
    closes: Arc<AtomicUsize>,
}

impl FakeLauncher {
    fn serving(title: &str, content: String) -> Self {
        Self {
            title: title.to_string(),
            content,
            unavailable: false,
            closes: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl SessionLauncher for FakeLauncher {
    async fn launch(&self) -> autosniper_browser::Result<Box<dyn BrowserActions>> {
        if self.unavailable {
            return Err(BrowserError::Launch("no chromium binary".to_string()));
        }
        Ok(Box::new(FakeSession {
            title: self.title.clone(),
            content: self.content.clone(),
            closes: Arc::clone(&self.closes),
        }))
    }
}

/// Detail pages are unreachable; records keep their results-page fields.
struct NoDetails;

#[async_trait]
impl DetailSource for NoDetails {
    async fn fetch(&self, _url: &str) -> autosniper_scanner::Result<String> {
        Err(ScanError::DetailStatus(503))
    }
}

fn test_config() -> ScanningConfig {
    ScanningConfig {
        base_url: BASE.to_string(),
        min_page_length: 100,
        block_retry_pause_secs: 0,
        settle_pause_secs: 0,
        ..ScanningConfig::default()
    }
}

async fn setup_db() -> Database {
    let db = Database::new(":memory:").await.expect("create test database");
    db.run_migrations().await.expect("run migrations");
    db
}

fn orchestrator(
    launcher: Arc<FakeLauncher>,
    db: &Database,
    registry: Arc<ConnectionRegistry>,
) -> ScanOrchestrator {
    let notifier = Notifier::new(registry, None, db.clone());
    ScanOrchestrator::new(launcher, Arc::new(NoDetails), db.clone(), notifier, &test_config())
}

fn owner() -> UserId {
    UserId::new("user-42").expect("valid user id")
}

#[tokio::test]
async fn test_matching_listing_notifies_filter_owner_once() {
    let db = setup_db().await;
    let registry = Arc::new(ConnectionRegistry::new());
    let (_handle, mut events) = registry.connect(&owner()).await;

    let criteria = SearchCriteria {
        brand: Some("Audi".to_string()),
        max_price: Some(900_000.0),
        ..SearchCriteria::default()
    };
    let filter = filters::create_filter(db.pool(), &owner(), "ucuz audi", &criteria)
        .await
        .expect("create filter");

    let launcher = Arc::new(FakeLauncher::serving("İkinci El Otomobil", results_page()));
    let scanner = orchestrator(Arc::clone(&launcher), &db, Arc::clone(&registry));

    let outcome = scanner
        .run_scan(&SearchCriteria::default(), &ScanOrigin::on_demand(owner()))
        .await
        .expect("scan succeeds");

    assert_eq!(outcome.extracted, 5);
    assert_eq!(outcome.newly_stored, 5);
    assert_eq!(outcome.matched, 1);
    assert_eq!(launcher.closes.load(Ordering::SeqCst), 1);

    let event = events.try_recv().expect("one real-time event");
    match event {
        NotificationEvent::NewListing {
            listing,
            filter_id,
            filter_name,
            ..
        } => {
            assert_eq!(filter_id, filter.id);
            assert_eq!(filter_name, "ucuz audi");
            assert_eq!(listing.price, 850_000.0);
            assert!(listing.title.contains("Audi"));
        }
    }
    assert!(events.try_recv().is_err(), "exactly one event expected");

    let stored = listings::get_listing_by_url(
        db.pool(),
        "https://www.arabam.com/ilan/galeriden-satilik/40000000",
    )
    .await
    .expect("query listing")
    .expect("listing stored");
    assert_eq!(stored.user_id, Some(owner()));
    assert_eq!(stored.record.brand.as_deref(), Some("Audi"));
}

#[tokio::test]
async fn test_second_scan_stores_nothing() {
    let db = setup_db().await;
    let registry = Arc::new(ConnectionRegistry::new());
    filters::create_filter(db.pool(), &owner(), "her şey", &SearchCriteria::default())
        .await
        .expect("create filter");
    let launcher = Arc::new(FakeLauncher::serving("İkinci El Otomobil", results_page()));
    let scanner = orchestrator(launcher, &db, Arc::clone(&registry));
    let origin = ScanOrigin::on_demand(owner());

    let first = scanner
        .run_scan(&SearchCriteria::default(), &origin)
        .await
        .expect("first scan");
    assert_eq!(first.newly_stored, 5);
    assert_eq!(first.matched, 5);

    let (_handle, mut events) = registry.connect(&owner()).await;
    let second = scanner
        .run_scan(&SearchCriteria::default(), &origin)
        .await
        .expect("second scan");

    assert_eq!(second.extracted, 5);
    assert_eq!(second.newly_stored, 0);
    assert_eq!(second.matched, 0);
    assert!(events.try_recv().is_err(), "no events for already stored listings");
    assert_eq!(listings::count_listings(db.pool()).await.expect("count"), 5);
}

#[tokio::test]
async fn test_unavailable_session_is_an_error() {
    let db = setup_db().await;
    let launcher = Arc::new(FakeLauncher {
        unavailable: true,
        ..FakeLauncher::serving("", String::new())
    });
    let scanner = orchestrator(launcher, &db, Arc::new(ConnectionRegistry::new()));

    let result = scanner
        .run_scan(&SearchCriteria::default(), &ScanOrigin::on_demand(owner()))
        .await;

    assert!(matches!(result, Err(ScanError::SessionUnavailable(_))));
}

#[tokio::test]
async fn test_blocked_page_yields_empty_outcome() {
    let db = setup_db().await;
    let launcher = Arc::new(FakeLauncher::serving(
        "503 Backend fetch failed",
        results_page(),
    ));
    let scanner = orchestrator(Arc::clone(&launcher), &db, Arc::new(ConnectionRegistry::new()));

    let outcome = scanner
        .run_scan(&SearchCriteria::default(), &ScanOrigin::on_demand(owner()))
        .await
        .expect("blocked page is not an error");

    assert_eq!(outcome, autosniper_scanner::ScanOutcome::default());
    assert_eq!(launcher.closes.load(Ordering::SeqCst), 1, "session closed after a failed scan");
    assert_eq!(listings::count_listings(db.pool()).await.expect("count"), 0);
}

#[tokio::test]
async fn test_scheduled_origin_is_recorded() {
    let db = setup_db().await;
    let filter = filters::create_filter(db.pool(), &owner(), "audi", &SearchCriteria::default())
        .await
        .expect("create filter");
    let launcher = Arc::new(FakeLauncher::serving("İkinci El Otomobil", results_page()));
    let scanner = orchestrator(launcher, &db, Arc::new(ConnectionRegistry::new()));

    scanner
        .run_scan(
            &filter.criteria,
            &ScanOrigin::scheduled(owner(), filter.id.clone()),
        )
        .await
        .expect("scan succeeds");

    let stored = listings::get_listing_by_url(
        db.pool(),
        "https://www.arabam.com/ilan/galeriden-satilik/40000001",
    )
    .await
    .expect("query listing")
    .expect("listing stored");
    assert_eq!(stored.filter_id, Some(filter.id));
    assert!(stored.is_new);
}

/// Two card links the link strategy can read, and four bare links it cannot.
fn cards_and_bare_links_page() -> String {
    let cards: String = [
        (36_000_001, "Volkswagen Golf 1.6 TDI Comfortline"),
        (36_000_002, "Renault Megane 1.5 dCi Touch"),
    ]
    .iter()
    .map(|(id, title)| {
        format!(
            r#"<li class="card">
                <img src="https://arbstorage.mncdn.com/ilan/{id}/1.jpg" alt="{title}">
                <a class="link-overlay" href="/ilan/galeriden-satilik/{id}">{title}</a>
                <span>990.000 TL</span>
            </li>"#
        )
    })
    .collect();
    let bare: String = (10..14)
        .map(|i| {
            format!(
                r#"<div><a href="/ilan/sahibinden-honda-civic-eco-elegance/360000{i}">Civic</a>
                <span>845.000 TL</span></div>"#
            )
        })
        .collect();
    format!(
        r#"<html><head><title>İkinci El Otomobil</title></head><body>
        <ul>{cards}</ul><section>{bare}</section>
        </body></html>"#
    )
}

#[tokio::test]
async fn test_extraction_falls_through_to_raw_text() {
    let session = FakeSession {
        title: "İkinci El Otomobil".to_string(),
        content: cards_and_bare_links_page(),
        closes: Arc::new(AtomicUsize::new(0)),
    };
    let engine = ExtractionEngine::new(test_config());

    let records = engine.extract(&session, &SearchCriteria::default()).await;

    // No listing rows; the link strategy finds two, raw text adds the other four
    let urls: Vec<&str> = records.iter().map(|r| r.source_url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://www.arabam.com/ilan/galeriden-satilik/36000001",
            "https://www.arabam.com/ilan/galeriden-satilik/36000002",
            "https://www.arabam.com/ilan/sahibinden-honda-civic-eco-elegance/36000010",
            "https://www.arabam.com/ilan/sahibinden-honda-civic-eco-elegance/36000011",
            "https://www.arabam.com/ilan/sahibinden-honda-civic-eco-elegance/36000012",
            "https://www.arabam.com/ilan/sahibinden-honda-civic-eco-elegance/36000013",
        ]
    );
    assert_eq!(records[0].title, "Volkswagen Golf 1.6 TDI Comfortline");
    assert_eq!(records[0].price, 990_000.0);
    assert_eq!(records[0].images.len(), 1);
    assert_eq!(records[2].title, "Honda Civic Eco Elegance");
    assert_eq!(records[2].price, 845_000.0);
    assert_eq!(records[2].brand.as_deref(), Some("Honda"));
}
