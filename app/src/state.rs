//! Application state: every long-lived service, wired once at startup.

use anyhow::Context;
use autosniper_browser::{BrowserEngine, SessionLauncher};
use autosniper_core::{AppConfig, ScanOrigin, SearchCriteria, UserId};
use autosniper_db::Database;
use autosniper_notify::{ConnectionRegistry, Notifier};
use autosniper_scanner::{DetailSource, HttpDetailSource, ScanOrchestrator, ScanOutcome};
use autosniper_scheduler::SchedulerService;
use std::sync::Arc;

/// Services shared by the transport layer and the background scheduler.
pub struct AppState {
    /// Loaded configuration
    pub config: AppConfig,
    /// Storage handle
    pub db: Database,
    /// Live real-time sessions per user
    pub registry: Arc<ConnectionRegistry>,
    /// The scan trigger used by on-demand and scheduled scans
    pub orchestrator: Arc<ScanOrchestrator>,
    /// Recurring scans and maintenance
    pub scheduler: SchedulerService,
}

impl AppState {
    /// Open storage and wire services using Chromium and plain HTTP.
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let launcher = Arc::new(BrowserEngine::new(config.browser.clone()));
        let details = Arc::new(
            HttpDetailSource::from_config(&config.scanning)
                .context("failed to build detail HTTP client")?,
        );
        Self::with_sources(config, launcher, details).await
    }

    /// Open storage and wire services around the given session and detail sources.
    pub async fn with_sources(
        config: AppConfig,
        launcher: Arc<dyn SessionLauncher>,
        details: Arc<dyn DetailSource>,
    ) -> anyhow::Result<Self> {
        let path = &config.database.path;
        let db = Database::with_max_connections(path, config.database.max_connections)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        db.run_migrations()
            .await
            .context("failed to run database migrations")?;

        let registry = Arc::new(ConnectionRegistry::new());
        let notifier =
            Notifier::from_config(Arc::clone(&registry), &config.notifications, db.clone());

        let orchestrator = Arc::new(ScanOrchestrator::new(
            launcher,
            Arc::clone(&details),
            db.clone(),
            notifier.clone(),
            &config.scanning,
        ));
        let scheduler = SchedulerService::new(
            db.clone(),
            orchestrator.clone(),
            details,
            notifier,
            config.scheduler.clone(),
        );

        Ok(Self {
            config,
            db,
            registry,
            orchestrator,
            scheduler,
        })
    }

    /// Run an on-demand scan for `user_id`.
    pub async fn quick_scan(
        &self,
        user_id: UserId,
        criteria: &SearchCriteria,
    ) -> autosniper_scanner::Result<ScanOutcome> {
        self.orchestrator
            .run_scan(criteria, &ScanOrigin::on_demand(user_id))
            .await
    }

    /// Start the scheduler if the configuration enables it.
    pub fn start_background(&self) -> anyhow::Result<()> {
        if !self.config.scheduler.enabled {
            tracing::info!("recurring scheduler disabled by configuration");
            return Ok(());
        }
        self.scheduler.start().context("failed to start scheduler")
    }

    /// Stop background work and close storage.
    pub async fn shutdown(self) {
        self.scheduler.stop().await;
        self.db.close().await;
    }
}
