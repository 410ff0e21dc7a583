//! Application assembly: config, database pool, caches, and service lifecycle.

use crate::config::Config;
use crate::data::lock;
use crate::guru::GuruClient;
use crate::pipeline::{PipelineConfig, PipelineRunner};
use crate::scheduler::Scheduler;
use crate::state::{AppState, CardCatalog, ServiceStatus, TranslationCache};
use crate::web::create_router;
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};

/// Main application struct containing all necessary components.
pub struct App {
    config: Config,
    app_state: AppState,
    shutdown_tx: broadcast::Sender<()>,
    services: Vec<(&'static str, tokio::task::JoinHandle<()>)>,
}

impl App {
    /// Create a new App instance with all necessary components initialized.
    pub async fn new() -> anyhow::Result<Self> {
        let config = Config::from_env().context("Failed to load config")?;

        let db_pool = PgPoolOptions::new()
            .min_connections(0)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(4))
            .idle_timeout(Duration::from_secs(60 * 2))
            .max_lifetime(Duration::from_secs(60 * 30))
            .connect(&config.database_url)
            .await
            .context("Failed to create database pool")?;

        info!(
            max_connections = 8,
            acquire_timeout = "4s",
            idle_timeout = "2m",
            max_lifetime = "30m",
            "database pool established"
        );

        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run database migrations")?;
        info!("Database migrations completed successfully");

        // The lock is single-process, so a lock held at startup can only be a
        // crash leftover. Orphaned staging instances are dropped at the start
        // of the next run.
        match lock::release_stale(&db_pool).await {
            Ok(true) => warn!("released stale update lock from a previous run"),
            Ok(false) => {}
            Err(e) => warn!(error = ?e, "failed to check for a stale update lock"),
        }

        let guru = Arc::new(
            GuruClient::new(&config.guru_base_url, &config.card_catalog_url)
                .context("Failed to create guru client")?,
        );
        let translations = Arc::new(RwLock::new(TranslationCache::default()));
        let catalog = Arc::new(RwLock::new(CardCatalog::default()));
        let runner = Arc::new(PipelineRunner::new(
            db_pool.clone(),
            guru.clone(),
            translations.clone(),
            catalog.clone(),
            PipelineConfig::from_config(&config),
        ));

        let app_state = AppState::new(
            db_pool,
            guru,
            translations,
            catalog,
            runner,
            config.lock_policy,
        );

        if let Err(e) = app_state.load_translation_cache().await {
            info!(error = %e, "Could not load translation cache on startup (may be empty)");
        }
        // Non-fatal: the runner refreshes the catalog at the start of every run.
        if let Err(e) = app_state.load_card_catalog().await {
            warn!(error = %e, "Could not load card catalog on startup");
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(App {
            config,
            app_state,
            shutdown_tx,
            services: Vec::new(),
        })
    }

    /// Spawn the web and scheduler services.
    pub fn start_services(&mut self) {
        {
            let state = self.app_state.clone();
            let port = self.config.port;
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            let statuses = state.service_statuses.clone();
            let handle = tokio::spawn(async move {
                statuses.set("web", ServiceStatus::Starting);
                let listener = match tokio::net::TcpListener::bind(("0.0.0.0", port)).await {
                    Ok(listener) => listener,
                    Err(e) => {
                        error!(port, error = ?e, "failed to bind web listener");
                        statuses.set("web", ServiceStatus::Error);
                        return;
                    }
                };
                info!(port, "Web service listening");
                statuses.set("web", ServiceStatus::Active);

                let router = create_router(state);
                let shutdown = async move {
                    let _ = shutdown_rx.recv().await;
                };
                if let Err(e) = axum::serve(
                    listener,
                    router.into_make_service_with_connect_info::<SocketAddr>(),
                )
                .with_graceful_shutdown(shutdown)
                .await
                {
                    error!(error = ?e, "web service terminated with error");
                    statuses.set("web", ServiceStatus::Error);
                }
            });
            self.services.push(("web", handle));
        }

        {
            let scheduler = Scheduler::new(
                self.app_state.db_pool.clone(),
                self.app_state.runner.clone(),
                self.config.refresh_hour_utc,
                self.app_state.service_statuses.clone(),
            );
            let shutdown_rx = self.shutdown_tx.subscribe();
            let handle = tokio::spawn(async move {
                scheduler.run(shutdown_rx).await;
            });
            self.services.push(("scheduler", handle));
        }
    }

    /// Run until a shutdown signal arrives, then stop services gracefully.
    pub async fn run(self) -> ExitCode {
        wait_for_shutdown_signal().await;
        info!("Shutdown signal received, stopping services");

        let _ = self.shutdown_tx.send(());
        let timeout = self.config.shutdown_timeout();
        for (name, handle) in self.services {
            if tokio::time::timeout(timeout, handle).await.is_err() {
                warn!(service = name, "service did not stop within the shutdown timeout");
            }
        }

        info!("Shutdown complete");
        ExitCode::SUCCESS
    }
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();
        let sigterm_recv = async {
            match sigterm.as_mut() {
                Some(s) => {
                    s.recv().await;
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
            _ = sigterm_recv => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
