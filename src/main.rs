use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use postroom::{
    application::error::AppError,
    cache::{CacheConfig, KeyScheme, MemoryStore, ResponseCache, ResponseStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, Diagnostics, HttpState},
        memory::InMemoryRepositories,
        telemetry,
    },
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const EXPIRED_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let store = Arc::new(MemoryStore::new());
    let cache = ResponseCache::new(
        CacheConfig::from(&settings.cache),
        store.clone() as Arc<dyn ResponseStore>,
        Arc::new(KeyScheme::default()),
    );
    let trending_limit = u64::from(settings.trending.limit.get());

    let state = match settings.database.url.as_deref() {
        Some(url) => {
            let repositories = Arc::new(init_repositories(url, &settings).await?);
            HttpState::assemble(repositories.clone(), cache, trending_limit)
                .with_database(repositories)
        }
        None => {
            warn!(
                target = "postroom::serve",
                "database url is not configured; serving from the in-memory store"
            );
            HttpState::assemble(
                Arc::new(InMemoryRepositories::new()),
                cache,
                trending_limit,
            )
        }
    };

    // Expired entries are unreachable already; the sweep only reclaims memory.
    let sweeper = settings.cache.enabled.then(|| {
        let store = store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EXPIRED_SWEEP_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let purged = store.purge_expired();
                if purged > 0 {
                    info!(target = "postroom::cache", purged, "Swept expired cache entries");
                }
            }
        })
    });

    let diagnostics = Diagnostics {
        expose: !settings.environment.is_production(),
    };

    let result = serve_http(&settings, state, diagnostics).await;

    if let Some(handle) = sweeper {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::Migration(err.to_string()))?;

    info!(target = "postroom::migrate", "Migrations applied");
    Ok(())
}

async fn init_repositories(
    url: &str,
    settings: &config::Settings,
) -> Result<PostgresRepositories, AppError> {
    let pool = PostgresRepositories::connect(url, settings.database.max_connections.get())
        .await
        .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| InfraError::Migration(err.to_string()))?;

    Ok(PostgresRepositories::new(pool))
}

async fn serve_http(
    settings: &config::Settings,
    state: HttpState,
    diagnostics: Diagnostics,
) -> Result<(), AppError> {
    let router = http::build_router(state, diagnostics);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;

    info!(
        target = "postroom::serve",
        addr = %settings.server.addr,
        environment = settings.environment.as_str(),
        cache_enabled = settings.cache.enabled,
        "Listening"
    );

    let shutdown = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown({
            let shutdown = shutdown.clone();
            async move { shutdown.notified().await }
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = drain_deadline(shutdown, grace) => {
            warn!(
                target = "postroom::serve",
                grace_seconds = grace.as_secs(),
                "Grace period elapsed with connections still open"
            );
        }
    }

    Ok(())
}

/// Resolves once a shutdown was requested and the grace period has run out.
async fn drain_deadline(shutdown: Arc<Notify>, grace: Duration) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "postroom::serve", error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }

    info!(
        target = "postroom::serve",
        grace_seconds = grace.as_secs(),
        "Shutdown requested; draining connections"
    );
    shutdown.notify_one();
    tokio::time::sleep(grace).await;
}
