// src/main.rs

use std::{error::Error, sync::Arc, time::Duration};

use exam_platform::{
    adapters::{
        mailer::LogNotifier,
        memory::MemoryStore,
        postgres::{PgStore, run_migrations},
        razorpay::RazorpayGateway,
    },
    config::Config,
    ports::SystemClock,
    routes,
    state::AppState,
};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let gateway = Arc::new(RazorpayGateway::new(&config.razorpay)?);
    let notifier = Arc::new(LogNotifier);
    let clock = Arc::new(SystemClock);

    let state = match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_with_retry(url).await?;
            tracing::info!("Running migrations...");
            run_migrations(&pool).await?;
            tracing::info!("Migrations applied successfully.");
            AppState::new(config.clone(), Arc::new(PgStore::new(pool)), gateway, notifier, clock)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory and lost on exit");
            AppState::new(config.clone(), Arc::new(MemoryStore::new()), gateway, notifier, clock)
        }
    };

    let app = routes::create_router(state);

    tracing::info!("Listening on {}", config.bind_address);
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_with_retry(url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) if retry_count < 5 => {
                retry_count += 1;
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {}): {}",
                    retry_count,
                    e
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
