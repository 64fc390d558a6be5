use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskboard::api::router;
use taskboard::auth::{AuthPort, FirebaseAuth, FirebaseAuthConfig, StaticTokenAuth};
use taskboard::config::{AppConfig, AuthMode, PersistenceBackend};
use taskboard::persistence::{
    FirestoreConfig, FirestorePersistence, MemoryPersistence, PersistencePort, SqlitePersistence,
};
use taskboard::services::{UsageCounters, UsageRecorder, UsageReporter};
use taskboard::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "taskboard=debug".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;

    let persistence: Arc<dyn PersistencePort> = match config.backend {
        PersistenceBackend::Sqlite => {
            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&config.database_url)
                .await?;
            let sqlite = SqlitePersistence::new(pool);
            sqlite.migrate().await?;
            info!("using sqlite backend at {}", config.database_url);
            Arc::new(sqlite)
        }
        PersistenceBackend::Firestore => {
            let firestore = FirestorePersistence::new(FirestoreConfig::new_from_env()?)?;
            info!("using firestore backend");
            Arc::new(firestore)
        }
        PersistenceBackend::Memory => {
            info!("using in-memory backend; tasks are lost on exit");
            Arc::new(MemoryPersistence::new())
        }
    };

    let auth: Arc<dyn AuthPort> = match config.auth_mode {
        AuthMode::Static => Arc::new(StaticTokenAuth::parse(&config.auth_tokens)?),
        AuthMode::Firebase => Arc::new(FirebaseAuth::new(FirebaseAuthConfig::new_from_env()?)?),
    };

    let usage: Arc<dyn UsageRecorder> = Arc::new(UsageCounters::new());
    let reporter = UsageReporter::new(usage.clone(), config.usage_reset_secs);
    tokio::spawn(reporter.start());

    let state = AppState {
        persistence,
        auth,
        usage,
    };

    let app = router(state);

    info!("listening on http://{}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
