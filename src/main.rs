use std::net::SocketAddr;
use std::time::Duration;

use dotenvy::dotenv;
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::MigratorTrait;
use tower_sessions::ExpiredDeletion;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vestibule::accounts::UserStore;
use vestibule::config::Config;
use vestibule::migration::Migrator;
use vestibule::session_store::DbSessionStore;
use vestibule::tokens::TokenStore;
use vestibule::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    dotenv().ok();
    let config = Config::from_env()?;

    let mut opt = ConnectOptions::new(config.database_url.as_str());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(10))
        .max_lifetime(Duration::from_secs(10 * 60));
    let db = Database::connect(opt).await?;

    info!("applying pending migrations");
    Migrator::up(&db, None).await?;

    let session_store = DbSessionStore::new(db.clone());

    // Hourly sweep of expired session rows. Access tokens are filtered at
    // read time instead and never swept.
    let cleanup_store = session_store.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(3600));
        loop {
            tick.tick().await;
            if let Err(e) = cleanup_store.delete_expired().await {
                error!(error = %e, "expired session cleanup failed");
            }
        }
    });

    let state = AppState {
        users: UserStore::new(db.clone()),
        tokens: TokenStore::new(db, config.token_validity()),
        config: config.clone(),
    };
    let app = web::app(state, session_store);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
