use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use cms_auth::cleanup::spawn_cleanup_job;
use cms_auth::configuration::get_configuration;
use cms_auth::email_client::{DisabledResetSender, EmailClient, ResetTokenSender};
use cms_auth::repository::{PgRefreshTokenStore, PgUserStore};
use cms_auth::startup::{build_auth_service, cookie_policy, run};
use cms_auth::telemetry::init_telemetry;
use sqlx::postgres::PgPoolOptions;

fn startup_error(kind: std::io::ErrorKind, what: &str) -> std::io::Error {
    std::io::Error::new(kind, what.to_string())
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

    let configuration = match get_configuration() {
        Ok(config) => {
            tracing::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(startup_error(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(configuration.database.max_connections)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            startup_error(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to run migrations: {}", e);
            startup_error(std::io::ErrorKind::Other, "Migration error")
        })?;

    tracing::info!("Database ready");

    let reset_sender: Arc<dyn ResetTokenSender> = match &configuration.email_client {
        Some(settings) => {
            let client = EmailClient::new(settings).map_err(|e| {
                tracing::error!("Failed to build email client: {}", e);
                startup_error(std::io::ErrorKind::InvalidInput, "Email client error")
            })?;
            Arc::new(client)
        }
        None => Arc::new(DisabledResetSender),
    };

    let auth = build_auth_service(
        &configuration,
        Arc::new(PgUserStore::new(pool.clone())),
        Arc::new(PgRefreshTokenStore::new(pool)),
        reset_sender,
    )
    .map_err(|e| {
        tracing::error!("Failed to initialise auth service: {}", e);
        startup_error(std::io::ErrorKind::InvalidInput, "Auth setup error")
    })?;

    let cleanup_every = Duration::from_secs(configuration.auth.cleanup_interval);
    let _cleanup = spawn_cleanup_job(auth.ledger().clone(), cleanup_every);
    tracing::info!(interval_secs = cleanup_every.as_secs(), "Cleanup job scheduled");

    let address = format!(
        "{}:{}",
        configuration.application.host, configuration.application.port
    );
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, auth, cookie_policy(&configuration))?;
    server.await
}
