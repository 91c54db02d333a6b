use sqlx::postgres::PgPoolOptions;
use std::net::TcpListener;
use std::sync::Arc;

use shopauth::accounts::PgAccountRepository;
use shopauth::auth::{AuthService, PgTokenStore, TokenStore};
use shopauth::configuration::get_configuration;
use shopauth::startup::{run, spawn_sweeper};
use shopauth::telemetry::init_telemetry;

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
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    let connection_string = configuration.database.connection_string();
    tracing::info!("Attempting to connect to database");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&connection_string)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    tracing::info!("Database connection pool created successfully");

    let accounts = Arc::new(PgAccountRepository::new(pool.clone()));
    let tokens: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(pool));

    let service = AuthService::new(
        accounts,
        tokens.clone(),
        configuration.jwt.clone(),
        configuration.hashing.clone(),
    );

    spawn_sweeper(tokens, configuration.application.sweep_interval_seconds);

    let address = format!("127.0.0.1:{}", configuration.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on: {}", address);

    let server = run(listener, service)?;
    server.await
}
