use actix_web::{middleware::Logger, web, App, HttpServer};
use actix_web::dev::Server;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthService, TokenStore};
use crate::middleware::JwtMiddleware;
use crate::routes::{
    change_password, get_current_user, health_check, login, logout, refresh,
    revoke_all_sessions,
};

pub fn run(listener: TcpListener, service: AuthService) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(service.clone())

            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))

            // Protected routes: the bearer middleware is the sole gate
            .service(
                web::scope("/auth")
                    .wrap(JwtMiddleware)
                    .route("/me", web::get().to(get_current_user))
                    .route("/change-password", web::post().to(change_password))
                    .route("/revoke-all", web::post().to(revoke_all_sessions)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}

/// Spawn the recurring sweep of expired refresh-token records.
///
/// Runs off the request path; a failed sweep is logged and retried on the
/// next tick.
pub fn spawn_sweeper(
    tokens: Arc<dyn TokenStore>,
    interval_seconds: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match tokens.sweep_expired().await {
                Ok(0) => {}
                Ok(removed) => {
                    tracing::info!(removed = removed, "Swept expired refresh tokens");
                }
                Err(e) => {
                    tracing::error!(error = %e, "Refresh token sweep failed");
                }
            }
        }
    })
}
