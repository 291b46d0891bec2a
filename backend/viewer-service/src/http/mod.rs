//! HTTP surface of the viewer service.
use actix_web::web;

pub mod credentials;
pub mod handlers;

pub use credentials::AuthenticatedUser;
pub use handlers::ApiResponse;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(handlers::health))
        .route("/metrics", web::get().to(handlers::metrics))
        .service(
            web::scope("/api/v1")
                .service(
                    web::scope("/users")
                        .route("/register", web::post().to(handlers::register))
                        .route("/login", web::post().to(handlers::login))
                        .route("/refresh-token", web::post().to(handlers::refresh_token))
                        .route("/logout", web::post().to(handlers::logout))
                        .route("/current-user", web::get().to(handlers::current_user))
                        .route("/change-password", web::post().to(handlers::change_password))
                        .route("/history", web::get().to(handlers::watch_history)),
                )
                .service(
                    web::scope("/videos")
                        .route("/{video_id}/views", web::post().to(handlers::record_view)),
                ),
        );
}
