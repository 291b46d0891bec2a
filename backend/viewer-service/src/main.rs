use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_actix_web::TracingLogger;

use viewer_service::config::Settings;
use viewer_service::http;
use viewer_service::startup::{self, Collaborators};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    startup::init_logging();
    info!("Starting viewer service");

    let settings = Settings::load().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    let resources = startup::connect(&settings).await?;
    let state = startup::build_state(
        &settings,
        Collaborators::from_resources(&resources, &settings),
    )?;
    let state = web::Data::new(state);

    let bind_address = settings.server.bind_address();
    info!("Listening on {}", bind_address);

    // actix installs SIGINT/SIGTERM handlers and drains in-flight requests
    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(state.clone())
            .configure(http::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .run()
    .await
    .context("HTTP server error")?;

    startup::shutdown(resources).await;
    info!("Viewer service shutdown complete");
    Ok(())
}
