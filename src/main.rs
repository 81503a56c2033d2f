use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use fluxgate::config::{Settings, DEFAULT_CONFIG_FILE};
use fluxgate::replicate::{Predictor, ReplicateClient};
use fluxgate::server;
use std::env;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: ./fluxgate [config file]";

fn get_args() -> anyhow::Result<String> {
    let args: Vec<String> = env::args().skip(1).collect();
    match args.as_slice() {
        [] => Ok(DEFAULT_CONFIG_FILE.to_string()),
        [path] => Ok(path.clone()),
        _ => anyhow::bail!(USAGE),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config_file = get_args()?;
    let settings = Settings::load(&config_file)
        .with_context(|| format!("failed to load configuration from {config_file}"))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&settings.log))
        .init();

    info!("loaded settings: {settings:?}");
    if settings.replicate.api_token.is_empty() {
        warn!("no Replicate API token configured: inference requests will fail");
    }

    let client = ReplicateClient::new(settings.replicate.clone())
        .context("failed to build the Replicate client")?;
    let predictor: Arc<dyn Predictor> = Arc::new(client);
    let predictor = web::Data::from(predictor);

    let addr = settings.bind_addr();
    info!("listening on {}:{}", addr.0, addr.1);

    // Start the HTTP server
    HttpServer::new(move || {
        App::new()
            .app_data(predictor.clone())
            .wrap(middleware::Logger::default())
            .configure(server::configure)
    })
    .bind(addr)
    .context("failed to bind the HTTP listener")?
    .run()
    .await?;

    Ok(())
}
