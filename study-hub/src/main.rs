use axum::{routing::get, serve, Router};
use clap::Parser;
use std::sync::Arc;
use study_hub::api;
use study_hub_core::hub::StudyHub;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "study-hub", about = "Collaborative chess study server")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:3000")]
    listen: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    let hub = Arc::new(StudyHub::new());
    let app = Router::new()
        .merge(api::router(hub))
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&args.listen).await?;
    tracing::info!(addr = %args.listen, "listening");
    serve(listener, app.into_make_service()).await?;
    Ok(())
}
