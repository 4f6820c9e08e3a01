//! Demo HTTP server binary (spec.md §6.5 "boot sequence" / environment).

use search_sim_core::context::ServerContext;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).with_level(true).init();

    let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());
    let models_dir = std::env::var("MODELS_DIR").unwrap_or_else(|_| "./models".to_string());
    let listen = std::env::var("HTTP_LISTEN").unwrap_or_else(|_| "0.0.0.0:8081".to_string());

    tracing::info!("starting search-sim-server: data_dir={data_dir} models_dir={models_dir} listen={listen}");

    let ctx = ServerContext::new(data_dir.as_str(), models_dir.as_str())?;
    let app = search_sim_core::http_api::router(ctx);

    let addr: SocketAddr = listen.parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
