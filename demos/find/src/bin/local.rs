use anyhow::Context as _;
use find::{pipeline, StaticConnector};
use log::info;

use std::net::SocketAddr;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  let listen_addr =
    std::env::var("FIND_LISTEN_ADDR").unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());

  let app = lambda_handlers::router::route("/find", pipeline(StaticConnector::default()));

  let listener = tokio::net::TcpListener::bind(&listen_addr)
    .await
    .with_context(|| format!("failed to bind {listen_addr}"))?;
  info!("Listening on http://{listen_addr}/find");

  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .await
  .context("server failed")
}
