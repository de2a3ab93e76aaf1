use find::{pipeline, StaticConnector};
use lambda_handlers::run_lambda;

#[tokio::main]
pub async fn main() -> Result<(), lambda_runtime::Error> {
  // TIP: Use the `log4rs` crate for more fine-grained control over logging.
  env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

  // Replace `StaticConnector` with a real address lookup backend.
  run_lambda(pipeline(StaticConnector::default())).await
}
