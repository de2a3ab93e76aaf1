use lambda_handlers::async_trait::async_trait;
use lambda_handlers::{Context, Middleware, Next, Request, Response};
use log::info;

use std::time::Instant;

/// Logs one line per request with its outcome and latency.
pub struct LogRequests;

#[async_trait]
impl Middleware for LogRequests {
  async fn wrap(
    &self,
    ctx: &mut Context,
    request: Request,
    next: Next<'_>,
  ) -> anyhow::Result<Response> {
    let method = request.method().clone();
    let path = request.path().to_string();
    let start = Instant::now();

    let result = next.run(ctx, request).await;
    match &result {
      Ok(response) => info!(
        "{method} {path} from {} -> {:?} in {:?}",
        ctx.source_ip(),
        response.status(),
        start.elapsed(),
      ),
      Err(err) => info!(
        "{method} {path} from {} -> error ({err}) in {:?}",
        ctx.source_ip(),
        start.elapsed(),
      ),
    }
    result
  }
}
