use crate::apigw::dispatch_event;
use crate::Pipeline;

use aws_lambda_events::apigw::ApiGatewayProxyRequest;
use lambda_runtime::{service_fn, LambdaEvent};
use log::trace;

/// Start the Lambda runtime and run every API Gateway proxy event through `pipeline`.
///
/// Handler failures are reported to the caller as error responses. An event that can't be
/// translated into a [`Request`](crate::Request) fails the invocation instead.
///
/// # Example
///
/// ```rust,ignore
/// use lambda_handlers::{handler_fn, run_lambda, Pipeline, Response, StatusCode};
///
/// #[tokio::main]
/// pub async fn main() -> Result<(), lambda_runtime::Error> {
///   env_logger::init();
///
///   let pipeline = Pipeline::new(handler_fn(|_ctx, _request| {
///     Ok(Response::text(StatusCode::OK, "pong"))
///   }));
///
///   run_lambda(pipeline).await
/// }
/// ```
pub async fn run_lambda(pipeline: Pipeline) -> Result<(), lambda_runtime::Error> {
  let pipeline = &pipeline;
  lambda_runtime::run(service_fn(
    move |event: LambdaEvent<ApiGatewayProxyRequest>| async move {
      trace!("Lambda context: {:#?}", event.context);
      dispatch_event(pipeline, event.payload)
        .await
        .map_err(lambda_runtime::Error::from)
    },
  ))
  .await
}

