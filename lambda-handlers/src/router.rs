use crate::error::RequestError;
use crate::multipart::{is_multipart, parse_boundary, parse_form};
use crate::query::QueryParams;
use crate::{Context, Pipeline, Request, Response, StatusCode, LOCAL_STAGE};

use axum::extract::rejection::PathRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::response::IntoResponse;
use axum::routing::any;
use axum::Router;
use backtrace::Backtrace;
use bytes::Bytes;
use http::header::USER_AGENT;
use http::request::Parts;
use http_body_util::LengthLimitError;
use log::{debug, trace};

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Largest request body the router front door will buffer.
pub const MAX_BODY_BYTES: usize = 10 << 20;

/// Build an [`axum::Router`] that serves every method on `path` through `pipeline`.
///
/// `path` uses `axum` route syntax, so captures such as `/products/{id}` become path
/// parameters.
///
/// # Example
///
/// ```rust,ignore
/// let app = lambda_handlers::router::route("/find", pipeline);
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
/// axum::serve(
///   listener,
///   app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
/// )
/// .await?;
/// ```
pub fn route(path: &str, pipeline: Pipeline) -> Router {
  Router::new()
    .route(path, any(serve))
    .with_state(Arc::new(pipeline))
}

/// `axum` handler that runs the request through `pipeline`.
///
/// The client address is taken from [`ConnectInfo`] when the server was started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub async fn serve(
  State(pipeline): State<Arc<Pipeline>>,
  request: axum::extract::Request,
) -> axum::response::Response {
  let (mut parts, body) = request.into_parts();

  let path_params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &()).await
  {
    Ok(Path(path_params)) => path_params,
    Err(PathRejection::MissingPathParams(_)) => HashMap::new(),
    Err(rejection) => return rejection.into_response(),
  };

  let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
    Ok(body) => body,
    Err(err) => {
      let err = err.into_inner();
      let err = if is_length_limit_error(&*err) {
        RequestError::BodyTooLarge(MAX_BODY_BYTES, Backtrace::new())
      } else {
        RequestError::ReadBody(err, Backtrace::new())
      };
      return Response::from(err).into_response();
    }
  };

  let mut ctx = context_from_parts(&parts);
  trace!("Context: {ctx:#?}");

  let request = match request_from_parts(parts, path_params, body).await {
    Ok(request) => request,
    Err(err) => return Response::from(err).into_response(),
  };

  pipeline.call(&mut ctx, request).await.into_response()
}

fn is_length_limit_error(err: &(dyn std::error::Error + Send + Sync + 'static)) -> bool {
  let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
  while let Some(err) = current {
    if err.is::<LengthLimitError>() {
      return true;
    }
    current = err.source();
  }
  false
}

fn context_from_parts(parts: &Parts) -> Context {
  let source_ip = parts
    .extensions
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.ip().to_string())
    .unwrap_or_default();
  let user_agent = parts
    .headers
    .get(USER_AGENT)
    .and_then(|value| value.to_str().ok())
    .unwrap_or_default();

  Context::new(
    source_ip,
    chrono::Utc::now().timestamp_millis(),
    user_agent,
    parts.method.clone(),
    LOCAL_STAGE,
  )
}

async fn request_from_parts(
  parts: Parts,
  path_params: HashMap<String, String>,
  body: Bytes,
) -> Result<Request, RequestError> {
  let remote_addr = parts
    .extensions
    .get::<ConnectInfo<SocketAddr>>()
    .map(|ConnectInfo(addr)| addr.to_string())
    .unwrap_or_default();

  let query = parts
    .uri
    .query()
    .map(QueryParams::parse)
    .unwrap_or_default();

  let multipart_form = if is_multipart(&parts.headers) {
    let boundary = parse_boundary(&parts.headers)?;
    Some(parse_form(body.clone(), boundary).await?)
  } else {
    None
  };

  debug!("Built {} request for {}", parts.method, parts.uri);

  Ok(Request {
    method: parts.method,
    uri: parts.uri,
    remote_addr,
    headers: parts.headers,
    query,
    path_params,
    body,
    multipart_form,
  })
}

impl IntoResponse for Response {
  /// Write every header value as-is. An unset status is reported as 500.
  fn into_response(self) -> axum::response::Response {
    let (status, headers, body) = self.into_parts();
    let mut response = axum::response::Response::new(axum::body::Body::from(body));
    *response.status_mut() = status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    *response.headers_mut() = headers;
    response
  }
}

#[cfg(test)]
mod tests;
