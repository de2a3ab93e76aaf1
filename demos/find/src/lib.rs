use lambda_handlers::async_trait::async_trait;
use lambda_handlers::{
  Context, Handler, HeaderMap, Pipeline, Request, Response, ServiceError, StatusCode,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::error::Error;

/// Request logging middleware.
pub mod middleware;

/// Token accepted by [`StaticConnector::default`].
pub const DEFAULT_TOKEN: &str = "authToken";

/// Example response model.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub struct ExampleModel {
  pub success: bool,
}

/// Errors reported by a [`Connector`].
#[derive(Debug, Error)]
pub enum ConnectorError {
  #[error("invalid authorization token")]
  InvalidToken,
  #[error("no addresses found for postcode `{0}`")]
  NotFound(String),
  #[error("address lookup failed")]
  Backend(#[source] Box<dyn Error + Send + Sync + 'static>),
}

/// Backend used by [`FindHandler`] to authorize callers and look up addresses.
#[async_trait]
pub trait Connector: Send + Sync {
  /// Check the caller's `Authorization` header value.
  async fn authorize(&self, token: &str) -> Result<(), ConnectorError>;

  /// Find the addresses for a postcode.
  async fn find(&self, postcode: &str) -> Result<serde_json::Value, ConnectorError>;
}

/// Handles `GET /find?postcode=...`.
pub struct FindHandler<C> {
  connector: C,
}

impl<C> FindHandler<C> {
  pub fn new(connector: C) -> Self {
    Self { connector }
  }
}

#[async_trait]
impl<C> Handler for FindHandler<C>
where
  C: Connector,
{
  async fn handle(&self, _ctx: &mut Context, request: Request) -> anyhow::Result<Response> {
    self
      .connector
      .authorize(request.auth_token())
      .await
      .map_err(handler_error)?;

    let postcode = request
      .query("postcode")
      .ok_or_else(|| ServiceError::bad_request("postcode required"))?;

    let addresses = self
      .connector
      .find(postcode)
      .await
      .map_err(handler_error)?;

    Ok(Response::json(StatusCode::OK, &addresses)?)
  }
}

// Client-facing connector failures become service errors. Anything else stays opaque and is
// reported as a 500.
fn handler_error(err: ConnectorError) -> anyhow::Error {
  match err {
    ConnectorError::InvalidToken => ServiceError::unauthorized(err.to_string()).into(),
    ConnectorError::NotFound(_) => ServiceError::not_found(err.to_string()).into(),
    ConnectorError::Backend(_) => err.into(),
  }
}

/// Connector that accepts a single token and answers every lookup with the same model.
pub struct StaticConnector {
  token: String,
  model: ExampleModel,
}

impl StaticConnector {
  pub fn new(token: impl Into<String>, model: ExampleModel) -> Self {
    Self {
      token: token.into(),
      model,
    }
  }
}

impl Default for StaticConnector {
  fn default() -> Self {
    Self::new(DEFAULT_TOKEN, ExampleModel { success: true })
  }
}

#[async_trait]
impl Connector for StaticConnector {
  async fn authorize(&self, token: &str) -> Result<(), ConnectorError> {
    if token == self.token {
      Ok(())
    } else {
      Err(ConnectorError::InvalidToken)
    }
  }

  async fn find(&self, _postcode: &str) -> Result<serde_json::Value, ConnectorError> {
    serde_json::to_value(&self.model).map_err(|err| ConnectorError::Backend(Box::new(err)))
  }
}

/// Build the service's pipeline around `connector`.
pub fn pipeline<C>(connector: C) -> Pipeline
where
  C: Connector + 'static,
{
  let mut default_headers = HeaderMap::new();
  default_headers.insert(
    "content-type",
    lambda_handlers::HeaderValue::from_static("application/json"),
  );

  Pipeline::new(FindHandler::new(connector))
    .with_middleware(middleware::LogRequests)
    .with_headers(default_headers)
}
