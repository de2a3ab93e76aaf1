use crate::{ApiGatewayProxyRequestContext, Method};

use serde_json::Value;

use std::collections::HashMap;

/// Stage reported by the router front door, which is only used for local development.
pub const LOCAL_STAGE: &str = "dev";

/// Per-request context passed to handlers and middleware.
///
/// Besides describing where the request came from, the context carries a key/value store that
/// middleware can use to hand data to the layers it wraps. The store lives exactly as long as
/// the request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Context {
  source_ip: String,
  request_time_epoch: i64,
  user_agent: String,
  http_method: Method,
  stage: String,
  values: HashMap<String, Value>,
}

impl Context {
  /// Create a context from its parts.
  pub fn new(
    source_ip: impl Into<String>,
    request_time_epoch: i64,
    user_agent: impl Into<String>,
    http_method: Method,
    stage: impl Into<String>,
  ) -> Self {
    Self {
      source_ip: source_ip.into(),
      request_time_epoch,
      user_agent: user_agent.into(),
      http_method,
      stage: stage.into(),
      values: HashMap::new(),
    }
  }

  /// Build a context from an API Gateway proxy request context.
  pub fn from_apigw(request_context: &ApiGatewayProxyRequestContext) -> Self {
    Self::new(
      request_context
        .identity
        .source_ip
        .clone()
        .unwrap_or_default(),
      request_context.request_time_epoch,
      request_context
        .identity
        .user_agent
        .clone()
        .unwrap_or_default(),
      request_context.http_method.clone(),
      request_context.stage.clone().unwrap_or_default(),
    )
  }

  /// IP address of the client that made the request.
  pub fn source_ip(&self) -> &str {
    &self.source_ip
  }

  /// Time the request was received, in epoch milliseconds.
  pub fn unix_now(&self) -> i64 {
    self.request_time_epoch
  }

  /// Client user agent.
  pub fn user_agent(&self) -> &str {
    &self.user_agent
  }

  /// HTTP method of the request.
  pub fn http_method(&self) -> &Method {
    &self.http_method
  }

  /// Deployment stage (e.g., `prod`).
  pub fn stage(&self) -> &str {
    &self.stage
  }

  /// Value stored under `key` by an earlier middleware.
  pub fn value(&self, key: &str) -> Option<&Value> {
    self.values.get(key)
  }

  /// Store a value for the rest of the request, replacing any previous value.
  pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.values.insert(key.into(), value.into());
  }
}
