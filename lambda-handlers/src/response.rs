use crate::private::encoding::to_json;
use crate::service_error::{ErrorCode, ErrorEnvelope, ServiceError};
use crate::{HeaderMap, StatusCode};

use headers::{ContentType, HeaderMapExt};
use http::header::IntoHeaderName;
use http::HeaderValue;
use serde::Serialize;

/// Response produced by a handler (or by the error mapper when a handler fails).
///
/// The status code starts out unset. [`Response::write`] enforces that non-2xx responses always
/// carry a JSON body: a plain-text body written with an error status is wrapped in the canonical
/// error envelope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Response {
  status: Option<StatusCode>,
  headers: HeaderMap,
  body: String,
}

impl Response {
  /// Create a response with a status code and no body.
  pub fn new(status: StatusCode) -> Self {
    Self {
      status: Some(status),
      ..Default::default()
    }
  }

  /// Create a response with a status code and a body, subject to the rules of
  /// [`Response::write`].
  pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
    let mut response = Self::new(status);
    response.write(body);
    response
  }

  /// Create a JSON response by serializing `model`.
  ///
  /// A `Content-Type: application/json` header is added.
  pub fn json<T>(
    status: StatusCode,
    model: &T,
  ) -> Result<Self, serde_path_to_error::Error<serde_json::Error>>
  where
    T: Serialize + ?Sized,
  {
    let body = to_json(model)?;
    let mut response = Self::new(status);
    response.headers.typed_insert(ContentType::json());
    response.write(body);
    Ok(response)
  }

  /// Create a JSON response carrying an error envelope.
  pub fn from_envelope(status: StatusCode, envelope: &ErrorEnvelope) -> Self {
    let mut response = Self::new(status);
    response.headers.typed_insert(ContentType::json());
    response.body = envelope.to_json();
    response
  }

  /// Status code, if one has been set.
  pub fn status(&self) -> Option<StatusCode> {
    self.status
  }

  /// Set the status code. The last call wins.
  pub fn set_status(&mut self, status: StatusCode) {
    self.status = Some(status);
  }

  /// Whether the status code is in the 200-299 range. An unset status is not.
  pub fn is_success(&self) -> bool {
    self.status.is_some_and(|status| status.is_success())
  }

  /// Response headers.
  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  /// Mutable access to the response headers.
  pub fn headers_mut(&mut self) -> &mut HeaderMap {
    &mut self.headers
  }

  /// Append a header value, keeping any values already present under the same name.
  pub fn add_header<K>(&mut self, name: K, value: HeaderValue)
  where
    K: IntoHeaderName,
  {
    self.headers.append(name, value);
  }

  /// Response body.
  pub fn body(&self) -> &str {
    &self.body
  }

  /// Set the response body.
  ///
  /// If the status is outside the 200-299 range and the body is not a JSON object or array, the
  /// body is replaced by an error envelope whose code is derived from the status and whose message
  /// is the original text (unwrapped first if it was a JSON string literal).
  pub fn write(&mut self, body: impl Into<String>) {
    let body = body.into();
    self.body = if !self.is_success() && !is_json_container(&body) {
      let message = serde_json::from_str::<String>(&body).unwrap_or(body);
      let code = ErrorCode::from_status(self.status);
      ServiceError::new(code, message).envelope().to_json()
    } else {
      body
    };
  }

  pub(crate) fn into_parts(self) -> (Option<StatusCode>, HeaderMap, String) {
    (self.status, self.headers, self.body)
  }
}

fn is_json_container(body: &str) -> bool {
  matches!(
    serde_json::from_str::<serde_json::Value>(body),
    Ok(serde_json::Value::Object(_) | serde_json::Value::Array(_))
  )
}
