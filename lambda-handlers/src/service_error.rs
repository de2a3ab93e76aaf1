use crate::{Response, StatusCode};

use log::{debug, error};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Identifier and code reported for errors that are not [`ServiceError`]s.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Client-facing message reported for errors that are not [`ServiceError`]s.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred";

/// Symbolic error code used by handler logic instead of raw HTTP status codes.
///
/// Each code maps to exactly one HTTP status code (see [`ErrorCode::status_code`]), and
/// [`ErrorCode::from_status`] performs the reverse lookup.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
  /// 400 Bad Request.
  BadRequest,
  /// 401 Unauthorized.
  Unauthorized,
  /// 403 Forbidden.
  Forbidden,
  /// 404 Not Found.
  NotFound,
  /// 408 Request Timeout.
  RequestTimeout,
  /// 409 Conflict.
  Conflict,
  /// 422 Unprocessable Entity.
  UnprocessableEntity,
  /// 500 Internal Server Error.
  InternalServerError,
  /// 501 Not Implemented.
  NotImplemented,
  /// 302 Found.
  Found,
  /// 301 Moved Permanently.
  MovedPermanently,
}

impl ErrorCode {
  /// Every recognized code.
  pub const ALL: [ErrorCode; 11] = [
    ErrorCode::BadRequest,
    ErrorCode::Unauthorized,
    ErrorCode::Forbidden,
    ErrorCode::NotFound,
    ErrorCode::RequestTimeout,
    ErrorCode::Conflict,
    ErrorCode::UnprocessableEntity,
    ErrorCode::InternalServerError,
    ErrorCode::NotImplemented,
    ErrorCode::Found,
    ErrorCode::MovedPermanently,
  ];

  /// HTTP status code associated with this error code.
  pub fn status_code(self) -> StatusCode {
    match self {
      ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
      ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
      ErrorCode::Forbidden => StatusCode::FORBIDDEN,
      ErrorCode::NotFound => StatusCode::NOT_FOUND,
      ErrorCode::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
      ErrorCode::Conflict => StatusCode::CONFLICT,
      ErrorCode::UnprocessableEntity => StatusCode::UNPROCESSABLE_ENTITY,
      ErrorCode::InternalServerError => StatusCode::INTERNAL_SERVER_ERROR,
      ErrorCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
      ErrorCode::Found => StatusCode::FOUND,
      ErrorCode::MovedPermanently => StatusCode::MOVED_PERMANENTLY,
    }
  }

  /// Error code associated with an HTTP status code.
  ///
  /// Statuses without a symbolic code (including an unset status) map to
  /// [`ErrorCode::InternalServerError`].
  pub fn from_status(status: Option<StatusCode>) -> Self {
    status
      .and_then(|status| {
        Self::ALL
          .into_iter()
          .find(|code| code.status_code() == status)
      })
      .unwrap_or(ErrorCode::InternalServerError)
  }

  /// Symbolic name of the code (e.g., `NOT_FOUND`).
  pub fn as_str(self) -> &'static str {
    match self {
      ErrorCode::BadRequest => "BAD_REQUEST",
      ErrorCode::Unauthorized => "UNAUTHORIZED",
      ErrorCode::Forbidden => "FORBIDDEN",
      ErrorCode::NotFound => "NOT_FOUND",
      ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
      ErrorCode::Conflict => "CONFLICT",
      ErrorCode::UnprocessableEntity => "UNPROCESSABLE_ENTITY",
      ErrorCode::InternalServerError => "INTERNAL_SERVER_ERROR",
      ErrorCode::NotImplemented => "NOT_IMPLEMENTED",
      ErrorCode::Found => "FOUND",
      ErrorCode::MovedPermanently => "MOVED_PERMANENTLY",
    }
  }

  /// Human-readable message used when no message is available.
  pub fn default_message(self) -> &'static str {
    match self {
      ErrorCode::BadRequest => "Bad Request",
      ErrorCode::Unauthorized => "Unauthorized",
      ErrorCode::Forbidden => "Forbidden",
      ErrorCode::NotFound => "Not Found",
      ErrorCode::RequestTimeout => "Request Timeout",
      ErrorCode::Conflict => "Conflict",
      ErrorCode::UnprocessableEntity => "Unprocessable Entity",
      ErrorCode::InternalServerError => "Internal Service Error",
      ErrorCode::NotImplemented => "Not Implemented",
      ErrorCode::Found => "Found",
      ErrorCode::MovedPermanently => "Moved Permanently",
    }
  }
}

impl Display for ErrorCode {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Returned when parsing a string that is not a recognized [`ErrorCode`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unrecognized error code `{0}`")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
  type Err = UnknownErrorCode;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|code| code.as_str() == s)
      .ok_or_else(|| UnknownErrorCode(s.to_string()))
  }
}

macro_rules! service_error_constructors {
  ($($fn_name:ident => $code:ident),* $(,)?) => {
    $(
      #[doc = concat!("Create an [`ErrorCode::", stringify!($code), "`] error.")]
      pub fn $fn_name(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::$code, message)
      }
    )*
  };
}

/// Application error carrying a symbolic [`ErrorCode`].
///
/// Handlers return these (typically via `anyhow`) to choose the HTTP status and message the
/// caller sees. Any other error is reported to the caller as an opaque 500.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
  id: String,
  code: ErrorCode,
  message: String,
}

impl ServiceError {
  /// Create an error whose identifier is the same as its code.
  pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
    Self::with_id(code.as_str(), code, message)
  }

  /// Create an error with a distinct identifier. An empty identifier falls back to the code.
  pub fn with_id(id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
    let id = id.into();
    Self {
      id: if id.is_empty() {
        code.as_str().to_string()
      } else {
        id
      },
      code,
      message: message.into(),
    }
  }

  /// Create an error for an HTTP status, using the code's default message.
  pub fn from_status(status: Option<StatusCode>) -> Self {
    let code = ErrorCode::from_status(status);
    Self::new(code, code.default_message())
  }

  /// Wrap `err` with a message prefix (`"{message}: {err}"`).
  ///
  /// The identifier and code of the first [`ServiceError`] in `err`'s chain are kept. Any other
  /// error becomes [`ErrorCode::InternalServerError`]. Unlike [`anyhow::Context`], the prefixed
  /// message is what the caller sees.
  pub fn wrap(err: &anyhow::Error, message: &str) -> Self {
    let message = format!("{message}: {err}");
    match err
      .chain()
      .find_map(|cause| cause.downcast_ref::<ServiceError>())
    {
      Some(service_err) => Self::with_id(&service_err.id, service_err.code, message),
      None => Self::new(ErrorCode::InternalServerError, message),
    }
  }

  /// Error identifier.
  pub fn id(&self) -> &str {
    &self.id
  }

  /// Symbolic error code.
  pub fn code(&self) -> ErrorCode {
    self.code
  }

  /// Human-readable message.
  pub fn message(&self) -> &str {
    &self.message
  }

  /// HTTP status code for this error.
  pub fn status_code(&self) -> StatusCode {
    self.code.status_code()
  }

  /// Client-facing JSON envelope describing this error.
  pub fn envelope(&self) -> ErrorEnvelope {
    ErrorEnvelope::new(&self.id, self.code.as_str(), &self.message)
  }

  service_error_constructors! {
    bad_request => BadRequest,
    unauthorized => Unauthorized,
    forbidden => Forbidden,
    not_found => NotFound,
    request_timeout => RequestTimeout,
    conflict => Conflict,
    unprocessable_entity => UnprocessableEntity,
    internal_server_error => InternalServerError,
    not_implemented => NotImplemented,
    found => Found,
    moved_permanently => MovedPermanently,
  }
}

/// Canonical JSON error body: `{"error": {"id": ..., "code": ..., "message": ...}}`.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ErrorEnvelope {
  /// Error details.
  pub error: ErrorBody,
}

/// Contents of an [`ErrorEnvelope`].
#[derive(Clone, Debug, Deserialize, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
  /// Error identifier.
  pub id: String,
  /// Symbolic error code (or `UNKNOWN_ERROR`).
  pub code: String,
  /// Human-readable message.
  pub message: String,
}

impl ErrorEnvelope {
  /// Build an envelope from its parts.
  pub fn new(id: &str, code: &str, message: &str) -> Self {
    Self {
      error: ErrorBody {
        id: id.to_string(),
        code: code.to_string(),
        message: message.to_string(),
      },
    }
  }

  /// Envelope reported for opaque errors. Never contains the underlying error's message.
  pub fn unknown() -> Self {
    Self::new(UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_CODE, UNKNOWN_ERROR_MESSAGE)
  }

  /// Serialize the envelope as a JSON string.
  pub fn to_json(&self) -> String {
    serde_json::to_string(self).expect("error envelope should serialize to JSON")
  }
}

/// Map a handler error to the status code and envelope reported to the caller.
///
/// If a [`ServiceError`] appears anywhere in the error's chain (e.g., beneath
/// [`anyhow::Context`] wrapping), its status code and envelope are used. Any other error is
/// opaque: it maps to 500 with the generic [`ErrorEnvelope::unknown`], and its details are only
/// logged. Service errors that map to 500 are logged too.
pub fn map_error(err: &anyhow::Error) -> (StatusCode, ErrorEnvelope) {
  match err
    .chain()
    .find_map(|cause| cause.downcast_ref::<ServiceError>())
  {
    Some(service_err) => {
      let status_code = service_err.status_code();
      if status_code == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Responding with error status {status_code}: {err:#}");
      } else {
        debug!("Responding with error status {status_code}: {err:#}");
      }
      (status_code, service_err.envelope())
    }
    None => {
      error!(
        "Responding with error status {}: {err:?}",
        StatusCode::INTERNAL_SERVER_ERROR
      );
      (StatusCode::INTERNAL_SERVER_ERROR, ErrorEnvelope::unknown())
    }
  }
}

/// Build the [`Response`] reported to the caller for a handler error (see [`map_error`]).
pub fn error_response(err: &anyhow::Error) -> Response {
  let (status_code, envelope) = map_error(err);
  Response::from_envelope(status_code, &envelope)
}

#[cfg(test)]
mod tests {
  use super::{error_response, map_error, ErrorCode, ErrorEnvelope, ServiceError, UnknownErrorCode};
  use crate::StatusCode;

  use anyhow::{anyhow, Context};
  use pretty_assertions::assert_eq;

  #[test]
  fn test_status_table() {
    let expected = [
      (ErrorCode::BadRequest, 400),
      (ErrorCode::Unauthorized, 401),
      (ErrorCode::Forbidden, 403),
      (ErrorCode::NotFound, 404),
      (ErrorCode::RequestTimeout, 408),
      (ErrorCode::Conflict, 409),
      (ErrorCode::UnprocessableEntity, 422),
      (ErrorCode::InternalServerError, 500),
      (ErrorCode::NotImplemented, 501),
      (ErrorCode::Found, 302),
      (ErrorCode::MovedPermanently, 301),
    ];

    for (code, status) in expected {
      assert_eq!(code.status_code().as_u16(), status, "{code}");
      assert_eq!(
        ErrorCode::from_status(Some(StatusCode::from_u16(status).unwrap())),
        code
      );
      assert_eq!(code.as_str().parse::<ErrorCode>(), Ok(code));
    }
  }

  #[test]
  fn test_unmapped_status_defaults_to_internal_server_error() {
    assert_eq!(
      ErrorCode::from_status(Some(StatusCode::IM_A_TEAPOT)),
      ErrorCode::InternalServerError
    );
    assert_eq!(ErrorCode::from_status(None), ErrorCode::InternalServerError);
    assert_eq!(
      "TEAPOT".parse::<ErrorCode>(),
      Err(UnknownErrorCode("TEAPOT".to_string()))
    );
  }

  #[test]
  fn test_not_found_error() {
    let err = ServiceError::not_found("not found message");
    assert_eq!(err.to_string(), "not found message");
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.id(), "NOT_FOUND");
    assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
  }

  #[test]
  fn test_empty_id_falls_back_to_code() {
    let err = ServiceError::with_id("", ErrorCode::Conflict, "taken");
    assert_eq!(err.id(), "CONFLICT");

    let err = ServiceError::with_id("USERNAME_TAKEN", ErrorCode::Conflict, "taken");
    assert_eq!(err.id(), "USERNAME_TAKEN");
    assert_eq!(err.status_code(), StatusCode::CONFLICT);
  }

  #[test]
  fn test_from_status_uses_default_message() {
    let err = ServiceError::from_status(Some(StatusCode::FORBIDDEN));
    assert_eq!(err.code(), ErrorCode::Forbidden);
    assert_eq!(err.message(), "Forbidden");
  }

  #[test]
  fn test_wrap_keeps_code() {
    let err = ServiceError::wrap(
      &ServiceError::not_found("no such product").into(),
      "loading basket",
    );
    assert_eq!(err.code(), ErrorCode::NotFound);
    assert_eq!(err.id(), "NOT_FOUND");
    assert_eq!(err.message(), "loading basket: no such product");

    let err = ServiceError::wrap(&anyhow!("connection reset"), "loading basket");
    assert_eq!(err.code(), ErrorCode::InternalServerError);
    assert_eq!(err.message(), "loading basket: connection reset");

    let (status_code, envelope) = map_error(&err.into());
    assert_eq!(status_code, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
      envelope,
      ErrorEnvelope::new(
        "INTERNAL_SERVER_ERROR",
        "INTERNAL_SERVER_ERROR",
        "loading basket: connection reset"
      )
    );
  }

  #[test]
  fn test_envelope_json() {
    assert_eq!(
      ServiceError::bad_request("Oops").envelope().to_json(),
      r#"{"error":{"id":"BAD_REQUEST","code":"BAD_REQUEST","message":"Oops"}}"#
    );
    assert_eq!(
      ErrorEnvelope::unknown().to_json(),
      r#"{"error":{"id":"UNKNOWN_ERROR","code":"UNKNOWN_ERROR","message":"An unknown error occurred"}}"#
    );
  }

  #[test]
  fn test_map_service_error() {
    for code in ErrorCode::ALL {
      let err = anyhow::Error::new(ServiceError::new(code, "details"));
      let (status_code, envelope) = map_error(&err);
      assert_eq!(status_code, code.status_code());
      assert_eq!(
        envelope,
        ErrorEnvelope::new(code.as_str(), code.as_str(), "details")
      );
    }
  }

  #[test]
  fn test_map_wrapped_service_error() {
    let err = Err::<(), _>(ServiceError::with_id(
      "POSTCODE_MISSING",
      ErrorCode::BadRequest,
      "postcode required",
    ))
    .context("validating query")
    .unwrap_err();

    let (status_code, envelope) = map_error(&err);
    assert_eq!(status_code, StatusCode::BAD_REQUEST);
    assert_eq!(
      envelope,
      ErrorEnvelope::new("POSTCODE_MISSING", "BAD_REQUEST", "postcode required")
    );
  }

  #[test]
  fn test_map_unknown_error_hides_message() {
    for message in ["something bad has happened!", "connection refused: db:5432"] {
      let (status_code, envelope) = map_error(&anyhow!(message.to_string()));
      assert_eq!(status_code, StatusCode::INTERNAL_SERVER_ERROR);
      assert_eq!(envelope, ErrorEnvelope::unknown());
    }

    let response = error_response(&anyhow!("something bad has happened!"));
    assert_eq!(response.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    assert_eq!(
      response.body(),
      r#"{"error":{"id":"UNKNOWN_ERROR","code":"UNKNOWN_ERROR","message":"An unknown error occurred"}}"#
    );
  }
}
