use crate::service_error::{ErrorEnvelope, ServiceError};
use crate::{Response, StatusCode};

// Until std::error::Backtrace is fully stabilized, we can't embed a type named `Backtrace` within
// a thiserror::Error (see https://github.com/dtolnay/thiserror/issues/204).
use backtrace::Backtrace as _Backtrace;
use itertools::Itertools;
use log::error;
use thiserror::Error;

/// Error that occurred while translating an inbound request into a [`Request`](crate::Request).
///
/// These errors never reach handler logic. The Lambda front door returns them to the runtime as
/// a failed invocation, while the router front door converts them into an error [`Response`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RequestError {
  /// Request body exceeds the size limit.
  #[error("request body exceeds {0} bytes")]
  BodyTooLarge(usize, _Backtrace),
  /// Invalid base64 encoding for request body.
  // The base64 encoding comes from AWS, so this is actually an internal error.
  #[error("invalid base64 encoding for request body")]
  InvalidBodyBase64(#[source] Box<base64::DecodeError>, _Backtrace),
  /// `Content-Type` header could not be parsed as a media type.
  #[error("invalid Content-Type `{0}`")]
  InvalidContentType(String, #[source] Box<mime::FromStrError>, _Backtrace),
  /// Header name or value is not valid HTTP.
  #[error("invalid request header `{0}`")]
  InvalidHeader(
    String,
    #[source] Box<dyn std::error::Error + Send + Sync + 'static>,
    _Backtrace,
  ),
  /// Multipart request body could not be parsed.
  #[error("failed to parse multipart request body")]
  InvalidMultipart(#[source] Box<multer::Error>, _Backtrace),
  /// Request path and query do not form a valid URI.
  #[error("invalid request URI `{0}`")]
  InvalidUri(String, #[source] Box<http::uri::InvalidUri>, _Backtrace),
  /// Multipart request is missing the `Content-Type` header.
  #[error("content type header missing")]
  MissingContentType(_Backtrace),
  /// Multipart `Content-Type` header is missing its `boundary` parameter.
  #[error("content type header missing boundary")]
  MissingMultipartBoundary(_Backtrace),
  /// `Content-Type` header is not a `multipart/*` media type.
  #[error("content type `{0}` is not multipart")]
  NotMultipart(String, _Backtrace),
  /// Failed to read the request body from the transport.
  #[error("failed to read request body")]
  ReadBody(
    #[source] Box<dyn std::error::Error + Send + Sync + 'static>,
    _Backtrace,
  ),
}

impl RequestError {
  /// Return the backtrace associated with the error, if known.
  pub fn backtrace(&self) -> Option<&_Backtrace> {
    match self {
      RequestError::BodyTooLarge(_, backtrace)
      | RequestError::InvalidBodyBase64(_, backtrace)
      | RequestError::InvalidContentType(_, _, backtrace)
      | RequestError::InvalidHeader(_, _, backtrace)
      | RequestError::InvalidMultipart(_, backtrace)
      | RequestError::InvalidUri(_, _, backtrace)
      | RequestError::MissingContentType(backtrace)
      | RequestError::MissingMultipartBoundary(backtrace)
      | RequestError::NotMultipart(_, backtrace)
      | RequestError::ReadBody(_, backtrace) => Some(backtrace),
    }
  }

  /// Return the name of the error variant (e.g., `InvalidBodyBase64`).
  pub fn name(&self) -> &str {
    match self {
      RequestError::BodyTooLarge(_, _) => "BodyTooLarge",
      RequestError::InvalidBodyBase64(_, _) => "InvalidBodyBase64",
      RequestError::InvalidContentType(_, _, _) => "InvalidContentType",
      RequestError::InvalidHeader(_, _, _) => "InvalidHeader",
      RequestError::InvalidMultipart(_, _) => "InvalidMultipart",
      RequestError::InvalidUri(_, _, _) => "InvalidUri",
      RequestError::MissingContentType(_) => "MissingContentType",
      RequestError::MissingMultipartBoundary(_) => "MissingMultipartBoundary",
      RequestError::NotMultipart(_, _) => "NotMultipart",
      RequestError::ReadBody(_, _) => "ReadBody",
    }
  }

  /// HTTP status code appropriate for the error: 4xx when the client sent a malformed request,
  /// 500 when the hosting runtime handed us something it should not have.
  pub fn status_code(&self) -> StatusCode {
    match self {
      RequestError::BodyTooLarge(_, _) => StatusCode::PAYLOAD_TOO_LARGE,
      RequestError::InvalidContentType(_, _, _)
      | RequestError::InvalidHeader(_, _, _)
      | RequestError::InvalidMultipart(_, _)
      | RequestError::InvalidUri(_, _, _)
      | RequestError::MissingContentType(_)
      | RequestError::MissingMultipartBoundary(_)
      | RequestError::NotMultipart(_, _)
      | RequestError::ReadBody(_, _) => StatusCode::BAD_REQUEST,
      RequestError::InvalidBodyBase64(_, _) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl From<RequestError> for Response {
  /// Build a client-facing [`Response`] appropriate for the error that occurred.
  ///
  /// Client errors carry the error's description in a `BAD_REQUEST` error envelope. Internal
  /// errors carry only the generic unknown-error envelope.
  fn from(err: RequestError) -> Response {
    error!(
      "{}",
      format_error(&err, Some(&format!("RequestError::{}", err.name())), err.backtrace()),
    );

    let status_code = err.status_code();
    let envelope = if status_code.is_server_error() {
      ErrorEnvelope::unknown()
    } else {
      ServiceError::bad_request(err.to_string()).envelope()
    };

    Response::from_envelope(status_code, &envelope)
  }
}

/// Helper function for formatting an error as a string containing a human-readable chain of causes.
///
/// This function will walk over the chain of causes returned by
/// [`Error::source`](std::error::Error::source) and append each underlying error (using the
/// [`Display`](std::fmt::Display) trait).
///
/// # Arguments
///
/// * `err` - Error to format.
/// * `name` - Optional name of the error type/variant (e.g., `RequestError::InvalidMultipart`).
/// * `backtrace` - Optional [`Backtrace`](backtrace::Backtrace) indicating where the top-level
///   error occurred.
pub fn format_error(
  err: &(dyn std::error::Error),
  name: Option<&str>,
  backtrace: Option<&_Backtrace>,
) -> String {
  let err_line = name
    .map(|n| format!("{}: {}", n, err))
    .unwrap_or_else(|| err.to_string());

  let top_error = if let Some(bt) = backtrace {
    format!("{err_line}\n  stack trace:\n{}", format_backtrace(bt, 4))
  } else {
    err_line
  };

  let cause_str = ErrorCauseIterator(err.source())
    .map(|cause| format!("  caused by: {cause}"))
    .join("\n");

  if !cause_str.is_empty() {
    format!("{top_error}\n{cause_str}")
  } else {
    top_error
  }
}

struct ErrorCauseIterator<'a>(Option<&'a (dyn std::error::Error + 'static)>);

impl<'a> Iterator for ErrorCauseIterator<'a> {
  type Item = &'a (dyn std::error::Error + 'static);

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.0;
    self.0 = current.and_then(|err| err.source());
    current
  }
}

fn format_backtrace(backtrace: &_Backtrace, indent: usize) -> String {
  let indent_str = " ".repeat(indent);
  format!("{backtrace:?}")
    .lines()
    .map(|line| format!("{indent_str}{line}"))
    .join("\n")
}
