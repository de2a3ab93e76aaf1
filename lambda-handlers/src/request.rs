use crate::multipart::MultipartForm;
use crate::query::QueryParams;
use crate::{HeaderMap, HeaderName, Method};

use bytes::Bytes;
use headers::HeaderMapExt;
use http::header::{InvalidHeaderValue, AUTHORIZATION, COOKIE, REFERER, USER_AGENT};
use http::{HeaderValue, Uri};

use std::borrow::Cow;
use std::collections::HashMap;

/// Request view handed to every handler, independent of the front door it arrived through.
///
/// Built by [`apigw::request_from_event`](crate::apigw::request_from_event) for Lambda proxy
/// events and by [`router::serve`](crate::router::serve) for in-process HTTP requests. Tests can
/// build one directly with [`Request::new`] and the `with_*` methods.
#[derive(Clone, Debug, Default)]
pub struct Request {
  pub(crate) method: Method,
  pub(crate) uri: Uri,
  pub(crate) remote_addr: String,
  pub(crate) headers: HeaderMap,
  pub(crate) query: QueryParams,
  pub(crate) path_params: HashMap<String, String>,
  pub(crate) body: Bytes,
  pub(crate) multipart_form: Option<MultipartForm>,
}

impl Request {
  /// Create an empty request.
  pub fn new(method: Method, uri: Uri) -> Self {
    Self {
      method,
      uri,
      ..Default::default()
    }
  }

  /// Add a request header value.
  pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
    self.headers.append(name, value);
    self
  }

  /// Add a query parameter value.
  pub fn with_query(mut self, name: &str, value: &str) -> Self {
    self.query.add(name, value);
    self
  }

  /// Set a path parameter.
  pub fn with_path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.path_params.insert(name.into(), value.into());
    self
  }

  /// Set the request body.
  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = body.into();
    self
  }

  /// Set the client address (`ip` or `ip:port`).
  pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
    self.remote_addr = remote_addr.into();
    self
  }

  /// HTTP method.
  pub fn method(&self) -> &Method {
    &self.method
  }

  /// Request URI as received. Use [`Request::query_params`] for the merged query parameters.
  pub fn uri(&self) -> &Uri {
    &self.uri
  }

  /// Request path.
  pub fn path(&self) -> &str {
    self.uri.path()
  }

  /// Client address (`ip` or `ip:port`), if known.
  pub fn remote_addr(&self) -> &str {
    &self.remote_addr
  }

  /// Raw request body (already base64-decoded).
  pub fn body(&self) -> &[u8] {
    &self.body
  }

  /// Request body as text, replacing invalid UTF-8 sequences.
  pub fn body_text(&self) -> Cow<'_, str> {
    String::from_utf8_lossy(&self.body)
  }

  /// All request headers.
  pub fn headers(&self) -> &HeaderMap {
    &self.headers
  }

  /// First value of a header (matched case-insensitively). Non-UTF-8 values are ignored.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .get(name)
      .and_then(|value| value.to_str().ok())
  }

  /// Path parameter by name (e.g., `productId`).
  pub fn path_param(&self, name: &str) -> Option<&str> {
    self.path_params.get(name).map(String::as_str)
  }

  /// First value of a query parameter by name (e.g., `locale`).
  pub fn query(&self, name: &str) -> Option<&str> {
    self.query.first(name)
  }

  /// All values of a query parameter.
  pub fn query_all(&self, name: &str) -> Vec<&str> {
    self.query.all(name)
  }

  /// All query parameters.
  pub fn query_params(&self) -> &QueryParams {
    &self.query
  }

  /// Replace the values of a query parameter.
  pub fn set_query(&mut self, name: &str, value: &str) {
    self.query.set(name, value);
  }

  /// Value of the `Authorization` header, or an empty string if it is absent.
  pub fn auth_token(&self) -> &str {
    // Header names are case-insensitive, so this also matches `authorization`.
    self.header(AUTHORIZATION.as_str()).unwrap_or_default()
  }

  /// Value of the `User-Agent` header, or an empty string if it is absent.
  pub fn user_agent(&self) -> &str {
    self.header(USER_AGENT.as_str()).unwrap_or_default()
  }

  /// Value of the `Referer` header, or an empty string if it is absent.
  pub fn referer(&self) -> &str {
    self.header(REFERER.as_str()).unwrap_or_default()
  }

  /// Cookies sent with the request, in header order.
  pub fn cookies(&self) -> Vec<(String, String)> {
    self
      .headers
      .typed_get::<headers::Cookie>()
      .map(|cookie| {
        cookie
          .iter()
          .map(|(name, value)| (name.to_string(), value.to_string()))
          .collect()
      })
      .unwrap_or_default()
  }

  /// Value of the cookie named `name`, if present.
  pub fn cookie(&self, name: &str) -> Option<String> {
    self
      .headers
      .typed_get::<headers::Cookie>()
      .and_then(|cookie| cookie.get(name).map(str::to_string))
  }

  /// Append a cookie to the request's `Cookie` header.
  pub fn add_cookie(&mut self, name: &str, value: &str) -> Result<(), InvalidHeaderValue> {
    let cookie = match self.header(COOKIE.as_str()).filter(|cookies| !cookies.is_empty()) {
      Some(cookies) => format!("{cookies}; {name}={value}"),
      None => format!("{name}={value}"),
    };
    self.headers.insert(COOKIE, HeaderValue::from_str(&cookie)?);
    Ok(())
  }

  /// Parsed multipart form, if the request body was `multipart/*`.
  pub fn multipart_form(&self) -> Option<&MultipartForm> {
    self.multipart_form.as_ref()
  }
}

#[cfg(test)]
mod tests {
  use super::Request;
  use crate::Method;

  use http::header::{AUTHORIZATION, COOKIE, USER_AGENT};
  use http::{HeaderName, HeaderValue, Uri};
  use pretty_assertions::assert_eq;

  fn request() -> Request {
    Request::new(Method::GET, Uri::from_static("/products/ABC123"))
  }

  #[test]
  fn test_auth_token() {
    assert_eq!(request().auth_token(), "");

    let req = request().with_header(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
    assert_eq!(req.auth_token(), "Bearer abc");

    let req = request().with_header(
      HeaderName::from_static("authorization"),
      HeaderValue::from_static("X"),
    );
    assert_eq!(req.auth_token(), "X");
  }

  #[test]
  fn test_header_lookup_is_case_insensitive() {
    let req = request().with_header(USER_AGENT, HeaderValue::from_static("curl/8.0"));
    assert_eq!(req.header("User-Agent"), Some("curl/8.0"));
    assert_eq!(req.header("user-agent"), Some("curl/8.0"));
    assert_eq!(req.user_agent(), "curl/8.0");
    assert_eq!(req.referer(), "");
  }

  #[test]
  fn test_params_and_body() {
    let mut req = request()
      .with_path_param("id", "ABC123")
      .with_query("extend", "tabs")
      .with_query("extend", "attributes")
      .with_body("caf\u{e9}");

    assert_eq!(req.path(), "/products/ABC123");
    assert_eq!(req.path_param("id"), Some("ABC123"));
    assert_eq!(req.path_param("missing"), None);
    assert_eq!(req.query("extend"), Some("tabs"));
    assert_eq!(req.query_all("extend"), vec!["tabs", "attributes"]);
    assert_eq!(req.body_text(), "café");

    req.set_query("extend", "none");
    assert_eq!(req.query_all("extend"), vec!["none"]);
  }

  #[test]
  fn test_cookies() {
    let mut req = request().with_header(COOKIE, HeaderValue::from_static("session=abc; theme=dark"));

    assert_eq!(
      req.cookies(),
      vec![
        ("session".to_string(), "abc".to_string()),
        ("theme".to_string(), "dark".to_string()),
      ]
    );
    assert_eq!(req.cookie("theme").as_deref(), Some("dark"));
    assert_eq!(req.cookie("missing"), None);

    req.add_cookie("locale", "en-GB").unwrap();
    assert_eq!(req.header("cookie"), Some("session=abc; theme=dark; locale=en-GB"));
    assert_eq!(req.cookie("locale").as_deref(), Some("en-GB"));

    let mut req = request();
    req.add_cookie("locale", "en-GB").unwrap();
    assert_eq!(req.cookies(), vec![("locale".to_string(), "en-GB".to_string())]);
  }
}
