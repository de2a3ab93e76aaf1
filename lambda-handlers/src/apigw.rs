//! API Gateway REST API (Lambda proxy integration) front door.

use crate::error::{format_error, RequestError};
use crate::multipart::{is_multipart, parse_boundary, parse_form};
use crate::query::QueryParams;
use crate::{Context, HeaderMap, Pipeline, Request, Response, StatusCode};

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::encodings::Body;
use backtrace::Backtrace;
use base64::Engine as _;
use bytes::Bytes;
use http::header::{HOST, USER_AGENT};
use http::{HeaderName, HeaderValue, Uri};
use itertools::Itertools;
use log::{debug, error, trace};

/// Scheme assumed when the request carries no `X-Forwarded-Proto` header.
pub const DEFAULT_SCHEME: &str = "https";

/// Host assumed when the request carries no `Host` header.
pub const DEFAULT_HOST: &str = "example.com";

const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const X_FORWARDED_PORT: HeaderName = HeaderName::from_static("x-forwarded-port");

/// How response headers are written into an [`ApiGatewayProxyResponse`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HeaderEncoding {
  /// One value per header name in `headers`: duplicate values are removed and the rest are joined
  /// with `"; "`.
  #[default]
  Folded,
  /// Every distinct value in `multiValueHeaders`, in first-seen order.
  MultiValue,
}

/// Convert an API Gateway proxy request into a [`Request`].
///
/// Multi-value headers are added first, and then single-value headers replace any values under the
/// same name. Query parameters are merged as described in [`QueryParams::merge`]. Path
/// parameters are URL-decoded. A base64-encoded body is decoded, and a `multipart/*` body is
/// parsed eagerly, so any malformed input fails here rather than inside the handler.
pub async fn request_from_event(event: ApiGatewayProxyRequest) -> Result<Request, RequestError> {
  let ApiGatewayProxyRequest {
    path,
    http_method,
    headers: single_value_headers,
    multi_value_headers,
    query_string_parameters,
    multi_value_query_string_parameters,
    path_parameters,
    request_context,
    body,
    is_base64_encoded,
    ..
  } = event;

  let mut headers = HeaderMap::new();
  for (name, value) in multi_value_headers.iter() {
    headers.append(name.clone(), value.clone());
  }
  for (name, value) in single_value_headers.iter() {
    headers.insert(name.clone(), value.clone());
  }
  if let Some(user_agent) = request_context
    .identity
    .user_agent
    .filter(|user_agent| !user_agent.is_empty())
  {
    let user_agent = HeaderValue::from_str(&user_agent).map_err(|err| {
      RequestError::InvalidHeader(USER_AGENT.to_string(), Box::new(err), Backtrace::new())
    })?;
    headers.insert(USER_AGENT, user_agent);
  }

  let query = QueryParams::merge(
    multi_value_query_string_parameters.iter(),
    query_string_parameters.iter(),
  );

  let scheme = header_str(&headers, &X_FORWARDED_PROTO).unwrap_or(DEFAULT_SCHEME);
  let host = header_str(&headers, &HOST).unwrap_or(DEFAULT_HOST);
  let path = escape_path(path.as_deref().unwrap_or("/"));
  let raw_uri = if query.is_empty() {
    format!("{scheme}://{host}{path}")
  } else {
    format!("{scheme}://{host}{path}?{}", query.encode())
  };
  let uri = raw_uri
    .parse::<Uri>()
    .map_err(|err| RequestError::InvalidUri(raw_uri.clone(), Box::new(err), Backtrace::new()))?;

  let remote_addr = match request_context
    .identity
    .source_ip
    .filter(|source_ip| !source_ip.is_empty())
  {
    Some(source_ip) => match header_str(&headers, &X_FORWARDED_PORT) {
      Some(port) => format!("{source_ip}:{port}"),
      None => source_ip,
    },
    None => String::new(),
  };

  // The API Gateway REST API Lambda proxy integration doesn't automatically URL-decode path
  // params, so we need to. See https://github.com/aws/aws-sam-cli/issues/771.
  let path_params = path_parameters
    .into_iter()
    .map(|(name, value)| {
      let decoded = urlencoding::decode(&value)
        .map(|decoded| decoded.into_owned())
        .unwrap_or(value);
      (name, decoded)
    })
    .collect();

  let body = match body {
    // If this fails, it's an internal error since the base64 encoding is done by the API Gateway.
    Some(body) if is_base64_encoded => base64::engine::general_purpose::STANDARD
      .decode(body.as_bytes())
      .map(Bytes::from)
      .map_err(|err| RequestError::InvalidBodyBase64(Box::new(err), Backtrace::new()))?,
    Some(body) => Bytes::from(body),
    None => Bytes::new(),
  };

  let multipart_form = if is_multipart(&headers) {
    let boundary = parse_boundary(&headers)?;
    Some(parse_form(body.clone(), boundary).await?)
  } else {
    None
  };

  debug!("Built {http_method} request for {uri}");

  Ok(Request {
    method: http_method,
    uri,
    remote_addr,
    headers,
    query,
    path_params,
    body,
    multipart_form,
  })
}

// API Gateway passes the decoded path, which may contain characters `Uri` rejects. Existing
// percent-escapes are kept as-is.
fn escape_path(path: &str) -> String {
  let mut escaped = String::with_capacity(path.len());
  for c in path.chars() {
    match c {
      '\0'..=' ' | '\x7F' | '"' | '#' | '<' | '>' | '?' | '\\' | '^' | '`' | '{' | '|' | '}' => {
        escaped.push_str(&format!("%{:02X}", c as u32))
      }
      _ => escaped.push(c),
    }
  }
  escaped
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
  headers
    .get(name)
    .and_then(|value| value.to_str().ok())
    .filter(|value| !value.is_empty())
}

/// Collapse each header's values into one, removing exact duplicates (first-seen order wins) and
/// joining the rest with `"; "`.
pub fn fold_headers(headers: &HeaderMap) -> HeaderMap {
  let mut folded = HeaderMap::with_capacity(headers.keys_len());
  for name in headers.keys() {
    let joined = headers
      .get_all(name)
      .iter()
      .unique()
      .map(HeaderValue::as_bytes)
      .collect::<Vec<_>>()
      .join(&b"; "[..]);
    folded.insert(
      name.clone(),
      HeaderValue::from_bytes(&joined)
        .expect("joined header values should form a valid header value"),
    );
  }
  folded
}

fn dedup_headers(headers: &HeaderMap) -> HeaderMap {
  let mut deduped = HeaderMap::with_capacity(headers.keys_len());
  for name in headers.keys() {
    for value in headers.get_all(name).iter().unique() {
      deduped.append(name.clone(), value.clone());
    }
  }
  deduped
}

/// Serialize a [`Response`] as an [`ApiGatewayProxyResponse`].
///
/// The status and body are copied verbatim. An unset status is reported as 500.
pub fn response_to_event(
  response: Response,
  header_encoding: HeaderEncoding,
) -> ApiGatewayProxyResponse {
  let (status, headers, body) = response.into_parts();
  let (headers, multi_value_headers) = match header_encoding {
    HeaderEncoding::Folded => (fold_headers(&headers), HeaderMap::new()),
    HeaderEncoding::MultiValue => (HeaderMap::new(), dedup_headers(&headers)),
  };

  ApiGatewayProxyResponse {
    status_code: status
      .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
      .as_u16() as i64,
    headers,
    multi_value_headers,
    body: Some(Body::Text(body)),
    is_base64_encoded: false,
  }
}

/// Run one API Gateway proxy event through `pipeline`.
///
/// Handler errors become error responses. Errors in translating the inbound event are logged and
/// returned, which fails the Lambda invocation.
pub async fn dispatch_event(
  pipeline: &Pipeline,
  event: ApiGatewayProxyRequest,
) -> Result<ApiGatewayProxyResponse, RequestError> {
  trace!("Request: {event:#?}");

  let mut ctx = Context::from_apigw(&event.request_context);
  trace!("Context: {ctx:#?}");

  let request = request_from_event(event).await.map_err(|err| {
    error!(
      "{}",
      format_error(&err, Some(&format!("RequestError::{}", err.name())), err.backtrace()),
    );
    err
  })?;

  let response = pipeline.call(&mut ctx, request).await;
  Ok(response_to_event(response, pipeline.header_encoding()))
}
