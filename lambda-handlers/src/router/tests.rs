use crate::router::{route, MAX_BODY_BYTES};
use crate::service_error::{ErrorEnvelope, ServiceError};
use crate::{handler_fn, HeaderMap, Pipeline, Response, StatusCode, LOCAL_STAGE};

use axum::body::Body;
use axum::extract::ConnectInfo;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Request};
use http_body_util::BodyExt;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use tower::ServiceExt;

use std::net::SocketAddr;

async fn body_string(response: axum::response::Response) -> String {
  let bytes = response.into_body().collect().await.unwrap().to_bytes();
  String::from_utf8(bytes.to_vec()).unwrap()
}

fn echo_pipeline() -> Pipeline {
  Pipeline::new(handler_fn(|ctx, request| {
    Ok(Response::json(
      StatusCode::OK,
      &json!({
        "method": request.method().as_str(),
        "path": request.path(),
        "id": request.path_param("id"),
        "extend": request.query_all("extend"),
        "remoteAddr": request.remote_addr(),
        "body": request.body_text(),
        "stage": ctx.stage(),
        "sourceIp": ctx.source_ip(),
        "userAgent": ctx.user_agent(),
      }),
    )?)
  }))
}

#[tokio::test]
async fn test_serve() {
  let app = route("/products/{id}", echo_pipeline());

  let mut request = Request::builder()
    .method("POST")
    .uri("/products/ABC%20123?extend=attributes&extend=tabs")
    .header("user-agent", "test-agent/1.0")
    .body(Body::from("hello"))
    .unwrap();
  request
    .extensions_mut()
    .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

  let response = app.oneshot(request).await.unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response.headers().get(CONTENT_TYPE),
    Some(&HeaderValue::from_static("application/json"))
  );
  assert_eq!(
    serde_json::from_str::<Value>(&body_string(response).await).unwrap(),
    json!({
      "method": "POST",
      "path": "/products/ABC%20123",
      "id": "ABC 123",
      "extend": ["attributes", "tabs"],
      "remoteAddr": "127.0.0.1:4000",
      "body": "hello",
      "stage": LOCAL_STAGE,
      "sourceIp": "127.0.0.1",
      "userAgent": "test-agent/1.0",
    })
  );
}

#[tokio::test]
async fn test_serve_without_path_params_or_peer() {
  let app = route("/products", echo_pipeline());

  let response = app
    .oneshot(
      Request::builder()
        .uri("/products")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  let body = serde_json::from_str::<Value>(&body_string(response).await).unwrap();
  assert_eq!(body["id"], Value::Null);
  assert_eq!(body["remoteAddr"], json!(""));
  assert_eq!(body["sourceIp"], json!(""));
}

#[tokio::test]
async fn test_serve_error_envelope() {
  let mut default_headers = HeaderMap::new();
  default_headers.insert("cache-control", HeaderValue::from_static("no-store"));
  let pipeline = Pipeline::new(handler_fn(|_ctx, _request| {
    Err(ServiceError::forbidden("not yours").into())
  }))
  .with_headers(default_headers);

  let response = route("/", pipeline)
    .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::FORBIDDEN);
  assert_eq!(
    response.headers().get("cache-control"),
    Some(&HeaderValue::from_static("no-store"))
  );
  assert_eq!(
    serde_json::from_str::<ErrorEnvelope>(&body_string(response).await).unwrap(),
    ErrorEnvelope::new("FORBIDDEN", "FORBIDDEN", "not yours")
  );
}

#[tokio::test]
async fn test_serve_keeps_duplicate_headers() {
  let pipeline = Pipeline::new(handler_fn(|_ctx, _request| {
    let mut response = Response::new(StatusCode::NO_CONTENT);
    response.add_header("test", HeaderValue::from_static("foo"));
    response.add_header("test", HeaderValue::from_static("bar"));
    Ok(response)
  }));

  let response = route("/", pipeline)
    .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::NO_CONTENT);
  assert_eq!(
    response.headers().get_all("test").iter().collect::<Vec<_>>(),
    vec!["foo", "bar"]
  );
}

#[tokio::test]
async fn test_serve_unset_status() {
  let pipeline = Pipeline::new(handler_fn(|_ctx, _request| Ok(Response::default())));

  let response = route("/", pipeline)
    .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_serve_multipart_form() {
  let pipeline = Pipeline::new(handler_fn(|_ctx, request| {
    let form = request
      .multipart_form()
      .ok_or_else(|| ServiceError::bad_request("form required"))?;
    let file = form
      .file("upload")
      .ok_or_else(|| ServiceError::bad_request("upload required"))?;
    Ok(Response::text(
      StatusCode::OK,
      format!(
        "{} {} {}",
        form.value("name").unwrap_or_default(),
        file.file_name,
        String::from_utf8_lossy(&file.contents),
      ),
    ))
  }));

  let body = "--BOUNDARY\r\n\
              Content-Disposition: form-data; name=\"name\"\r\n\
              \r\n\
              example\r\n\
              --BOUNDARY\r\n\
              Content-Disposition: form-data; name=\"upload\"; filename=\"notes.txt\"\r\n\
              Content-Type: text/plain\r\n\
              \r\n\
              file contents\r\n\
              --BOUNDARY--\r\n";

  let response = route("/upload", pipeline)
    .oneshot(
      Request::builder()
        .method("POST")
        .uri("/upload")
        .header(CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
        .body(Body::from(body))
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(body_string(response).await, "example notes.txt file contents");
}

#[tokio::test]
async fn test_serve_invalid_multipart() {
  let pipeline = Pipeline::new(handler_fn(|_ctx, _request| -> anyhow::Result<Response> {
    panic!("handler must not run for malformed requests")
  }));

  let response = route("/upload", pipeline)
    .oneshot(
      Request::builder()
        .method("POST")
        .uri("/upload")
        .header(CONTENT_TYPE, "multipart/form-data")
        .body(Body::from("irrelevant"))
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  let envelope =
    serde_json::from_str::<ErrorEnvelope>(&body_string(response).await).unwrap();
  assert_eq!(envelope.error.code, "BAD_REQUEST");
}

#[tokio::test]
async fn test_serve_body_too_large() {
  let pipeline = Pipeline::new(handler_fn(|_ctx, _request| {
    Ok(Response::new(StatusCode::OK))
  }));

  let response = route("/", pipeline)
    .oneshot(
      Request::builder()
        .method("POST")
        .uri("/")
        .body(Body::from(vec![b'x'; MAX_BODY_BYTES + 1]))
        .unwrap(),
    )
    .await
    .unwrap();

  assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}
