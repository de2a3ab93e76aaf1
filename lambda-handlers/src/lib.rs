#![doc = include_str!("../../README.md")]
#![warn(missing_docs)]

// These are documented public exports since handler and middleware implementations depend on
// them.
pub use async_trait;
pub use aws_lambda_events::apigw::ApiGatewayProxyRequestContext;
pub use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};

/// API Gateway proxy event translation.
pub mod apigw;

mod context;

pub use context::{Context, LOCAL_STAGE};

/// Error handling.
pub mod error;

pub use error::RequestError;

mod handler;

pub use handler::{handler_fn, Handler, HandlerFn, Middleware, Next, Pipeline};

/// Multipart form parsing.
pub mod multipart;

mod query;

pub use query::QueryParams;

mod request;

pub use request::Request;

mod response;

pub use response::Response;

/// In-process HTTP front door built on [`axum`].
pub mod router;

mod runtime;

pub use runtime::run_lambda;

/// Service errors and the canonical error envelope.
pub mod service_error;

pub use service_error::{ErrorCode, ErrorEnvelope, ServiceError};

mod private;
