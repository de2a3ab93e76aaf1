use crate::apigw::HeaderEncoding;
use crate::private::panic_string;
use crate::service_error::{error_response, ErrorEnvelope};
use crate::{Context, HeaderMap, Request, Response, StatusCode};

use async_trait::async_trait;
use backtrace::Backtrace;
use futures::FutureExt;
use log::error;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Application request handler.
///
/// This trait is intended to be used with the [`#[async_trait]`](async_trait::async_trait)
/// attribute. Plain closures can be adapted with [`handler_fn`].
///
/// Returning an error whose chain contains a [`ServiceError`](crate::ServiceError) reports that
/// error's status code and message to the caller. Any other error is reported as an opaque 500.
#[async_trait]
pub trait Handler: Send + Sync {
  /// Handle a single request.
  ///
  /// # Arguments
  ///
  /// * `ctx` - Per-request context, including any values stored by enclosing middleware.
  /// * `request` - The request being handled.
  async fn handle(&self, ctx: &mut Context, request: Request) -> anyhow::Result<Response>;
}

/// [`Handler`] backed by a synchronous closure. See [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Adapt a closure into a [`Handler`].
///
/// # Example
///
/// ```rust
/// use lambda_handlers::{handler_fn, Pipeline, Response, StatusCode};
///
/// let pipeline = Pipeline::new(handler_fn(|_ctx, _request| {
///   Ok(Response::text(StatusCode::OK, "pong"))
/// }));
/// ```
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
  F: Fn(&mut Context, Request) -> anyhow::Result<Response> + Send + Sync,
{
  HandlerFn(f)
}

#[async_trait]
impl<F> Handler for HandlerFn<F>
where
  F: Fn(&mut Context, Request) -> anyhow::Result<Response> + Send + Sync,
{
  async fn handle(&self, ctx: &mut Context, request: Request) -> anyhow::Result<Response> {
    (self.0)(ctx, request)
  }
}

/// Middleware wrapping every request passed through a [`Pipeline`].
///
/// This trait is intended to be used with the [`#[async_trait]`](async_trait::async_trait)
/// attribute.
#[async_trait]
pub trait Middleware: Send + Sync {
  /// Wrap a request.
  ///
  /// Implementations may inspect or modify the context and request, short-circuit by returning
  /// without calling `next`, or post-process the response. To continue the chain, invoke `next`
  /// as follows:
  /// ```rust,ignore
  /// next.run(ctx, request).await
  /// ```
  async fn wrap(
    &self,
    ctx: &mut Context,
    request: Request,
    next: Next<'_>,
  ) -> anyhow::Result<Response>;
}

/// The remainder of a middleware chain, ending with the handler.
pub struct Next<'a> {
  handler: &'a dyn Handler,
  middlewares: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
  /// Run the remaining middleware and the handler.
  pub async fn run(self, ctx: &mut Context, request: Request) -> anyhow::Result<Response> {
    match self.middlewares.split_first() {
      Some((middleware, middlewares)) => {
        middleware
          .wrap(
            ctx,
            request,
            Next {
              handler: self.handler,
              middlewares,
            },
          )
          .await
      }
      None => self.handler.handle(ctx, request).await,
    }
  }
}

/// A handler together with its middleware, default response headers, and response encoding
/// options.
///
/// Middleware runs in registration order: the first middleware added is the outermost, so it
/// sees the request first and the response last.
///
/// # Example
///
/// ```rust
/// use lambda_handlers::{handler_fn, HeaderMap, Pipeline, Response, StatusCode};
/// use lambda_handlers::apigw::HeaderEncoding;
///
/// let mut default_headers = HeaderMap::new();
/// default_headers.insert("cache-control", "no-store".parse().unwrap());
///
/// let pipeline = Pipeline::new(handler_fn(|_ctx, _request| Ok(Response::new(StatusCode::OK))))
///   .with_headers(default_headers)
///   .with_header_encoding(HeaderEncoding::MultiValue);
/// ```
pub struct Pipeline {
  handler: Arc<dyn Handler>,
  middlewares: Vec<Arc<dyn Middleware>>,
  default_headers: HeaderMap,
  header_encoding: HeaderEncoding,
}

impl Pipeline {
  /// Create a pipeline with no middleware and no default headers.
  pub fn new<H>(handler: H) -> Self
  where
    H: Handler + 'static,
  {
    Self {
      handler: Arc::new(handler),
      middlewares: Vec::new(),
      default_headers: HeaderMap::new(),
      header_encoding: HeaderEncoding::default(),
    }
  }

  /// Headers added to every response that doesn't already set them.
  pub fn with_headers(mut self, default_headers: HeaderMap) -> Self {
    self.default_headers = default_headers;
    self
  }

  /// Add a middleware inside any previously added middleware.
  pub fn with_middleware<M>(mut self, middleware: M) -> Self
  where
    M: Middleware + 'static,
  {
    self.middlewares.push(Arc::new(middleware));
    self
  }

  /// How response headers are encoded into API Gateway proxy responses.
  pub fn with_header_encoding(mut self, header_encoding: HeaderEncoding) -> Self {
    self.header_encoding = header_encoding;
    self
  }

  /// Configured response header encoding.
  pub fn header_encoding(&self) -> HeaderEncoding {
    self.header_encoding
  }

  /// Run a request through the middleware and handler.
  ///
  /// This never fails: handler errors are mapped to error responses (see
  /// [`map_error`](crate::service_error::map_error)), and a handler panic is reported as an
  /// opaque 500.
  pub async fn call(&self, ctx: &mut Context, request: Request) -> Response {
    let next = Next {
      handler: self.handler.as_ref(),
      middlewares: &self.middlewares,
    };

    let mut response = match AssertUnwindSafe(next.run(ctx, request))
      .catch_unwind()
      .await
    {
      Ok(Ok(response)) => response,
      Ok(Err(err)) => error_response(&err),
      Err(panic) => {
        // If the panic value isn't a String or &str, don't catch it since we can't print it and
        // it's unclear what we should do instead.
        let message = panic_string(panic).unwrap_or_else(|err| std::panic::resume_unwind(err));
        error!(
          "Request handler panicked: {message}\n  stack trace:\n{:?}",
          Backtrace::new()
        );
        Response::from_envelope(StatusCode::INTERNAL_SERVER_ERROR, &ErrorEnvelope::unknown())
      }
    };

    self.apply_default_headers(&mut response);
    response
  }

  fn apply_default_headers(&self, response: &mut Response) {
    for name in self.default_headers.keys() {
      if response.headers().contains_key(name) {
        continue;
      }
      for value in self.default_headers.get_all(name) {
        response.add_header(name.clone(), value.clone());
      }
    }
  }
}
