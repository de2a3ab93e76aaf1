use crate::error::RequestError;
use crate::HeaderMap;

use backtrace::Backtrace;
use bytes::Bytes;
use futures::stream;
use headers::{ContentType, Header};
use indexmap::IndexMap;
use mime::Mime;
use multer::{Constraints, Multipart, SizeLimit};

use std::convert::Infallible;

/// Maximum size of a multipart body held in memory (10 MiB).
pub const MAX_MULTIPART_BYTES: u64 = 10 << 20;

/// A file uploaded as part of a multipart form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormFile {
  /// Client-supplied file name.
  pub file_name: String,
  /// Declared media type of the part, if any.
  pub content_type: Option<String>,
  /// File contents.
  pub contents: Bytes,
}

/// Parsed `multipart/*` request body.
///
/// Parts with a file name are collected under [`MultipartForm::files`], and all other parts are
/// decoded as text under [`MultipartForm::values`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MultipartForm {
  /// Text fields by name, in the order they appeared.
  pub values: IndexMap<String, Vec<String>>,
  /// File fields by name, in the order they appeared.
  pub files: IndexMap<String, Vec<FormFile>>,
}

impl MultipartForm {
  /// First text value for `name`, if any.
  pub fn value(&self, name: &str) -> Option<&str> {
    self
      .values
      .get(name)
      .and_then(|values| values.first())
      .map(String::as_str)
  }

  /// First file for `name`, if any.
  pub fn file(&self, name: &str) -> Option<&FormFile> {
    self.files.get(name).and_then(|files| files.first())
  }
}

/// Whether the request's `Content-Type` announces a `multipart/*` body.
pub(crate) fn is_multipart(headers: &HeaderMap) -> bool {
  headers
    .get(ContentType::name())
    .and_then(|value| value.to_str().ok())
    .map(|content_type| {
      content_type
        .trim_start()
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"))
    })
    .unwrap_or(false)
}

/// Extract the `boundary` parameter from a multipart `Content-Type` header.
pub fn parse_boundary(headers: &HeaderMap) -> Result<String, RequestError> {
  let content_type_raw = headers
    .get(ContentType::name())
    .ok_or_else(|| RequestError::MissingContentType(Backtrace::new()))?;
  let content_type = content_type_raw.to_str().map_err(|err| {
    RequestError::InvalidHeader(
      ContentType::name().to_string(),
      Box::new(err),
      Backtrace::new(),
    )
  })?;

  let media_type = content_type.parse::<Mime>().map_err(|err| {
    RequestError::InvalidContentType(content_type.to_string(), Box::new(err), Backtrace::new())
  })?;
  if media_type.type_() != mime::MULTIPART {
    return Err(RequestError::NotMultipart(
      content_type.to_string(),
      Backtrace::new(),
    ));
  }

  media_type
    .get_param(mime::BOUNDARY)
    .map(|boundary| boundary.as_str().to_string())
    .filter(|boundary| !boundary.is_empty())
    .ok_or_else(|| RequestError::MissingMultipartBoundary(Backtrace::new()))
}

/// Parse an in-memory multipart body.
pub async fn parse_form(body: Bytes, boundary: String) -> Result<MultipartForm, RequestError> {
  let invalid = |err| RequestError::InvalidMultipart(Box::new(err), Backtrace::new());

  let mut multipart = Multipart::with_constraints(
    stream::once(async move { Ok::<_, Infallible>(body) }),
    boundary,
    Constraints::new().size_limit(SizeLimit::new().whole_stream(MAX_MULTIPART_BYTES)),
  );

  let mut form = MultipartForm::default();
  while let Some(field) = multipart.next_field().await.map_err(invalid)? {
    let name = field.name().unwrap_or_default().to_string();
    if let Some(file_name) = field.file_name().map(str::to_string) {
      let content_type = field.content_type().map(Mime::to_string);
      let contents = field.bytes().await.map_err(invalid)?;
      form.files.entry(name).or_default().push(FormFile {
        file_name,
        content_type,
        contents,
      });
    } else {
      let value = field.text().await.map_err(invalid)?;
      form.values.entry(name).or_default().push(value);
    }
  }

  Ok(form)
}
