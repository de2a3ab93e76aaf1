use indexmap::IndexMap;
use itertools::Itertools;

/// Ordered multi-value query parameters.
///
/// Keys are kept in sorted order so that [`QueryParams::encode`] is deterministic. Values under a
/// key keep the order in which they were added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryParams(IndexMap<String, Vec<String>>);

impl QueryParams {
  /// Create an empty collection.
  pub fn new() -> Self {
    Self::default()
  }

  /// Merge API Gateway's multi-value and single-value query maps.
  ///
  /// Multi-value entries are added first. Each single-value entry is then appended under its
  /// key unless that exact value is already present (API Gateway mirrors every single-value
  /// entry in the multi-value map).
  pub fn merge<'a, M, S>(multi_value: M, single_value: S) -> Self
  where
    M: IntoIterator<Item = (&'a str, &'a str)>,
    S: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut params = Self::new();
    for (name, value) in multi_value {
      params.add(name, value);
    }
    for (name, value) in single_value {
      if !params.all(name).contains(&value) {
        params.add(name, value);
      }
    }
    params
  }

  /// Parse a raw `application/x-www-form-urlencoded` query string (without the leading `?`).
  ///
  /// Pairs that fail to percent-decode are kept verbatim.
  pub fn parse(raw_query: &str) -> Self {
    let mut params = Self::new();
    for pair in raw_query.split('&').filter(|pair| !pair.is_empty()) {
      let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
      params.add(&decode_component(name), &decode_component(value));
    }
    params
  }

  /// Append a value under `name`.
  pub fn add(&mut self, name: &str, value: &str) {
    if let Some(values) = self.0.get_mut(name) {
      values.push(value.to_string());
      return;
    }

    let index = self
      .0
      .keys()
      .position(|key| key.as_str() > name)
      .unwrap_or(self.0.len());
    self
      .0
      .shift_insert(index, name.to_string(), vec![value.to_string()]);
  }

  /// Replace all values under `name` with a single value.
  pub fn set(&mut self, name: &str, value: &str) {
    if let Some(values) = self.0.get_mut(name) {
      *values = vec![value.to_string()];
    } else {
      self.add(name, value);
    }
  }

  /// First value under `name`, if any.
  pub fn first(&self, name: &str) -> Option<&str> {
    self
      .0
      .get(name)
      .and_then(|values| values.first())
      .map(String::as_str)
  }

  /// All values under `name` (empty if the parameter is absent).
  pub fn all(&self, name: &str) -> Vec<&str> {
    self
      .0
      .get(name)
      .map(|values| values.iter().map(String::as_str).collect())
      .unwrap_or_default()
  }

  /// Whether the parameter is present.
  pub fn contains(&self, name: &str) -> bool {
    self.0.contains_key(name)
  }

  /// Whether there are no parameters.
  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Iterate over every `(name, value)` pair in encoding order.
  pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
    self
      .0
      .iter()
      .flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())))
  }

  /// Percent-encode the parameters as a query string, sorted by key.
  pub fn encode(&self) -> String {
    self
      .iter()
      .map(|(name, value)| {
        format!(
          "{}={}",
          urlencoding::encode(name),
          urlencoding::encode(value)
        )
      })
      .join("&")
  }
}

fn decode_component(component: &str) -> String {
  let plus_decoded = component.replace('+', " ");
  urlencoding::decode(&plus_decoded)
    .map(|decoded| decoded.into_owned())
    .unwrap_or(plus_decoded)
}

#[cfg(test)]
mod tests {
  use super::QueryParams;

  use pretty_assertions::assert_eq;

  #[test]
  fn test_merge_sorts_keys_and_keeps_value_order() {
    let params = QueryParams::merge(
      [("extend", "attributes"), ("extend", "tabs")],
      [("locale", "en-GB"), ("currency", "GBP")],
    );

    assert_eq!(
      params.encode(),
      "currency=GBP&extend=attributes&extend=tabs&locale=en-GB"
    );
    assert_eq!(params.first("extend"), Some("attributes"));
    assert_eq!(params.all("extend"), vec!["attributes", "tabs"]);
    assert_eq!(params.all("missing"), Vec::<&str>::new());
  }

  #[test]
  fn test_merge_appends_single_values_after_multi_values() {
    let params = QueryParams::merge(
      [("sort", "name"), ("sort", "price")],
      [("sort", "price"), ("sort_dir", "asc")],
    );
    assert_eq!(params.all("sort"), vec!["name", "price"]);

    let params = QueryParams::merge([("sort", "name")], [("sort", "price")]);
    assert_eq!(params.all("sort"), vec!["name", "price"]);
  }

  #[test]
  fn test_set_replaces_values() {
    let mut params = QueryParams::parse("a=1&a=2&b=3");
    params.set("a", "9");
    params.set("c", "x y");
    assert_eq!(params.encode(), "a=9&b=3&c=x%20y");
  }

  #[test]
  fn test_parse_decodes_components() {
    let params = QueryParams::parse("postcode=M36+FJ&name=caf%C3%A9&flag&=empty");
    assert_eq!(params.first("postcode"), Some("M36 FJ"));
    assert_eq!(params.first("name"), Some("café"));
    assert_eq!(params.first("flag"), Some(""));
    assert_eq!(params.first(""), Some("empty"));
  }
}
