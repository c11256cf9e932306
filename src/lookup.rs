//! Safe nested-field access over loosely-shaped JSON payloads.
//!
//! Server documents are only partially typed: `meta`, `links` and the primary
//! `data` member can take several shapes. These helpers walk a
//! [`serde_json::Value`] along a path of segments without panicking on missing
//! keys or type mismatches.

use serde_json::Value;

/// A single step into a JSON tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seg<'a> {
  /// Object member access
  Key(&'a str),
  /// Array element access
  Index(usize),
}

impl<'a> From<&'a str> for Seg<'a> {
  fn from(key: &'a str) -> Self {
    Seg::Key(key)
  }
}

impl From<usize> for Seg<'_> {
  fn from(index: usize) -> Self {
    Seg::Index(index)
  }
}

/// Follow `path` from `root`, returning the value found there.
///
/// Returns `None` as soon as a segment does not apply: a key on a non-object,
/// an index on a non-array, or a member that does not exist. A present member
/// holding `null` is returned as `Some(&Value::Null)`.
pub fn get<'v, 'p, I, S>(root: &'v Value, path: I) -> Option<&'v Value>
where
  I: IntoIterator<Item = S>,
  S: Into<Seg<'p>>,
{
  path
    .into_iter()
    .try_fold(root, |current, seg| {
      let seg: Seg<'p> = seg.into();
      match (seg, current) {
        (Seg::Key(key), Value::Object(map)) => map.get(key),
        (Seg::Index(index), Value::Array(items)) => items.get(index),
        _ => None,
      }
    })
}

/// Whether every segment of `path` exists, regardless of the final value.
pub fn has<'p, I, S>(root: &Value, path: I) -> bool
where
  I: IntoIterator<Item = S>,
  S: Into<Seg<'p>>,
{
  get(root, path).is_some()
}

/// Like [`get`], falling back to `default` when the path is missing.
pub fn get_or<'v, 'p, I, S>(root: &'v Value, path: I, default: &'v Value) -> &'v Value
where
  I: IntoIterator<Item = S>,
  S: Into<Seg<'p>>,
{
  get(root, path).unwrap_or(default)
}

/// String at `path`, if present and a string.
pub fn get_str<'v>(root: &'v Value, path: &[&str]) -> Option<&'v str> {
  get(root, path.iter().copied()).and_then(Value::as_str)
}

/// Unsigned integer at `path`, if present and representable.
///
/// Floats with no fractional part are accepted since some backends emit
/// `"total": 4.0`.
pub fn get_u64(root: &Value, path: &[&str]) -> Option<u64> {
  let value = get(root, path.iter().copied())?;
  value.as_u64().or_else(|| {
    value
      .as_f64()
      .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
      .map(|f| f as u64)
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn walks_objects_and_arrays() {
    let doc = json!({ "meta": { "page": { "offset": 2 } }, "data": [{ "id": "1" }] });

    assert_eq!(get(&doc, ["meta", "page", "offset"]), Some(&json!(2)));
    assert_eq!(
      get(&doc, [Seg::Key("data"), Seg::Index(0), Seg::Key("id")]),
      Some(&json!("1"))
    );
  }

  #[test]
  fn missing_or_mismatched_paths_are_none() {
    let doc = json!({ "links": { "self": "tasks?sort=name" }, "count": 3 });

    assert!(get(&doc, ["links", "next"]).is_none());
    assert!(get(&doc, ["count", "inner"]).is_none());
    assert!(get(&doc, [Seg::Key("links"), Seg::Index(0)]).is_none());
    assert!(!has(&doc, ["meta"]));
  }

  #[test]
  fn explicit_null_is_present() {
    let doc = json!({ "relationships": { "owner": { "data": null } } });

    assert!(has(&doc, ["relationships", "owner", "data"]));
    assert_eq!(
      get(&doc, ["relationships", "owner", "data"]),
      Some(&Value::Null)
    );
  }

  #[test]
  fn typed_helpers() {
    let doc = json!({ "meta": { "page": { "total": 4.0, "offset": -1 } }, "links": { "self": "x" } });
    let fallback = json!("none");

    assert_eq!(get_u64(&doc, &["meta", "page", "total"]), Some(4));
    assert_eq!(get_u64(&doc, &["meta", "page", "offset"]), None);
    assert_eq!(get_str(&doc, &["links", "self"]), Some("x"));
    assert_eq!(get_or(&doc, ["links", "prev"], &fallback), &fallback);
    assert!(get(&doc, Vec::<&str>::new()).is_some());
  }
}
