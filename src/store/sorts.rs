//! Ordered id listings for sorted and filtered collection reads.
//!
//! A view is keyed by resource type and a fingerprint of the listing query
//! (its sort and filter parameters). Pages are written at their absolute
//! offsets, so pages may arrive in any order. When a page reports a total that
//! disagrees with the cached view's length, the collection has changed shape
//! since the view was built and the cached order is thrown away.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::jsonapi::Document;
use crate::lookup;

/// Cached order of one listing.
///
/// Only fetched positions are stored, so a view over a large collection costs
/// as much as the pages actually read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortView {
  /// Ids by absolute position. A position not fetched yet is a hole.
  pub ids: BTreeMap<u64, String>,
  /// Length of the listing: the known total, or the end of the furthest page.
  pub len: u64,
  /// Collection size reported by the server, if it reported one.
  pub total: Option<u64>,
}

impl SortView {
  /// The id at `position`, if that position has been fetched.
  pub fn get(&self, position: u64) -> Option<&str> {
    self.ids.get(&position).map(String::as_str)
  }

  /// Number of positions fetched so far.
  pub fn fetched(&self) -> usize {
    self.ids.len()
  }

  /// Whether every position up to the known total has been fetched.
  pub fn is_complete(&self) -> bool {
    self.total == Some(self.len) && self.ids.len() as u64 == self.len
  }

  /// Fetched ids in order, skipping holes.
  pub fn known_ids(&self) -> impl Iterator<Item = &str> {
    self.ids.values().map(String::as_str)
  }
}

/// Views keyed by type then fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sorts(Arc<BTreeMap<String, BTreeMap<String, Arc<SortView>>>>);

impl Sorts {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, resource_type: &str, fingerprint: &str) -> Option<&Arc<SortView>> {
    self
      .0
      .get(resource_type)
      .and_then(|views| views.get(fingerprint))
  }

  pub fn of_type(&self, resource_type: &str) -> Option<&BTreeMap<String, Arc<SortView>>> {
    self.0.get(resource_type)
  }

  /// Fold one listing page into its view. Returns whether the view changed.
  ///
  /// Pages with no primary array, an empty primary array, or a self link
  /// without sort or filter parameters are ignored, and so are pages whose
  /// offset puts them past the largest representable position.
  pub fn reconcile(&mut self, document: &Document) -> bool {
    let Some(items) = document.data.as_array().filter(|items| !items.is_empty()) else {
      return false;
    };
    let Some(resource_type) = lookup::get_str(&items[0], &["type"]) else {
      return false;
    };
    let Some(fingerprint) = document.self_link().and_then(sort_fingerprint) else {
      return false;
    };

    let offset = lookup::get_u64(&document.meta, &["page", "offset"]).unwrap_or(0);
    let Some(end) = offset.checked_add(items.len() as u64) else {
      debug!(resource_type, offset, "page offset out of range, not tracking its order");
      return false;
    };
    let total = lookup::get_u64(&document.meta, &["page", "total"]);
    let existing = self.get(resource_type, &fingerprint);

    let (mut ids, len) = match existing {
      Some(view) if total.map_or(true, |total| view.len == total) => (view.ids.clone(), view.len),
      Some(view) => {
        debug!(
          resource_type,
          fingerprint = %fingerprint,
          cached = view.len,
          total = total.unwrap_or_default(),
          "collection changed shape, discarding cached sort order"
        );
        (BTreeMap::new(), 0)
      }
      None => (BTreeMap::new(), 0),
    };

    for (position, item) in (offset..end).zip(items) {
      match lookup::get_str(item, &["id"]) {
        Some(id) => {
          ids.insert(position, id.to_string());
        }
        None => {
          ids.remove(&position);
        }
      }
    }

    let view = SortView {
      ids,
      len: len.max(end).max(total.unwrap_or(0)),
      total,
    };
    if existing.is_some_and(|current| **current == view) {
      return false;
    }

    Arc::make_mut(&mut self.0)
      .entry(resource_type.to_string())
      .or_default()
      .insert(fingerprint, Arc::new(view));
    true
  }
}

/// Cache key of a listing: its sort and filter query parameters, in the order
/// they appear in `link`, joined with `&`.
///
/// Pagination and every other parameter are dropped. Parameters are compared
/// as received (still percent-encoded). Returns `None` when the link carries
/// no sort or filter parameter at all.
pub fn sort_fingerprint(link: &str) -> Option<String> {
  let without_fragment = link.split('#').next().unwrap_or_default();
  let (_, query) = without_fragment.rsplit_once('?')?;

  let kept: Vec<&str> = query
    .split('&')
    .filter(|param| {
      let name = param.split('=').next().unwrap_or_default();
      is_listing_param(name, "sort") || is_listing_param(name, "filter")
    })
    .collect();

  if kept.is_empty() {
    None
  } else {
    Some(kept.join("&"))
  }
}

fn is_listing_param(name: &str, family: &str) -> bool {
  match name.strip_prefix(family) {
    Some(rest) => rest.is_empty() || rest.starts_with('[') || rest.starts_with("%5B") || rest.starts_with("%5b"),
    None => false,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  const LISTING: &str = "http://localhost/api/tasks?sort=-created&page[offset]=0&page[limit]=2";

  fn page(offset: u64, total: Option<u64>, ids: &[&str]) -> Document {
    let data: Vec<_> = ids
      .iter()
      .map(|id| json!({ "type": "tasks", "id": id }))
      .collect();
    let mut meta = json!({ "page": { "offset": offset } });
    if let Some(total) = total {
      meta["page"]["total"] = json!(total);
    }

    serde_json::from_value(json!({
      "data": data,
      "links": { "self": LISTING },
      "meta": meta,
    }))
    .unwrap()
  }

  fn ids(view: &SortView) -> Vec<Option<&str>> {
    (0..view.len).map(|position| view.get(position)).collect()
  }

  #[test]
  fn fingerprint_keeps_sort_and_filter_in_order() {
    assert_eq!(
      sort_fingerprint("http://localhost/jsonapi/transactions/?sort=customer&filter%5Breason%5D=refund")
        .as_deref(),
      Some("sort=customer&filter%5Breason%5D=refund")
    );
    assert_eq!(
      sort_fingerprint("tasks?page[offset]=20&filter[done]=false&page[limit]=10&sort=title").as_deref(),
      Some("filter[done]=false&sort=title")
    );
    assert_eq!(
      sort_fingerprint("tasks?sort=b&filter[x]=1").as_deref(),
      Some("sort=b&filter[x]=1")
    );
    assert_ne!(
      sort_fingerprint("tasks?sort=b&filter[x]=1"),
      sort_fingerprint("tasks?filter[x]=1&sort=b")
    );
  }

  #[test]
  fn fingerprint_requires_a_listing_parameter() {
    assert_eq!(sort_fingerprint("tasks/1"), None);
    assert_eq!(sort_fingerprint("tasks?page[offset]=0&include=owner"), None);
    assert_eq!(sort_fingerprint("tasks?sorted=yes"), None);
  }

  #[test]
  fn pages_fill_absolute_positions() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(0, Some(4), &["a", "b"]));
    sorts.reconcile(&page(2, Some(4), &["c", "d"]));

    let view = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(ids(view), vec![Some("a"), Some("b"), Some("c"), Some("d")]);
    assert_eq!(view.total, Some(4));
    assert!(view.is_complete());
  }

  #[test]
  fn pages_may_arrive_out_of_order() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(2, Some(4), &["c", "d"]));

    let partial = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(ids(partial), vec![None, None, Some("c"), Some("d")]);
    assert!(!partial.is_complete());

    sorts.reconcile(&page(0, Some(4), &["a", "b"]));
    let view = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(ids(view), vec![Some("a"), Some("b"), Some("c"), Some("d")]);
  }

  #[test]
  fn total_mismatch_discards_cached_order() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(0, Some(4), &["a", "b"]));
    sorts.reconcile(&page(2, Some(4), &["c", "d"]));
    sorts.reconcile(&page(2, Some(3), &["d"]));

    let view = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(ids(view), vec![None, None, Some("d")]);
    assert_eq!(view.total, Some(3));
  }

  #[test]
  fn unknown_total_extends_existing_view() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(0, None, &["a", "b"]));
    sorts.reconcile(&page(2, None, &["c"]));

    let view = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(ids(view), vec![Some("a"), Some("b"), Some("c")]);
    assert_eq!(view.total, None);
    assert_eq!(view.known_ids().collect::<Vec<_>>(), vec!["a", "b", "c"]);
  }

  #[test]
  fn identical_page_keeps_view_identity() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(0, Some(2), &["a", "b"]));
    let before = sorts.clone();

    assert!(!sorts.reconcile(&page(0, Some(2), &["a", "b"])));
    assert!(Arc::ptr_eq(
      before.get("tasks", "sort=-created").unwrap(),
      sorts.get("tasks", "sort=-created").unwrap()
    ));
  }

  #[test]
  fn ignores_non_listings() {
    let mut sorts = Sorts::new();
    let single: Document = serde_json::from_value(json!({
      "data": { "type": "tasks", "id": "1" },
      "links": { "self": "tasks/1?sort=x" }
    }))
    .unwrap();
    let empty: Document = serde_json::from_value(json!({
      "data": [],
      "links": { "self": "tasks?sort=x" }
    }))
    .unwrap();
    let unsorted: Document = serde_json::from_value(json!({
      "data": [{ "type": "tasks", "id": "1" }],
      "links": { "self": "tasks?page[offset]=0" }
    }))
    .unwrap();

    assert!(!sorts.reconcile(&single));
    assert!(!sorts.reconcile(&empty));
    assert!(!sorts.reconcile(&unsorted));
    assert!(sorts.of_type("tasks").is_none());
  }

  #[test]
  fn large_totals_store_only_fetched_positions() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(0, Some(20_000_000), &["a"]));
    sorts.reconcile(&page(1 << 62, Some(20_000_000), &["z"]));

    let view = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(view.len, (1 << 62) + 1);
    assert_eq!(view.fetched(), 2);
    assert_eq!(view.get(0), Some("a"));
    assert_eq!(view.get(1 << 62), Some("z"));
    assert!(!view.is_complete());
  }

  #[test]
  fn page_ending_past_u64_is_ignored() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(0, None, &["a"]));

    assert!(!sorts.reconcile(&page(u64::MAX, None, &["b", "c"])));
    let view = sorts.get("tasks", "sort=-created").unwrap();
    assert_eq!(view.known_ids().collect::<Vec<_>>(), vec!["a"]);
  }

  #[test]
  fn views_serialize_by_position() {
    let mut sorts = Sorts::new();
    sorts.reconcile(&page(2, Some(4), &["c"]));

    let value = serde_json::to_value(&sorts).unwrap();
    assert_eq!(
      value,
      json!({ "tasks": { "sort=-created": { "ids": { "2": "c" }, "len": 4, "total": 4 } } })
    );

    let back: Sorts = serde_json::from_value(value).unwrap();
    assert_eq!(back, sorts);
  }
}
