//! Decides which reads are needed to make a resource and its included
//! relationships available.

use std::collections::BTreeMap;

use crate::store::{ResourceRef, Store};

/// Endpoints to read so that `type/id` and the targets of its `include`d
/// relationships end up in `store`.
///
/// - A missing resource is fetched by itself, with the include list passed to
///   the server: `type/id?include=a,b`.
/// - For a stored resource, targets of the included relationships that are
///   not in the store are fetched with one filtered read per type:
///   `type/?filter[id]=1&filter[id]=2`.
///
/// Relationships the stored resource does not have, or that carry no linkage,
/// contribute nothing.
pub fn plan(store: &Store, resource_type: &str, id: &str, include: &[&str]) -> Vec<String> {
  let Some(resource) = store.resource(resource_type, id) else {
    let endpoint = ResourceRef::new(resource_type, id).endpoint();
    return if include.is_empty() {
      vec![endpoint]
    } else {
      vec![format!("{}?include={}", endpoint, include.join(","))]
    };
  };

  let mut missing: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
  for name in include {
    let Some(relationship) = resource.relationships.get(*name) else {
      continue;
    };
    for target in relationship.data.refs() {
      if store.contains_resource(target) {
        continue;
      }
      let ids = missing.entry(target.resource_type.as_str()).or_default();
      if !ids.contains(&target.id.as_str()) {
        ids.push(target.id.as_str());
      }
    }
  }

  missing
    .into_iter()
    .map(|(missing_type, ids)| {
      let filter: Vec<String> = ids.iter().map(|id| format!("filter[id]={}", id)).collect();
      format!("{}/?{}", missing_type, filter.join("&"))
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::{Relationship, Resource};

  fn store() -> Store {
    Store::new().upsert_all([
      Resource::new("articles", "1")
        .with_relationship("author", Relationship::to_one(ResourceRef::new("people", "42")))
        .with_relationship(
          "comments",
          Relationship::to_many(vec![
            ResourceRef::new("comments", "5"),
            ResourceRef::new("comments", "6"),
            ResourceRef::new("comments", "5"),
            ResourceRef::new("comments", "7"),
          ]),
        )
        .with_relationship("editor", Relationship::null()),
      Resource::new("comments", "6"),
    ])
  }

  #[test]
  fn missing_resource_is_fetched_with_its_includes() {
    let store = Store::new();

    assert_eq!(
      plan(&store, "articles", "1", &["author", "comments"]),
      vec!["articles/1?include=author,comments"]
    );
    assert_eq!(plan(&store, "articles", "1", &[]), vec!["articles/1"]);
  }

  #[test]
  fn missing_targets_are_grouped_by_type() {
    assert_eq!(
      plan(&store(), "articles", "1", &["author", "comments"]),
      vec![
        "comments/?filter[id]=5&filter[id]=7",
        "people/?filter[id]=42",
      ]
    );
  }

  #[test]
  fn nothing_to_do_when_everything_is_present() {
    let store = store().upsert_all([
      Resource::new("people", "42"),
      Resource::new("comments", "5"),
      Resource::new("comments", "7"),
    ]);

    assert!(plan(&store, "articles", "1", &["author", "comments"]).is_empty());
    assert!(plan(&store, "articles", "1", &[]).is_empty());
  }

  #[test]
  fn unknown_and_empty_relationships_are_skipped() {
    assert!(plan(&store(), "articles", "1", &["editor", "tags"]).is_empty());
  }
}
