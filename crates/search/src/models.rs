//! STAC (SpatioTemporal Asset Catalog) data types.
//!
//! Lightweight serde models covering what the engine reads: links (for
//! search endpoints and pagination), collection extents, item datetimes and
//! bboxes, and item-collection pages. Everything else is kept as raw JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Search request
// ---------------------------------------------------------------------------

/// Body for `POST /search`, or the query of `GET /search` (STAC API – Item Search).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    /// `start/end` interval, `..` for an open bound.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    /// Page size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl SearchRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the collection filter.
    pub fn collections<S: AsRef<str>>(mut self, ids: &[S]) -> Self {
        self.collections = Some(ids.iter().map(|s| s.as_ref().to_string()).collect());
        self
    }

    /// Set datetime or datetime range (e.g. `"2024-06-01T00:00:00Z/.."`).
    pub fn datetime(mut self, dt: &str) -> Self {
        self.datetime = Some(dt.to_string());
        self
    }

    /// Set the bounding box `[west, south, east, north]`.
    pub fn bbox(mut self, west: f64, south: f64, east: f64, north: f64) -> Self {
        self.bbox = Some(vec![west, south, east, north]);
        self
    }

    /// Set maximum items per page.
    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// A STAC Link. Used for search endpoints and as the pagination cursor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Link {
    /// Relationship: `"self"`, `"root"`, `"search"`, `"next"`, etc.
    pub rel: String,

    /// Target URL.
    pub href: String,

    /// HTTP method for the link (`GET` when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Request body for POST links.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// If true, `body` is merged over the previous request body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<bool>,

    /// Media type of the linked resource.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

impl Link {
    pub fn new(rel: &str, href: &str) -> Self {
        Self {
            rel: rel.to_string(),
            href: href.to_string(),
            method: None,
            body: None,
            merge: None,
            type_: None,
        }
    }

    /// Builder-style method setter.
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    /// The upper-cased HTTP method, defaulting to `GET`.
    pub fn method(&self) -> String {
        self.method.as_deref().unwrap_or("GET").to_uppercase()
    }
}

fn find_link<'a>(links: &'a [Link], rel: &str) -> Option<&'a Link> {
    links.iter().find(|l| l.rel == rel)
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// Any STAC value that can be loaded from an href.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum StacValue {
    Catalog(Catalog),
    Collection(Collection),
    #[serde(rename = "Feature")]
    Item(Item),
    #[serde(rename = "FeatureCollection")]
    ItemCollection(ItemCollection),
}

impl StacValue {
    pub fn links(&self) -> &[Link] {
        match self {
            Self::Catalog(c) => &c.links,
            Self::Collection(c) => &c.links,
            Self::Item(i) => &i.links,
            Self::ItemCollection(c) => &c.links,
        }
    }

    /// Links with `rel == "search"`, one per supported method.
    pub fn search_links(&self) -> Vec<&Link> {
        self.links().iter().filter(|l| l.rel == "search").collect()
    }

    /// The `root` link, if any.
    pub fn root_link(&self) -> Option<&Link> {
        find_link(self.links(), "root")
    }

    /// The `data` link of a catalog, pointing at its collection list.
    pub fn data_link(&self) -> Option<&Link> {
        match self {
            Self::Catalog(c) => find_link(&c.links, "data"),
            _ => None,
        }
    }

    /// Id of the catalog, collection or item.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Catalog(c) => Some(&c.id),
            Self::Collection(c) => Some(&c.id),
            Self::Item(i) => Some(&i.id),
            Self::ItemCollection(_) => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Catalog(_) => "Catalog",
            Self::Collection(_) => "Collection",
            Self::Item(_) => "Item",
            Self::ItemCollection(_) => "ItemCollection",
        }
    }
}

/// A STAC Catalog.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Catalog {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub links: Vec<Link>,
}

/// A STAC Collection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Collection {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default)]
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,

    #[serde(default)]
    pub links: Vec<Link>,
}

/// One page of a `/collections` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CollectionList {
    #[serde(default)]
    pub collections: Vec<Collection>,

    #[serde(default)]
    pub links: Vec<Link>,
}

impl CollectionList {
    pub fn next_link(&self) -> Option<&Link> {
        find_link(&self.links, "next")
    }
}

/// Spatial and temporal extents of a collection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Extent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialExtent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalIntervals>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SpatialExtent {
    /// The first box is the overall extent; others are sub-extents.
    #[serde(default)]
    pub bbox: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemporalIntervals {
    /// `[start, end]` pairs; `null` is an open bound.
    #[serde(default)]
    pub interval: Vec<[Option<String>; 2]>,
}

/// A single STAC Item (GeoJSON Feature).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Item {
    #[serde(rename = "type", default = "feature_type")]
    pub type_: String,

    /// Unique item identifier.
    pub id: String,

    /// Geometry as raw JSON.
    #[serde(default)]
    pub geometry: Option<Value>,

    /// Bounding box, 4 or 6 values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<f64>>,

    #[serde(default)]
    pub properties: ItemProperties,

    #[serde(default)]
    pub assets: Map<String, Value>,

    /// Collection this item belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    #[serde(default)]
    pub links: Vec<Link>,
}

fn feature_type() -> String {
    "Feature".to_string()
}

/// STAC Item properties.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ItemProperties {
    /// ISO 8601 datetime; `null` when a start/end pair is given instead.
    #[serde(default)]
    pub datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_datetime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_datetime: Option<String>,

    /// All other properties we don't model explicitly.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A STAC Item Collection (GeoJSON FeatureCollection); also one page of
/// search results.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ItemCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub type_: String,

    #[serde(default)]
    pub features: Vec<Item>,

    #[serde(default)]
    pub links: Vec<Link>,

    #[serde(rename = "numberMatched", skip_serializing_if = "Option::is_none")]
    pub number_matched: Option<u64>,

    #[serde(rename = "numberReturned", skip_serializing_if = "Option::is_none")]
    pub number_returned: Option<u64>,

    /// Older servers report counts under the context extension.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

impl ItemCollection {
    /// An item collection holding `features` and no links.
    pub fn new(features: Vec<Item>) -> Self {
        Self {
            type_: feature_collection_type(),
            number_matched: None,
            number_returned: Some(features.len() as u64),
            features,
            links: Vec::new(),
            context: None,
        }
    }

    /// Find the `"next"` pagination link, if any.
    pub fn next_link(&self) -> Option<&Link> {
        find_link(&self.links, "next")
    }

    /// `numberMatched`, or `context.matched` for servers using the context
    /// extension.
    pub fn matched(&self) -> Option<u64> {
        self.number_matched.or_else(|| {
            self.context
                .as_ref()
                .and_then(|c| c.get("matched"))
                .and_then(Value::as_u64)
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PAGE: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {
      "type": "Feature",
      "id": "m_3008501_ne_16_060_20191109",
      "geometry": {
        "type": "Polygon",
        "coordinates": [[
          [-85.81, 30.87], [-85.74, 30.87], [-85.74, 30.94], [-85.81, 30.94], [-85.81, 30.87]
        ]]
      },
      "bbox": [-85.81, 30.87, -85.74, 30.94],
      "properties": {
        "datetime": "2019-11-09T00:00:00Z",
        "naip:state": "al",
        "gsd": 0.6
      },
      "assets": {
        "image": {"href": "https://example.com/m_3008501_ne_16_060_20191109.tif"}
      },
      "collection": "naip",
      "links": []
    }
  ],
  "links": [
    {
      "rel": "next",
      "href": "https://example.com/api/search",
      "method": "POST",
      "body": {"token": "next:abc"},
      "merge": true
    },
    {"rel": "self", "href": "https://example.com/api/search"}
  ],
  "numberMatched": 500,
  "numberReturned": 1
}"#;

    #[test]
    fn parse_page() {
        let page: ItemCollection = serde_json::from_str(PAGE).unwrap();
        assert_eq!(page.type_, "FeatureCollection");
        assert_eq!(page.len(), 1);
        assert_eq!(page.matched(), Some(500));

        let item = &page.features[0];
        assert_eq!(item.collection.as_deref(), Some("naip"));
        assert_eq!(item.properties.datetime.as_deref(), Some("2019-11-09T00:00:00Z"));
        assert!(item.properties.extra.contains_key("naip:state"));
    }

    #[test]
    fn catalog_data_link() {
        let catalog: StacValue = serde_json::from_value(serde_json::json!({
            "type": "Catalog",
            "id": "api",
            "links": [{"rel": "data", "href": "https://example.com/collections"}]
        }))
        .unwrap();
        assert_eq!(catalog.data_link().unwrap().href, "https://example.com/collections");

        let list: CollectionList = serde_json::from_value(serde_json::json!({
            "collections": [{"id": "naip", "links": []}],
            "links": [{"rel": "next", "href": "https://example.com/collections?page=2"}]
        }))
        .unwrap();
        assert_eq!(list.collections[0].id, "naip");
        assert!(list.next_link().is_some());
    }

    #[test]
    fn next_link_with_post_body() {
        let page: ItemCollection = serde_json::from_str(PAGE).unwrap();
        let next = page.next_link().unwrap();
        assert_eq!(next.method(), "POST");
        assert_eq!(next.merge, Some(true));
        assert_eq!(next.body, Some(serde_json::json!({"token": "next:abc"})));
    }

    #[test]
    fn matched_falls_back_to_context() {
        let page: ItemCollection = serde_json::from_value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [],
            "context": {"matched": 12, "returned": 0}
        }))
        .unwrap();
        assert_eq!(page.matched(), Some(12));
        assert!(page.next_link().is_none());
    }

    #[test]
    fn value_dispatches_on_type() {
        let value: StacValue = serde_json::from_str(
            r#"{
              "type": "Collection",
              "id": "naip",
              "description": "NAIP imagery",
              "extent": {
                "spatial": {"bbox": [[-160.0, 17.0, -67.0, 50.0]]},
                "temporal": {"interval": [["2010-01-01T00:00:00Z", null]]}
              },
              "links": [
                {"rel": "root", "href": "https://example.com/api"},
                {"rel": "search", "href": "https://example.com/api/search", "method": "GET"},
                {"rel": "search", "href": "https://example.com/api/search", "method": "POST"}
              ]
            }"#,
        )
        .unwrap();
        assert_eq!(value.kind(), "Collection");
        assert_eq!(value.id(), Some("naip"));
        assert_eq!(value.search_links().len(), 2);
        assert_eq!(value.root_link().unwrap().href, "https://example.com/api");

        let StacValue::Collection(collection) = value else {
            panic!("expected a collection");
        };
        let interval = &collection.extent.unwrap().temporal.unwrap().interval[0];
        assert_eq!(interval[0].as_deref(), Some("2010-01-01T00:00:00Z"));
        assert!(interval[1].is_none());
    }

    #[test]
    fn item_type_survives_tagged_parse() {
        let value: StacValue = serde_json::from_str(
            r#"{"type": "Feature", "id": "a", "properties": {"datetime": null}}"#,
        )
        .unwrap();
        let StacValue::Item(item) = value else {
            panic!("expected an item");
        };
        assert_eq!(item.type_, "Feature");
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["type"], "Feature");
    }

    #[test]
    fn request_builder_skips_unset_fields() {
        let request = SearchRequest::new().collections(&["naip"]).limit(100);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"collections": ["naip"], "limit": 100}));
        let body = serde_json::to_value(SearchRequest::new()).unwrap();
        assert!(body.as_object().unwrap().is_empty());
    }

    #[test]
    fn link_method_defaults_to_get() {
        assert_eq!(Link::new("search", "https://x").method(), "GET");
        assert_eq!(Link::new("search", "https://x").with_method("post").method(), "POST");
    }
}
