//! Async STAC client: loading values and fetching search pages.
//!
//! A search cursor is a [`Link`]. [`first_page_link`] turns the catalog's
//! `search` link plus a [`SearchRequest`] into the first cursor; every later
//! cursor is a page's `next` link, fetched as-is by [`StacClient::fetch`].

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{Result, SearchError};
use crate::models::{Collection, CollectionList, ItemCollection, Link, SearchRequest, StacValue};

// ---------------------------------------------------------------------------
// Request construction
// ---------------------------------------------------------------------------

/// Build the first-page cursor for `request` against a `search` link.
///
/// `GET` (the default) encodes `collections`, `bbox`, `datetime` and `limit`
/// as query parameters, replacing any already on the href and skipping
/// unset fields. Any other method carries the request as a JSON body and
/// keeps the href unchanged.
pub fn first_page_link(link: &Link, request: &SearchRequest) -> Result<Link> {
    let mut cursor = link.clone();
    let method = link.method();
    cursor.method = Some(method.clone());
    cursor.rel = "search".to_string();

    if method == "GET" {
        let mut url = Url::parse(&link.href)?;
        let mut params: Vec<(&str, String)> = Vec::new();
        if let Some(collections) = &request.collections {
            params.push(("collections", collections.join(",")));
        }
        if let Some(bbox) = &request.bbox {
            let joined: Vec<String> = bbox.iter().map(f64::to_string).collect();
            params.push(("bbox", joined.join(",")));
        }
        if let Some(datetime) = &request.datetime {
            params.push(("datetime", datetime.clone()));
        }
        if let Some(limit) = request.limit {
            params.push(("limit", limit.to_string()));
        }
        set_query_params(&mut url, &params);
        cursor.href = url.to_string();
        cursor.body = None;
    } else {
        cursor.body = Some(serde_json::to_value(request)?);
    }
    Ok(cursor)
}

fn set_query_params(url: &mut Url, params: &[(&str, String)]) {
    if params.is_empty() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !params.iter().any(|(key, _)| k == key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    let mut pairs = url.query_pairs_mut();
    pairs.clear();
    for (k, v) in &kept {
        pairs.append_pair(k, v);
    }
    for (k, v) in params {
        pairs.append_pair(k, v);
    }
}

/// Resolve the body to send for a `next` cursor.
///
/// With `merge: true` the link body is laid over the original request;
/// otherwise the link body is used as is.
pub fn next_page_body(link: &Link, original: &SearchRequest) -> Result<Option<Value>> {
    if link.method() == "GET" {
        return Ok(None);
    }
    if !link.merge.unwrap_or(false) {
        return Ok(link.body.clone());
    }
    let mut base = serde_json::to_value(original)?;
    if let (Some(base_obj), Some(Value::Object(link_obj))) = (base.as_object_mut(), &link.body) {
        for (k, v) in link_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    Ok(Some(base))
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for [`StacClient`].
#[derive(Debug, Clone)]
pub struct StacClientOptions {
    /// Per-request timeout (default 30 s).
    pub request_timeout: Duration,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for StacClientOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("stacmap/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Fetches one page for a cursor.
///
/// The seam between the pagination driver and the network; implemented by
/// [`StacClient`].
pub trait PageFetcher: Send + Sync + 'static {
    fn fetch_page<'a>(&'a self, cursor: &'a Link) -> BoxFuture<'a, Result<ItemCollection>>;
}

/// Async client for STAC values and item search.
#[derive(Debug, Clone)]
pub struct StacClient {
    client: reqwest::Client,
}

impl StacClient {
    pub fn new(options: StacClientOptions) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .user_agent(options.user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Load the STAC value at `href`.
    pub async fn get_value(&self, href: &str) -> Result<StacValue> {
        let link = Link::new("self", href);
        let body = self.send(&link, None).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Load every collection listed behind a catalog's `data` link,
    /// following `next` links. Values without one have no collections.
    pub async fn get_collections(&self, href: &str, value: &StacValue) -> Result<Vec<Collection>> {
        let Some(data) = value.data_link() else {
            return Ok(Vec::new());
        };
        let mut cursor = Some(absolutize(href, data)?);
        let mut collections = Vec::new();
        while let Some(link) = cursor.take() {
            let body = self.send(&link, None).await?;
            let mut page: CollectionList = serde_json::from_str(&body)?;
            collections.append(&mut page.collections);
            cursor = page
                .next_link()
                .map(|next| absolutize(&link.href, next))
                .transpose()?;
        }
        debug!(count = collections.len(), "collections loaded");
        Ok(collections)
    }

    /// Execute a cursor and decode the page.
    ///
    /// A non-success status is an error carrying the method, URL, status and
    /// response text. Nothing is retried.
    pub async fn fetch(&self, cursor: &Link) -> Result<ItemCollection> {
        let body = self.send(cursor, cursor.body.as_ref()).await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn send(&self, link: &Link, body: Option<&Value>) -> Result<String> {
        let method = link.method();
        debug!(%method, href = %link.href, "requesting");

        let verb = reqwest::Method::from_bytes(method.as_bytes()).unwrap_or(reqwest::Method::GET);
        let mut req = self
            .client
            .request(verb, &link.href)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(SearchError::Status {
                method,
                url: link.href.clone(),
                status,
                body: text.chars().take(500).collect(),
            });
        }
        Ok(resp.text().await?)
    }
}

impl PageFetcher for StacClient {
    fn fetch_page<'a>(&'a self, cursor: &'a Link) -> BoxFuture<'a, Result<ItemCollection>> {
        Box::pin(self.fetch(cursor))
    }
}

/// Find a search link for the value loaded from `href`: its own, else its
/// root's. Relative hrefs are resolved against the document they came from.
pub async fn find_search_link(
    client: &StacClient,
    href: &str,
    value: &StacValue,
    method: Option<&str>,
) -> Result<Link> {
    let pick = |base: &str, links: Vec<&Link>| -> Result<Option<Link>> {
        let found = match method {
            Some(m) => links.into_iter().find(|l| l.method().eq_ignore_ascii_case(m)),
            None => links.into_iter().next(),
        };
        found.map(|l| absolutize(base, l)).transpose()
    };
    if let Some(link) = pick(href, value.search_links())? {
        return Ok(link);
    }
    if let Some(root) = value.root_link() {
        let root = absolutize(href, root)?;
        let root_value = client.get_value(&root.href).await?;
        if let Some(link) = pick(&root.href, root_value.search_links())? {
            return Ok(link);
        }
    }
    Err(SearchError::NoSearchLink {
        id: value.id().unwrap_or(value.kind()).to_string(),
    })
}

fn absolutize(base: &str, link: &Link) -> Result<Link> {
    let mut link = link.clone();
    link.href = Url::parse(base)?.join(&link.href)?.to_string();
    Ok(link)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
