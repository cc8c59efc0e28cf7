//! reqwest-backed implementations of the two backend sources.
//!
//! The content side talks to the Algolia search index (`/items`, `/search`)
//! and the Firebase realtime database (`/v0/*stories.json`, `/v0/item`,
//! `/v0/user`); the markup side fetches `item?id=` pages and executes action
//! links against the rendered site. Base URLs are overridable for tests.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::COOKIE;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use crate::error::{classify_reqwest_error, classify_status, ApiError, Result};
use crate::models::{
    AuthToken, Category, ContentNode, ContentTree, ItemKind, TopLevelItem, UserProfile,
};

use super::{ContentSource, MarkupSource};

const ALGOLIA_BASE: &str = "https://hn.algolia.com/api/v1";
const FIREBASE_BASE: &str = "https://hacker-news.firebaseio.com";
const SITE_BASE: &str = "https://news.ycombinator.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("kindling/", env!("CARGO_PKG_VERSION"));

fn build_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|err| ApiError::Transport(format!("failed to build HTTP client: {err}")))
}

async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    debug!(url, "GET json");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|err| classify_reqwest_error(&err, url))?;
    let status = response.status();
    if !status.is_success() {
        return Err(classify_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("request failed"),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|err| classify_reqwest_error(&err, url))
}

fn utc_from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

fn kind_from_str(kind: Option<&str>) -> ItemKind {
    match kind {
        Some("job") => ItemKind::Job,
        Some("poll") => ItemKind::Poll,
        _ => ItemKind::Story,
    }
}

/// Structured data over Algolia and Firebase.
pub struct HttpContentSource {
    client: Client,
    algolia_base: String,
    firebase_base: String,
}

impl HttpContentSource {
    pub fn new() -> Result<Self> {
        Self::with_bases(ALGOLIA_BASE, FIREBASE_BASE)
    }

    /// Point the source at different hosts (used by the wiremock tests).
    pub fn with_bases(algolia_base: &str, firebase_base: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            algolia_base: algolia_base.trim_end_matches('/').to_string(),
            firebase_base: firebase_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch_tree(&self, id: u64) -> Result<ContentTree> {
        let url = format!("{}/items/{id}", self.algolia_base);
        let item: AlgoliaItem = get_json(&self.client, &url).await?;
        item.into_tree()
    }

    async fn fetch_single(&self, id: u64) -> Result<TopLevelItem> {
        let url = format!("{}/v0/item/{id}.json", self.firebase_base);
        let item: Option<FirebaseItem> = get_json(&self.client, &url).await?;
        match item {
            Some(item) => Ok(item.into_item()),
            None => Err(ApiError::Client {
                status: 404,
                message: format!("item {id} does not exist"),
            }),
        }
    }

    async fn fetch_ids_for_category(&self, category: Category) -> Result<Vec<u64>> {
        let url = format!("{}/v0/{}.json", self.firebase_base, category.feed_name());
        get_json(&self.client, &url).await
    }

    async fn search(&self, query: &str) -> Result<Vec<TopLevelItem>> {
        let url = format!(
            "{}/search?query={}&tags=story",
            self.algolia_base,
            urlencoding::encode(query)
        );
        let response: SearchResponse = get_json(&self.client, &url).await?;
        Ok(response.hits.into_iter().filter_map(SearchHit::into_item).collect())
    }

    async fn fetch_user(&self, username: &str) -> Result<UserProfile> {
        let url = format!(
            "{}/v0/user/{}.json",
            self.firebase_base,
            urlencoding::encode(username)
        );
        let user: Option<FirebaseUser> = get_json(&self.client, &url).await?;
        match user {
            Some(user) => Ok(user.into_profile()),
            None => Err(ApiError::Client {
                status: 404,
                message: format!("user '{username}' does not exist"),
            }),
        }
    }
}

/// The rendered site over plain HTTP with a session cookie.
pub struct HttpMarkupSource {
    client: Client,
    base: String,
}

impl HttpMarkupSource {
    pub fn new() -> Result<Self> {
        Self::with_base(SITE_BASE)
    }

    pub fn with_base(base: &str) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base: base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MarkupSource for HttpMarkupSource {
    async fn fetch_rendered_page(&self, id: u64, token: Option<&AuthToken>) -> Result<String> {
        let url = format!("{}/item?id={id}", self.base);
        debug!(url, authenticated = token.is_some(), "GET rendered page");
        let mut request = self.client.get(&url);
        if let Some(token) = token {
            request = request.header(COOKIE, format!("user={}", token.as_str()));
        }
        let response = request
            .send()
            .await
            .map_err(|err| classify_reqwest_error(&err, &url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed"),
            ));
        }
        response
            .text()
            .await
            .map_err(|err| classify_reqwest_error(&err, &url))
    }

    async fn execute_action(&self, url: &str, token: &AuthToken) -> Result<()> {
        let full = format!("{}/{}", self.base, url.trim_start_matches('/'));
        debug!(url = full, "executing action");
        let response = self
            .client
            .get(&full)
            .header(COOKIE, format!("user={}", token.as_str()))
            .send()
            .await
            .map_err(|err| classify_reqwest_error(&err, &full))?;
        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("action rejected"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct AlgoliaItem {
    id: Option<u64>,
    created_at_i: Option<i64>,
    author: Option<String>,
    title: Option<String>,
    url: Option<String>,
    points: Option<u32>,
    text: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    children: Vec<AlgoliaItem>,
}

impl AlgoliaItem {
    fn into_tree(self) -> Result<ContentTree> {
        let id = self
            .id
            .ok_or_else(|| ApiError::Decode("item tree without an id".to_string()))?;
        Ok(ContentTree {
            id,
            kind: kind_from_str(self.kind.as_deref()),
            title: self.title.unwrap_or_default(),
            url: self.url,
            author: self.author.unwrap_or_default(),
            points: self.points.unwrap_or(0),
            created_at: utc_from_unix(self.created_at_i.unwrap_or(0)),
            children: self
                .children
                .into_iter()
                .filter_map(AlgoliaItem::into_node)
                .collect(),
        })
    }

    fn into_node(self) -> Option<ContentNode> {
        let id = self.id?;
        // The index marks deleted comments by nulling author and text while
        // keeping the tree slot.
        let deleted = self.author.is_none() || self.text.is_none();
        Some(ContentNode {
            id,
            author: self.author,
            text: self.text,
            created_at: utc_from_unix(self.created_at_i.unwrap_or(0)),
            deleted,
            children: self
                .children
                .into_iter()
                .filter_map(AlgoliaItem::into_node)
                .collect(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "objectID")]
    object_id: String,
    title: Option<String>,
    url: Option<String>,
    author: Option<String>,
    points: Option<u32>,
    num_comments: Option<u32>,
    created_at_i: Option<i64>,
}

impl SearchHit {
    fn into_item(self) -> Option<TopLevelItem> {
        let id = self.object_id.parse().ok()?;
        Some(TopLevelItem {
            id,
            kind: ItemKind::Story,
            title: self.title?,
            url: self.url,
            author: self.author.unwrap_or_default(),
            points: self.points.unwrap_or(0),
            comment_count: self.num_comments.unwrap_or(0),
            created_at: utc_from_unix(self.created_at_i.unwrap_or(0)),
        })
    }
}

#[derive(Debug, Deserialize)]
struct FirebaseItem {
    id: u64,
    #[serde(rename = "by")]
    author: Option<String>,
    title: Option<String>,
    url: Option<String>,
    score: Option<u32>,
    descendants: Option<u32>,
    time: Option<i64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl FirebaseItem {
    fn into_item(self) -> TopLevelItem {
        TopLevelItem {
            id: self.id,
            kind: kind_from_str(self.kind.as_deref()),
            title: self.title.unwrap_or_default(),
            url: self.url,
            author: self.author.unwrap_or_default(),
            points: self.score.unwrap_or(0),
            comment_count: self.descendants.unwrap_or(0),
            created_at: utc_from_unix(self.time.unwrap_or(0)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FirebaseUser {
    id: String,
    karma: i64,
    about: Option<String>,
    created: i64,
}

impl FirebaseUser {
    fn into_profile(self) -> UserProfile {
        UserProfile {
            username: self.id,
            karma: self.karma,
            about: self.about,
            created_at: utc_from_unix(self.created),
        }
    }
}
