//! Backend collaborators: the content source, the markup source, and the
//! markup parser.
//!
//! The assembler is generic over these traits; production code uses the
//! reqwest-backed [`HttpContentSource`]/[`HttpMarkupSource`] and the
//! scraper-backed [`RenderedPage`], tests substitute mocks.

mod http;
mod parser;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ActionSet, AuthToken, Category, ContentTree, TopLevelItem, UserProfile};
use crate::tree::{CommentColor, FlatComment};

pub use http::{HttpContentSource, HttpMarkupSource};
pub use parser::RenderedPage;

/// Structured data from the search index and the realtime database.
///
/// Correct content and parentage; ordering and affordances are not
/// authoritative here. Failures surface as transport or decode errors.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// The full comment tree for one submission.
    async fn fetch_tree(&self, id: u64) -> Result<ContentTree>;

    /// One top-level item without its comments.
    async fn fetch_single(&self, id: u64) -> Result<TopLevelItem>;

    /// The canonical id feed for a category, in rank order.
    async fn fetch_ids_for_category(&self, category: Category) -> Result<Vec<u64>>;

    /// Full-text search over submissions.
    async fn search(&self, query: &str) -> Result<Vec<TopLevelItem>>;

    /// A user profile by username.
    async fn fetch_user(&self, username: &str) -> Result<UserProfile>;
}

/// The server-rendered site: authoritative display order, coloring, and the
/// only place voting/flagging affordances exist.
#[async_trait]
pub trait MarkupSource: Send + Sync {
    /// The rendered discussion page for one submission.
    ///
    /// With a token the page reflects that account's available actions.
    async fn fetch_rendered_page(&self, id: u64, token: Option<&AuthToken>) -> Result<String>;

    /// Perform one action link against the server.
    async fn execute_action(&self, url: &str, token: &AuthToken) -> Result<()>;
}

/// A parsed rendered page.
///
/// Parsing happens eagerly in [`MarkupParser::parse`]; the accessors are
/// cheap lookups afterwards. `parse` fails with a structural error when the
/// document carries none of the anchors a discussion page must have.
pub trait MarkupParser: Send + Sized {
    fn parse(document: &str) -> Result<Self>;

    /// Live comment ids in true top-to-bottom document order.
    fn true_comment_order(&self) -> &[u64];

    /// Color bucket per comment id; absent ids render full-contrast.
    fn comment_colors(&self) -> &HashMap<u64, CommentColor>;

    /// Valid operations per item id, as offered by the rendered page.
    fn available_actions(&self) -> &HashMap<u64, ActionSet>;

    /// Live comments as a flat, depth-annotated sequence in document order.
    fn flat_comments(&self) -> &[FlatComment];
}
