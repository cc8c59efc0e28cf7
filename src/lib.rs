//! kindling is an async client library for assembling discussion pages from
//! a social news site whose two backends disagree.
//!
//! The structured content API returns full comment trees with correct
//! parentage but unreliable sibling order and no notion of vote fading or
//! per-account actions. The server-rendered site shows the true order, the
//! fade color of every comment and the actions the signed-in account may
//! take, but only as flat HTML. [`PageAssembler`] fetches both concurrently,
//! reconciles them into a single [`Page`], and wraps the whole pipeline in
//! an LRU+TTL cache, per-key request coalescing and bounded
//! exponential-backoff retries.
//!
//! ```no_run
//! use kindling::{HttpContentSource, HttpMarkupSource, PageAssembler, RenderedPage};
//!
//! # async fn run() -> kindling::Result<()> {
//! let assembler: PageAssembler<_, _, RenderedPage> =
//!     PageAssembler::new(HttpContentSource::new()?, HttpMarkupSource::new()?);
//! let page = assembler.get_page(8863, None, false).await?;
//! println!("{} ({} comments)", page.item.title, page.total_comments());
//! # Ok(())
//! # }
//! ```

mod assembler;
mod cache;
mod coalesce;
mod error;
mod models;
mod retry;
mod sources;
mod tree;

pub use assembler::{AssemblerOptions, PageAssembler};
pub use cache::{CacheOptions, PageCache};
pub use coalesce::Coalescer;
pub use error::{ApiError, ErrorKind, Result};
pub use models::{
    Action, ActionKind, ActionSet, AuthToken, Category, ContentNode, ContentTree, ItemKind, Page,
    TopLevelItem, UserProfile,
};
pub use retry::RetryPolicy;
pub use sources::{
    ContentSource, HttpContentSource, HttpMarkupSource, MarkupParser, MarkupSource, RenderedPage,
};
pub use tree::{from_content, from_flat, Comment, CommentColor, FlatComment};
