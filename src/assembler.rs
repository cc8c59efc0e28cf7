//! Page assembly: the orchestrator tying cache, coalescer, retry policy and
//! tree building to the two backend sources.
//!
//! Per page request the terminal states are served-from-cache, served-fresh,
//! or failed. On a miss the content-tree fetch and the rendered-markup fetch
//! fan out concurrently; each is individually coalesced with any other
//! caller asking for the same resource and retried under the configured
//! policy. Reconciliation starts only once both have settled.

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::cache::{CacheOptions, PageCache};
use crate::coalesce::Coalescer;
use crate::error::{ErrorKind, Result};
use crate::models::{Action, AuthToken, Category, ContentTree, Page, TopLevelItem, UserProfile};
use crate::retry::RetryPolicy;
use crate::sources::{ContentSource, MarkupParser, MarkupSource};
use crate::tree;

/// Construction-time configuration for a [`PageAssembler`].
#[derive(Debug, Clone, Default)]
pub struct AssemblerOptions {
    pub cache: CacheOptions,
    pub retry: RetryPolicy,
    /// Skip the content-tree source entirely and build pages from markup
    /// alone, falling back to reconciliation when the markup turns out not
    /// to be parseable as a discussion page.
    pub markup_only: bool,
}

/// The façade application code talks to.
///
/// Generic over the two backend sources and the markup parser so tests can
/// substitute mocks; production wiring is
/// `PageAssembler<HttpContentSource, HttpMarkupSource, RenderedPage>`.
pub struct PageAssembler<C, M, P> {
    content: Arc<C>,
    markup: Arc<M>,
    cache: PageCache,
    retry: RetryPolicy,
    markup_only: bool,
    trees: Coalescer<u64, ContentTree>,
    /// Rendered documents, keyed by (item id, authenticated) so an
    /// anonymous in-flight fetch is never handed to an authenticated caller.
    documents: Coalescer<(u64, bool), String>,
    items: Coalescer<u64, TopLevelItem>,
    users: Coalescer<String, UserProfile>,
    feeds: Coalescer<Category, Vec<u64>>,
    searches: Coalescer<String, Vec<TopLevelItem>>,
    _parser: PhantomData<fn() -> P>,
}

impl<C, M, P> PageAssembler<C, M, P>
where
    C: ContentSource + 'static,
    M: MarkupSource + 'static,
    P: MarkupParser,
{
    pub fn new(content: C, markup: M) -> Self {
        Self::with_options(content, markup, AssemblerOptions::default())
    }

    pub fn with_options(content: C, markup: M, options: AssemblerOptions) -> Self {
        Self {
            content: Arc::new(content),
            markup: Arc::new(markup),
            cache: PageCache::new(options.cache),
            retry: options.retry,
            markup_only: options.markup_only,
            trees: Coalescer::new(),
            documents: Coalescer::new(),
            items: Coalescer::new(),
            users: Coalescer::new(),
            feeds: Coalescer::new(),
            searches: Coalescer::new(),
            _parser: PhantomData,
        }
    }

    /// Fetch a batch of items, best-effort: ids that fail individually are
    /// omitted from the result rather than failing the whole batch.
    pub async fn get_items(&self, ids: &[u64]) -> Vec<TopLevelItem> {
        let mut found = self.cache.get_items(ids).await;
        let missing: Vec<u64> = ids
            .iter()
            .copied()
            .filter(|id| !found.contains_key(id))
            .collect();

        let fetched = join_all(
            missing
                .iter()
                .map(|&id| async move { (id, self.fetch_item(id).await) }),
        )
        .await;
        for (id, result) in fetched {
            match result {
                Ok(item) => {
                    self.cache.set_item(item.clone()).await;
                    found.insert(id, item);
                }
                Err(err) => warn!(id, error = %err, "omitting failed item from batch"),
            }
        }
        ids.iter().filter_map(|id| found.remove(id)).collect()
    }

    /// Assemble the discussion page for one item.
    ///
    /// Authenticated calls never trust the full-page cache, since available
    /// actions are account-specific; the comment tree is reused either way.
    pub async fn get_page(
        &self,
        id: u64,
        token: Option<&AuthToken>,
        force_refresh: bool,
    ) -> Result<Page> {
        if !force_refresh && token.is_none() {
            if let Some(page) = self.cache.get_page(id).await {
                debug!(id, "page served from cache");
                return Ok(page);
            }
        }

        let use_tree_cache = !force_refresh;
        let page = if self.markup_only {
            match self.markup_only_page(id, token).await {
                Err(err) if err.kind() == ErrorKind::StructuralParse => {
                    warn!(id, error = %err, "markup-only build failed, reconciling instead");
                    self.reconciled_page(id, token, use_tree_cache).await?
                }
                result => result?,
            }
        } else {
            self.reconciled_page(id, token, use_tree_cache).await?
        };

        // The tree is account-agnostic and worth keeping regardless; the
        // full page carries actions and is only cached anonymously.
        self.cache.set_comment_tree(id, page.children.clone()).await;
        if token.is_none() {
            self.cache.set_page(page.clone()).await;
        }
        debug!(id, comments = page.total_comments(), "page served fresh");
        Ok(page)
    }

    /// Perform an action and return the successor page.
    ///
    /// Never refetches: the action set for the affected item is recomputed
    /// locally from the executed action's inverse set. The network call is
    /// side-effecting and not idempotent, so it runs exactly once.
    pub async fn execute_action(
        &self,
        action: &Action,
        token: &AuthToken,
        page: &Page,
    ) -> Result<Page> {
        self.markup.execute_action(&action.url, token).await?;
        debug!(item = action.item_id, kind = ?action.kind, "action executed");
        Ok(page.with_applied_action(action))
    }

    /// The items of one category feed, best-effort like [`Self::get_items`].
    pub async fn get_category(&self, category: Category) -> Result<Vec<TopLevelItem>> {
        let ids = match self.cache.get_category_ids(category).await {
            Some(ids) => ids,
            None => {
                let content = Arc::clone(&self.content);
                let retry = self.retry.clone();
                let ids = self
                    .feeds
                    .fetch(category, move || async move {
                        retry.run(|| content.fetch_ids_for_category(category)).await
                    })
                    .await?;
                self.cache.set_category_ids(category, ids.clone()).await;
                ids
            }
        };
        Ok(self.get_items(&ids).await)
    }

    /// Full-text search, cached per query string.
    pub async fn search(&self, query: &str) -> Result<Vec<TopLevelItem>> {
        if let Some(results) = self.cache.get_search_results(query).await {
            debug!(query, "search served from cache");
            return Ok(results);
        }
        let content = Arc::clone(&self.content);
        let retry = self.retry.clone();
        let owned = query.to_string();
        let results = self
            .searches
            .fetch(query.to_string(), move || async move {
                retry.run(|| content.search(&owned)).await
            })
            .await?;
        self.cache.set_search_results(query, results.clone()).await;
        self.cache.set_items(results.clone()).await;
        Ok(results)
    }

    pub async fn get_user(&self, username: &str) -> Result<UserProfile> {
        if let Some(user) = self.cache.get_user(username).await {
            return Ok(user);
        }
        let content = Arc::clone(&self.content);
        let retry = self.retry.clone();
        let owned = username.to_string();
        let user = self
            .users
            .fetch(username.to_string(), move || async move {
                retry.run(|| content.fetch_user(&owned)).await
            })
            .await?;
        self.cache.set_user(user.clone()).await;
        Ok(user)
    }

    /// Drop every cached value; used on logout or manual refresh.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    /// Full reconciliation: content tree for structure and text, markup for
    /// order, color and actions.
    async fn reconciled_page(
        &self,
        id: u64,
        token: Option<&AuthToken>,
        use_tree_cache: bool,
    ) -> Result<Page> {
        if use_tree_cache {
            if let Some(children) = self.cache.get_comment_tree(id).await {
                // Only the affordances are missing; one fetch suffices.
                debug!(id, "comment tree served from cache");
                let document = self.fetch_document(id, token).await?;
                let parsed = P::parse(&document)?;
                let item = self.item_for(id).await?;
                return Ok(Page {
                    item,
                    children,
                    actions: parsed.available_actions().clone(),
                });
            }
        }

        let (tree, document) =
            tokio::join!(self.fetch_tree(id), self.fetch_document(id, token));
        let (tree, document) = (tree?, document?);
        let parsed = P::parse(&document)?;
        let children = tree::from_content(
            &tree.children,
            parsed.true_comment_order(),
            parsed.comment_colors(),
        );
        let item = tree.item();
        self.cache.set_item(item.clone()).await;
        Ok(Page {
            item,
            children,
            actions: parsed.available_actions().clone(),
        })
    }

    /// Fast path: build the whole page from markup alone.
    async fn markup_only_page(&self, id: u64, token: Option<&AuthToken>) -> Result<Page> {
        let document = self.fetch_document(id, token).await?;
        let parsed = P::parse(&document)?;
        let children = tree::from_flat(parsed.flat_comments().to_vec());
        let item = self.item_for(id).await?;
        Ok(Page {
            item,
            children,
            actions: parsed.available_actions().clone(),
        })
    }

    async fn item_for(&self, id: u64) -> Result<TopLevelItem> {
        if let Some(item) = self.cache.get_item(id).await {
            return Ok(item);
        }
        let item = self.fetch_item(id).await?;
        self.cache.set_item(item.clone()).await;
        Ok(item)
    }

    async fn fetch_item(&self, id: u64) -> Result<TopLevelItem> {
        let content = Arc::clone(&self.content);
        let retry = self.retry.clone();
        self.items
            .fetch(id, move || async move {
                retry.run(|| content.fetch_single(id)).await
            })
            .await
    }

    async fn fetch_tree(&self, id: u64) -> Result<ContentTree> {
        let content = Arc::clone(&self.content);
        let retry = self.retry.clone();
        self.trees
            .fetch(id, move || async move {
                retry.run(|| content.fetch_tree(id)).await
            })
            .await
    }

    async fn fetch_document(&self, id: u64, token: Option<&AuthToken>) -> Result<String> {
        let markup = Arc::clone(&self.markup);
        let retry = self.retry.clone();
        let token = token.cloned();
        self.documents
            .fetch((id, token.is_some()), move || async move {
                retry
                    .run(|| markup.fetch_rendered_page(id, token.as_ref()))
                    .await
            })
            .await
    }
}
