//! In-memory cache for assembled data.
//!
//! Six independent collections — items, pages, users, category id lists,
//! search results and comment trees — each with its own LRU bound and a
//! shared TTL. The whole cache behaves as one serialized actor: every public
//! method locks the single internal mutex for the duration of its
//! bookkeeping, and the lock is never held across I/O.

mod store;

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;

use crate::models::{Category, Page, TopLevelItem, UserProfile};
use crate::tree::Comment;

use store::Store;

/// Default TTL shared by all collections.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Construction-time bounds for the six collections.
///
/// `ttl` of `None` disables age-based expiry entirely; entries then only
/// leave under LRU pressure or an explicit [`PageCache::clear`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    pub ttl: Option<Duration>,
    pub max_items: usize,
    pub max_pages: usize,
    pub max_users: usize,
    pub max_category_lists: usize,
    pub max_search_results: usize,
    pub max_comment_trees: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL),
            max_items: 500,
            max_pages: 50,
            max_users: 100,
            max_category_lists: 10,
            max_search_results: 50,
            max_comment_trees: 50,
        }
    }
}

struct Collections {
    items: Store<u64, TopLevelItem>,
    pages: Store<u64, Page>,
    users: Store<String, UserProfile>,
    category_ids: Store<Category, Vec<u64>>,
    search_results: Store<String, Vec<TopLevelItem>>,
    comment_trees: Store<u64, Vec<Comment>>,
}

/// The process-wide cache, one mutual-exclusion domain for all collections.
pub struct PageCache {
    inner: Mutex<Collections>,
}

impl PageCache {
    pub fn new(options: CacheOptions) -> Self {
        let ttl = options.ttl;
        Self {
            inner: Mutex::new(Collections {
                items: Store::new(options.max_items, ttl),
                pages: Store::new(options.max_pages, ttl),
                users: Store::new(options.max_users, ttl),
                category_ids: Store::new(options.max_category_lists, ttl),
                search_results: Store::new(options.max_search_results, ttl),
                comment_trees: Store::new(options.max_comment_trees, ttl),
            }),
        }
    }

    pub async fn get_item(&self, id: u64) -> Option<TopLevelItem> {
        self.inner.lock().await.items.get(&id)
    }

    pub async fn set_item(&self, item: TopLevelItem) {
        self.inner.lock().await.items.insert(item.id, item);
    }

    /// Best-effort batch lookup: stale or missing ids are simply omitted.
    pub async fn get_items(&self, ids: &[u64]) -> HashMap<u64, TopLevelItem> {
        let mut inner = self.inner.lock().await;
        ids.iter()
            .filter_map(|&id| inner.items.get(&id).map(|item| (id, item)))
            .collect()
    }

    pub async fn set_items(&self, items: Vec<TopLevelItem>) {
        let mut inner = self.inner.lock().await;
        for item in items {
            inner.items.insert(item.id, item);
        }
    }

    pub async fn get_page(&self, id: u64) -> Option<Page> {
        self.inner.lock().await.pages.get(&id)
    }

    pub async fn set_page(&self, page: Page) {
        self.inner.lock().await.pages.insert(page.item.id, page);
    }

    pub async fn get_user(&self, username: &str) -> Option<UserProfile> {
        self.inner.lock().await.users.get(&username.to_string())
    }

    pub async fn set_user(&self, user: UserProfile) {
        self.inner
            .lock()
            .await
            .users
            .insert(user.username.clone(), user);
    }

    pub async fn get_category_ids(&self, category: Category) -> Option<Vec<u64>> {
        self.inner.lock().await.category_ids.get(&category)
    }

    pub async fn set_category_ids(&self, category: Category, ids: Vec<u64>) {
        self.inner.lock().await.category_ids.insert(category, ids);
    }

    pub async fn get_search_results(&self, query: &str) -> Option<Vec<TopLevelItem>> {
        self.inner
            .lock()
            .await
            .search_results
            .get(&query.to_string())
    }

    pub async fn set_search_results(&self, query: &str, results: Vec<TopLevelItem>) {
        self.inner
            .lock()
            .await
            .search_results
            .insert(query.to_string(), results);
    }

    pub async fn get_comment_tree(&self, id: u64) -> Option<Vec<Comment>> {
        self.inner.lock().await.comment_trees.get(&id)
    }

    pub async fn set_comment_tree(&self, id: u64, tree: Vec<Comment>) {
        self.inner.lock().await.comment_trees.insert(id, tree);
    }

    /// Empty all six collections unconditionally.
    ///
    /// Used for invalidation on logout or a manual refresh, never on a timer.
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.items.clear();
        inner.pages.clear();
        inner.users.clear();
        inner.category_ids.clear();
        inner.search_results.clear();
        inner.comment_trees.clear();
        debug!("cache cleared");
    }

    #[cfg(test)]
    async fn item_count(&self) -> usize {
        self.inner.lock().await.items.len()
    }
}
