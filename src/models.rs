//! Domain types: items, users, categories, pages and the action-set model.
//!
//! Everything here is a plain immutable value. A [`Page`] is never mutated in
//! place; executing an action produces a successor `Page` via
//! [`Page::with_applied_action`].

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tree::Comment;

/// Kind of a top-level submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Story,
    Job,
    Poll,
}

/// A story, job or poll as listed on a front page or in search results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLevelItem {
    pub id: u64,
    pub kind: ItemKind,
    pub title: String,
    /// External link, if the submission has one.
    pub url: Option<String>,
    pub author: String,
    pub points: u32,
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
}

/// A user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    pub karma: i64,
    pub about: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The story listings the site serves, each backed by its own id feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Top,
    New,
    Best,
    Ask,
    Show,
    Jobs,
}

impl Category {
    /// Feed name as used by the realtime database endpoints.
    pub fn feed_name(&self) -> &'static str {
        match self {
            Category::Top => "topstories",
            Category::New => "newstories",
            Category::Best => "beststories",
            Category::Ask => "askstories",
            Category::Show => "showstories",
            Category::Jobs => "jobstories",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.feed_name())
    }
}

/// Session cookie value for an authenticated user.
///
/// Opaque to the crate; it is only ever forwarded in the `Cookie` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthToken(String);

impl AuthToken {
    pub fn new(cookie: impl Into<String>) -> Self {
        Self(cookie.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One node of the content tree returned by the search index.
///
/// Correct text and parentage; sibling order and coloring are not
/// authoritative here.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentNode {
    pub id: u64,
    pub author: Option<String>,
    pub text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted: bool,
    pub children: Vec<ContentNode>,
}

/// The full content tree for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentTree {
    pub id: u64,
    pub kind: ItemKind,
    pub title: String,
    pub url: Option<String>,
    pub author: String,
    pub points: u32,
    pub created_at: DateTime<Utc>,
    pub children: Vec<ContentNode>,
}

impl ContentTree {
    /// Project the root of the tree into a [`TopLevelItem`].
    ///
    /// The comment count reflects non-deleted nodes only.
    pub fn item(&self) -> TopLevelItem {
        fn live_count(nodes: &[ContentNode]) -> u32 {
            nodes
                .iter()
                .filter(|n| !n.deleted)
                .map(|n| 1 + live_count(&n.children))
                .sum()
        }
        TopLevelItem {
            id: self.id,
            kind: self.kind,
            title: self.title.clone(),
            url: self.url.clone(),
            author: self.author.clone(),
            points: self.points,
            comment_count: live_count(&self.children),
            created_at: self.created_at,
        }
    }
}

/// The eight voting/flagging operations the rendered page can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Upvote,
    Downvote,
    Unvote,
    Undown,
    Favorite,
    Unfavorite,
    Flag,
    Unflag,
}

impl ActionKind {
    /// The actions that become valid immediately after this one succeeds.
    pub fn inverse_set(&self) -> &'static [ActionKind] {
        use ActionKind::*;
        match self {
            Upvote => &[Unvote],
            Downvote => &[Undown],
            Unvote => &[Upvote, Downvote],
            Undown => &[Upvote, Downvote],
            Favorite => &[Unfavorite],
            Unfavorite => &[Favorite],
            Flag => &[Unflag],
            Unflag => &[Flag],
        }
    }

    /// Whether this kind belongs to the mutually constrained vote family.
    pub fn is_vote(&self) -> bool {
        matches!(
            self,
            ActionKind::Upvote | ActionKind::Downvote | ActionKind::Unvote | ActionKind::Undown
        )
    }

    /// Value of the `how` query parameter on the vote endpoint.
    fn how_param(&self) -> Option<&'static str> {
        match self {
            ActionKind::Upvote => Some("up"),
            ActionKind::Downvote => Some("down"),
            ActionKind::Unvote => Some("un"),
            ActionKind::Undown => Some("undown"),
            _ => None,
        }
    }
}

/// One concrete operation, carrying the exact relative URL that performs it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub item_id: u64,
    pub url: String,
}

impl Action {
    pub fn new(kind: ActionKind, item_id: u64, url: impl Into<String>) -> Self {
        Self {
            kind,
            item_id,
            url: url.into(),
        }
    }

    /// The concrete actions valid after this one succeeds.
    ///
    /// Vote-family inverses reuse the same endpoint with a rewritten `how`
    /// parameter; favorite/flag inverses toggle the `un=t` parameter. The
    /// server issues the same auth nonce for all of them, so the rewrite is
    /// exact.
    pub fn inverse_actions(&self) -> Vec<Action> {
        self.kind
            .inverse_set()
            .iter()
            .map(|&kind| {
                let url = if let Some(how) = kind.how_param() {
                    rewrite_how(&self.url, how)
                } else {
                    toggle_un(&self.url)
                };
                Action::new(kind, self.item_id, url)
            })
            .collect()
    }
}

/// Replace the value of the `how` query parameter.
fn rewrite_how(url: &str, how: &str) -> String {
    match url.find("how=") {
        Some(start) => {
            let value_start = start + 4;
            let value_end = url[value_start..]
                .find('&')
                .map(|i| value_start + i)
                .unwrap_or(url.len());
            format!("{}{}{}", &url[..value_start], how, &url[value_end..])
        }
        None => format!("{url}&how={how}"),
    }
}

/// Add or remove the `un=t` parameter that distinguishes do from undo.
///
/// The parameter can sit anywhere in the query, including first.
fn toggle_un(url: &str) -> String {
    if let Some(stripped) = url.strip_suffix("&un=t") {
        stripped.to_string()
    } else if url.contains("&un=t&") {
        url.replacen("&un=t&", "&", 1)
    } else if url.contains("?un=t&") {
        url.replacen("?un=t&", "?", 1)
    } else {
        format!("{url}&un=t")
    }
}

/// The set of operations currently valid for one item.
///
/// Vote-direction exclusivity is an invariant of this type: applying any
/// vote-family action clears every other vote-family action before the
/// inverse set is inserted, so an upvote can never leave a stale downvote
/// behind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionSet {
    actions: HashMap<ActionKind, Action>,
}

impl ActionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, action: Action) {
        self.actions.insert(action.kind, action);
    }

    pub fn get(&self, kind: ActionKind) -> Option<&Action> {
        self.actions.get(&kind)
    }

    pub fn contains(&self, kind: ActionKind) -> bool {
        self.actions.contains_key(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.values()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Transition the set after `executed` has succeeded against the server.
    pub fn apply(&mut self, executed: &Action) {
        self.actions.remove(&executed.kind);
        if executed.kind.is_vote() {
            use ActionKind::*;
            for kind in [Upvote, Downvote, Unvote, Undown] {
                self.actions.remove(&kind);
            }
        }
        for inverse in executed.inverse_actions() {
            self.actions.insert(inverse.kind, inverse);
        }
    }
}

impl FromIterator<Action> for ActionSet {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut set = ActionSet::new();
        for action in iter {
            set.insert(action);
        }
        set
    }
}

/// A fully assembled discussion page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub item: TopLevelItem,
    /// Top-level comments; nesting lives inside each [`Comment`].
    pub children: Vec<Comment>,
    /// Valid operations per item id (the submission and every comment).
    pub actions: HashMap<u64, ActionSet>,
}

impl Page {
    /// Total number of comments on the page.
    pub fn total_comments(&self) -> usize {
        self.children.iter().map(Comment::comment_count).sum()
    }

    /// The successor page after `executed` has been performed.
    ///
    /// No refetch happens: only the action set for the affected item is
    /// recomputed locally.
    pub fn with_applied_action(&self, executed: &Action) -> Page {
        let mut actions = self.actions.clone();
        actions.entry(executed.item_id).or_default().apply(executed);
        Page {
            item: self.item.clone(),
            children: self.children.clone(),
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upvote(id: u64) -> Action {
        Action::new(
            ActionKind::Upvote,
            id,
            format!("vote?id={id}&how=up&auth=abc123"),
        )
    }

    fn downvote(id: u64) -> Action {
        Action::new(
            ActionKind::Downvote,
            id,
            format!("vote?id={id}&how=down&auth=abc123"),
        )
    }

    #[test]
    fn inverse_sets_are_symmetric_for_toggles() {
        assert_eq!(ActionKind::Upvote.inverse_set(), &[ActionKind::Unvote]);
        assert_eq!(
            ActionKind::Unvote.inverse_set(),
            &[ActionKind::Upvote, ActionKind::Downvote]
        );
        assert_eq!(ActionKind::Favorite.inverse_set(), &[ActionKind::Unfavorite]);
        assert_eq!(ActionKind::Unflag.inverse_set(), &[ActionKind::Flag]);
    }

    #[test]
    fn upvote_inverse_rewrites_how_param() {
        let inverses = upvote(42).inverse_actions();
        assert_eq!(inverses.len(), 1);
        assert_eq!(inverses[0].kind, ActionKind::Unvote);
        assert_eq!(inverses[0].url, "vote?id=42&how=un&auth=abc123");
    }

    #[test]
    fn unvote_inverse_restores_both_directions() {
        let unvote = Action::new(ActionKind::Unvote, 7, "vote?id=7&how=un&auth=x");
        let inverses = unvote.inverse_actions();
        let kinds: Vec<_> = inverses.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Upvote, ActionKind::Downvote]);
        assert_eq!(inverses[0].url, "vote?id=7&how=up&auth=x");
        assert_eq!(inverses[1].url, "vote?id=7&how=down&auth=x");
    }

    #[test]
    fn favorite_inverse_toggles_un_param() {
        let fave = Action::new(ActionKind::Favorite, 9, "fave?id=9&auth=x");
        let unfave = &fave.inverse_actions()[0];
        assert_eq!(unfave.kind, ActionKind::Unfavorite);
        assert_eq!(unfave.url, "fave?id=9&auth=x&un=t");

        let back = &unfave.inverse_actions()[0];
        assert_eq!(back.kind, ActionKind::Favorite);
        assert_eq!(back.url, "fave?id=9&auth=x");
    }

    #[test]
    fn un_param_in_any_position_is_removed_not_duplicated() {
        let unfave = Action::new(ActionKind::Unfavorite, 5, "fave?un=t&id=5&auth=x");
        let fave = &unfave.inverse_actions()[0];
        assert_eq!(fave.kind, ActionKind::Favorite);
        assert_eq!(fave.url, "fave?id=5&auth=x");

        let unflag = Action::new(ActionKind::Unflag, 6, "flag?id=6&un=t&auth=x");
        let flag = &unflag.inverse_actions()[0];
        assert_eq!(flag.url, "flag?id=6&auth=x");
    }

    #[test]
    fn applying_upvote_yields_exactly_its_inverse_set() {
        let mut set: ActionSet = [upvote(1)].into_iter().collect();
        let executed = set.get(ActionKind::Upvote).cloned().unwrap();
        set.apply(&executed);

        assert_eq!(set.len(), 1);
        assert!(set.contains(ActionKind::Unvote));
        assert!(!set.contains(ActionKind::Downvote));
    }

    #[test]
    fn applying_a_vote_clears_the_opposite_direction() {
        let mut set: ActionSet = [upvote(1), downvote(1)].into_iter().collect();
        let executed = set.get(ActionKind::Upvote).cloned().unwrap();
        set.apply(&executed);

        // The stale downvote must not survive the transition.
        assert!(!set.contains(ActionKind::Downvote));
        assert!(set.contains(ActionKind::Unvote));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn applying_unvote_reopens_both_directions() {
        let unvote = Action::new(ActionKind::Unvote, 1, "vote?id=1&how=un&auth=x");
        let mut set: ActionSet = [unvote.clone()].into_iter().collect();
        set.apply(&unvote);

        assert!(set.contains(ActionKind::Upvote));
        assert!(set.contains(ActionKind::Downvote));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn applying_flag_leaves_votes_untouched() {
        let flag = Action::new(ActionKind::Flag, 1, "flag?id=1&auth=x");
        let mut set: ActionSet = [upvote(1), flag.clone()].into_iter().collect();
        set.apply(&flag);

        assert!(set.contains(ActionKind::Upvote));
        assert!(set.contains(ActionKind::Unflag));
        assert!(!set.contains(ActionKind::Flag));
    }

    #[test]
    fn page_update_is_a_new_value() {
        let item = TopLevelItem {
            id: 1,
            kind: ItemKind::Story,
            title: "A story".to_string(),
            url: None,
            author: "pg".to_string(),
            points: 10,
            comment_count: 0,
            created_at: Utc::now(),
        };
        let page = Page {
            item,
            children: Vec::new(),
            actions: HashMap::from([(1, [upvote(1)].into_iter().collect())]),
        };

        let executed = page.actions[&1].get(ActionKind::Upvote).cloned().unwrap();
        let updated = page.with_applied_action(&executed);

        // Original untouched.
        assert!(page.actions[&1].contains(ActionKind::Upvote));
        assert!(updated.actions[&1].contains(ActionKind::Unvote));
        assert!(!updated.actions[&1].contains(ActionKind::Upvote));
    }

    #[test]
    fn content_tree_item_counts_only_live_nodes() {
        let node = |id: u64, deleted: bool, children: Vec<ContentNode>| ContentNode {
            id,
            author: (!deleted).then(|| "user".to_string()),
            text: (!deleted).then(|| "text".to_string()),
            created_at: Utc::now(),
            deleted,
            children,
        };
        let tree = ContentTree {
            id: 1,
            kind: ItemKind::Story,
            title: "t".to_string(),
            url: None,
            author: "a".to_string(),
            points: 1,
            created_at: Utc::now(),
            children: vec![
                node(2, false, vec![node(3, true, vec![]), node(4, false, vec![])]),
                node(5, true, vec![]),
            ],
        };
        assert_eq!(tree.item().comment_count, 2);
    }

    #[test]
    fn category_feed_names() {
        assert_eq!(Category::Top.feed_name(), "topstories");
        assert_eq!(Category::Jobs.feed_name(), "jobstories");
        assert_eq!(Category::Ask.to_string(), "askstories");
    }
}
