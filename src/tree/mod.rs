//! Comment tree reconstruction.
//!
//! The two backends disagree about comment threads: the search index returns
//! the correct nesting and text but stale sibling order and no coloring,
//! while the rendered page carries the authoritative top-to-bottom order and
//! per-comment color but no clean tree structure. This module owns both ways
//! of resolving that disagreement:
//!
//! - [`from_content`] reconciles a content tree against the true document
//!   order and color map derived from markup.
//! - [`from_flat`] rebuilds nesting from a flat, depth-annotated sequence of
//!   comments in document order, using a single linear pass over an explicit
//!   depth stack.
//!
//! Deleted entries never enter a tree: content nodes marked deleted are
//! dropped (with their subtree) before reconciliation, and the markup parser
//! omits deleted rows before flat building.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::ContentNode;

/// The ten fade buckets the site renders comment text in.
///
/// `C00` is full-contrast text; the remaining buckets fade progressively and
/// signal downvoted comments. Named after the CSS classes on `.commtext`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommentColor {
    #[default]
    C00,
    C5a,
    C73,
    C82,
    C88,
    C9c,
    Cae,
    Cbe,
    Cce,
    Cdd,
}

impl CommentColor {
    /// Map a `.commtext` CSS class to its bucket.
    pub fn from_class(class: &str) -> Option<Self> {
        match class {
            "c00" => Some(CommentColor::C00),
            "c5a" => Some(CommentColor::C5a),
            "c73" => Some(CommentColor::C73),
            "c82" => Some(CommentColor::C82),
            "c88" => Some(CommentColor::C88),
            "c9c" => Some(CommentColor::C9c),
            "cae" => Some(CommentColor::Cae),
            "cbe" => Some(CommentColor::Cbe),
            "cce" => Some(CommentColor::Cce),
            "cdd" => Some(CommentColor::Cdd),
            _ => None,
        }
    }
}

/// One comment in an assembled thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub author: String,
    pub body: String,
    pub color: CommentColor,
    /// Replies, in canonical document order.
    pub children: Vec<Comment>,
    pub is_deleted: bool,
}

impl Comment {
    /// This comment plus all of its descendants.
    pub fn comment_count(&self) -> usize {
        1 + self.children.iter().map(Comment::comment_count).sum::<usize>()
    }
}

/// Intermediate representation used only during HTML-only parsing.
///
/// `depth` is the number of ancestor indent levels; zero always starts a new
/// root thread.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatComment {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub depth: usize,
    pub color: CommentColor,
}

/// Reconcile a content tree with the ordering and coloring derived from the
/// rendered page.
///
/// Every sibling list is re-sorted by each node's index in `order`; ids
/// absent from `order` (newly arrived or desynced) sort last, keeping their
/// original relative order. Colors are looked up page-globally, defaulting to
/// [`CommentColor::C00`]. Nodes marked deleted are dropped together with
/// their subtree.
pub fn from_content(
    nodes: &[ContentNode],
    order: &[u64],
    colors: &HashMap<u64, CommentColor>,
) -> Vec<Comment> {
    let rank: HashMap<u64, usize> = order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    reconcile_siblings(nodes, &rank, colors)
}

fn reconcile_siblings(
    nodes: &[ContentNode],
    rank: &HashMap<u64, usize>,
    colors: &HashMap<u64, CommentColor>,
) -> Vec<Comment> {
    let mut comments: Vec<Comment> = nodes
        .iter()
        .filter(|node| !node.deleted)
        .map(|node| Comment {
            id: node.id,
            created_at: node.created_at,
            author: node.author.clone().unwrap_or_default(),
            body: node.text.clone().unwrap_or_default(),
            color: colors.get(&node.id).copied().unwrap_or_default(),
            children: reconcile_siblings(&node.children, rank, colors),
            is_deleted: false,
        })
        .collect();
    // Stable sort: unranked siblings keep their relative order at the end.
    comments.sort_by_key(|c| rank.get(&c.id).copied().unwrap_or(usize::MAX));
    comments
}

/// Rebuild nesting from a flat sequence in document order.
///
/// Single linear pass over a stack of `(comment, depth)` pairs forming the
/// right-edge path from a root to the last-placed node. Each new entry pops
/// and attaches every stacked entry at its depth or deeper, then pushes
/// itself. A depth that jumps more than one level past the current path is
/// clamped to the stack depth instead of being trusted.
pub fn from_flat(flat: Vec<FlatComment>) -> Vec<Comment> {
    let mut roots: Vec<Comment> = Vec::new();
    let mut stack: Vec<(Comment, usize)> = Vec::new();

    for entry in flat {
        pop_to_depth(&mut stack, &mut roots, entry.depth);
        let depth = entry.depth.min(stack.len());
        let comment = Comment {
            id: entry.id,
            created_at: entry.created_at,
            author: entry.author,
            body: entry.body,
            color: entry.color,
            children: Vec::new(),
            is_deleted: false,
        };
        stack.push((comment, depth));
    }
    pop_to_depth(&mut stack, &mut roots, 0);
    roots
}

/// Pop every stacked entry at `depth` or deeper, attaching each to the entry
/// beneath it (or to the root list when the stack empties).
fn pop_to_depth(stack: &mut Vec<(Comment, usize)>, roots: &mut Vec<Comment>, depth: usize) {
    while stack.last().is_some_and(|(_, d)| *d >= depth) {
        let (node, _) = stack.pop().expect("stack checked non-empty");
        match stack.last_mut() {
            Some((parent, _)) => parent.children.push(node),
            None => roots.push(node),
        }
    }
}
