//! Scraper-backed parser for rendered discussion pages.
//!
//! All extraction happens eagerly in `parse`; the document is discarded
//! afterwards. The anchors this parser navigates by:
//!
//! - `table.fatitem` — the submission block; its absence means the document
//!   is not a discussion page at all and fails structurally.
//! - `tr.comtr` rows — one per comment, id attribute carrying the comment
//!   id, `.ind` carrying the indent depth, `.commtext` carrying body text
//!   and the fade-class color. Rows without author or body are deleted
//!   placeholders and are omitted everywhere.
//! - `vote?` / `fave?` / `flag?` anchors — the action affordances, present
//!   only when the server rendered them for the requesting account.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{ApiError, Result};
use crate::models::{Action, ActionKind, ActionSet};
use crate::tree::{CommentColor, FlatComment};

use super::MarkupParser;

static FATITEM: Lazy<Selector> = Lazy::new(|| sel("table.fatitem"));
static COMMENT_ROW: Lazy<Selector> = Lazy::new(|| sel("tr.comtr"));
static INDENT: Lazy<Selector> = Lazy::new(|| sel(".ind"));
static INDENT_IMG: Lazy<Selector> = Lazy::new(|| sel(".ind img"));
static USER: Lazy<Selector> = Lazy::new(|| sel(".hnuser"));
static AGE: Lazy<Selector> = Lazy::new(|| sel(".age"));
static COMMENT_TEXT: Lazy<Selector> = Lazy::new(|| sel(".commtext"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| sel("a[href]"));

fn sel(selector: &str) -> Selector {
    Selector::parse(selector).expect("static selector is valid")
}

/// One rendered page, reduced to the four projections the assembler needs.
#[derive(Debug)]
pub struct RenderedPage {
    order: Vec<u64>,
    colors: HashMap<u64, CommentColor>,
    actions: HashMap<u64, ActionSet>,
    flat: Vec<FlatComment>,
}

impl MarkupParser for RenderedPage {
    fn parse(document: &str) -> Result<Self> {
        let html = Html::parse_document(document);
        if html.select(&FATITEM).next().is_none() {
            return Err(ApiError::StructuralParse(
                "document has no item table".to_string(),
            ));
        }

        let mut order = Vec::new();
        let mut colors = HashMap::new();
        let mut flat = Vec::new();

        for row in html.select(&COMMENT_ROW) {
            let Some(id) = row.value().attr("id").and_then(|id| id.parse().ok()) else {
                continue;
            };
            let Some(comment) = parse_comment_row(id, row) else {
                // Deleted or flagged placeholder: no tree slot anywhere.
                debug!(id, "skipping deleted comment row");
                continue;
            };
            order.push(id);
            colors.insert(id, comment.color);
            flat.push(comment);
        }

        Ok(Self {
            order,
            colors,
            actions: parse_actions(&html),
            flat,
        })
    }

    fn true_comment_order(&self) -> &[u64] {
        &self.order
    }

    fn comment_colors(&self) -> &HashMap<u64, CommentColor> {
        &self.colors
    }

    fn available_actions(&self) -> &HashMap<u64, ActionSet> {
        &self.actions
    }

    fn flat_comments(&self) -> &[FlatComment] {
        &self.flat
    }
}

fn parse_comment_row(id: u64, row: ElementRef<'_>) -> Option<FlatComment> {
    let author = row.select(&USER).next()?.text().collect::<String>();
    let text_el = row.select(&COMMENT_TEXT).next()?;
    let body = text_el.text().collect::<String>().trim().to_string();
    let color = text_el
        .value()
        .classes()
        .find_map(CommentColor::from_class)
        .unwrap_or_default();
    Some(FlatComment {
        id,
        author,
        body,
        created_at: parse_age(row),
        depth: parse_depth(row),
        color,
    })
}

/// Indent depth of a comment row.
///
/// Current markup carries an `indent` attribute on the `.ind` cell; older
/// markup encodes depth as a spacer image of `depth * 40` pixels.
fn parse_depth(row: ElementRef<'_>) -> usize {
    if let Some(depth) = row
        .select(&INDENT)
        .next()
        .and_then(|el| el.value().attr("indent"))
        .and_then(|indent| indent.parse().ok())
    {
        return depth;
    }
    row.select(&INDENT_IMG)
        .next()
        .and_then(|img| img.value().attr("width"))
        .and_then(|width| width.parse::<usize>().ok())
        .map(|width| width / 40)
        .unwrap_or(0)
}

/// Timestamp from the `.age` cell's title attribute.
///
/// The title holds `<iso> <unix>` in current markup, bare ISO in older
/// markup. Unparseable ages fall back to the epoch rather than failing the
/// whole page.
fn parse_age(row: ElementRef<'_>) -> DateTime<Utc> {
    let Some(title) = row
        .select(&AGE)
        .next()
        .and_then(|el| el.value().attr("title"))
    else {
        return DateTime::UNIX_EPOCH;
    };
    let mut tokens = title.split_whitespace();
    let iso = tokens.next().unwrap_or_default();
    if let Some(unix) = tokens.next().and_then(|t| t.parse::<i64>().ok()) {
        if let Some(ts) = DateTime::from_timestamp(unix, 0) {
            return ts;
        }
    }
    NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%S")
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Collect every action affordance on the page, keyed by item id.
fn parse_actions(html: &Html) -> HashMap<u64, ActionSet> {
    let mut actions: HashMap<u64, ActionSet> = HashMap::new();
    for anchor in html.select(&ANCHOR) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some((kind, item_id)) = classify_action(href) else {
            continue;
        };
        actions
            .entry(item_id)
            .or_default()
            .insert(Action::new(kind, item_id, href));
    }
    actions
}

fn classify_action(href: &str) -> Option<(ActionKind, u64)> {
    let (endpoint, query) = href.split_once('?')?;
    let item_id: u64 = query_param(query, "id")?.parse().ok()?;
    let undo = query_param(query, "un") == Some("t");
    let kind = match endpoint {
        "vote" => match query_param(query, "how")? {
            "up" => ActionKind::Upvote,
            "down" => ActionKind::Downvote,
            "un" => ActionKind::Unvote,
            "undown" => ActionKind::Undown,
            _ => return None,
        },
        "fave" => {
            if undo {
                ActionKind::Unfavorite
            } else {
                ActionKind::Favorite
            }
        }
        "flag" => {
            if undo {
                ActionKind::Unflag
            } else {
                ActionKind::Flag
            }
        }
        _ => return None,
    };
    Some((kind, item_id))
}

fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><center><table id="hnmain">
      <table class="fatitem">
        <tr class="athing" id="100">
          <td class="title"><span class="titleline">
            <a href="https://example.com/post">An interesting story</a>
          </span></td>
        </tr>
        <tr><td class="subtext">
          <span class="score" id="score_100">42 points</span> by
          <a href="user?id=pg" class="hnuser">pg</a>
          <span class="age" title="2024-03-15T12:00:00 1710504000"><a href="item?id=100">3 hours ago</a></span>
          <a href="vote?id=100&amp;how=up&amp;auth=deadbeef&amp;goto=news">upvote</a>
          <a href="fave?id=100&amp;auth=deadbeef">favorite</a>
          <a href="flag?id=100&amp;auth=deadbeef">flag</a>
        </td></tr>
      </table>
      <table class="comment-tree">
        <tr class="athing comtr" id="1">
          <td><table><tr>
            <td class="ind" indent="0"><img src="s.gif" height="1" width="0"></td>
            <td class="votelinks"><a id="up_1" href="vote?id=1&amp;how=up&amp;auth=deadbeef">up</a></td>
            <td class="default">
              <a href="user?id=alice" class="hnuser">alice</a>
              <span class="age" title="2024-03-15T13:00:00 1710507600"><a href="item?id=1">2 hours ago</a></span>
              <div class="comment"><span class="commtext c00">First comment</span></div>
            </td>
          </tr></table></td>
        </tr>
        <tr class="athing comtr" id="2">
          <td><table><tr>
            <td class="ind" indent="1"><img src="s.gif" height="1" width="40"></td>
            <td class="votelinks">
              <a id="up_2" href="vote?id=2&amp;how=up&amp;auth=deadbeef">up</a>
              <a id="down_2" href="vote?id=2&amp;how=down&amp;auth=deadbeef">down</a>
            </td>
            <td class="default">
              <a href="user?id=bob" class="hnuser">bob</a>
              <span class="age" title="2024-03-15T13:30:00 1710509400"><a href="item?id=2">90 minutes ago</a></span>
              <div class="comment"><span class="commtext c5a">A faded reply</span></div>
            </td>
          </tr></table></td>
        </tr>
        <tr class="athing comtr" id="3">
          <td><table><tr>
            <td class="ind" indent="1"></td>
            <td class="default"><div class="comment">[deleted]</div></td>
          </tr></table></td>
        </tr>
        <tr class="athing comtr" id="4">
          <td><table><tr>
            <td class="ind" indent="0"></td>
            <td class="default">
              <a href="user?id=carol" class="hnuser">carol</a>
              <span class="age" title="2024-03-15T14:00:00 1710511200"><a href="item?id=4">1 hour ago</a></span>
              <div class="comment"><span class="commtext c00">Second thread</span></div>
            </td>
          </tr></table></td>
        </tr>
      </table>
    </table></center></body></html>"#;

    #[test]
    fn true_order_lists_live_comments_in_document_order() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        assert_eq!(page.true_comment_order(), &[1, 2, 4]);
    }

    #[test]
    fn deleted_rows_leave_no_trace() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        assert!(!page.comment_colors().contains_key(&3));
        assert!(page.flat_comments().iter().all(|c| c.id != 3));
    }

    #[test]
    fn colors_map_fade_classes() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        assert_eq!(page.comment_colors()[&1], CommentColor::C00);
        assert_eq!(page.comment_colors()[&2], CommentColor::C5a);
    }

    #[test]
    fn flat_comments_carry_depth_author_and_body() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        let flat = page.flat_comments();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].depth, 0);
        assert_eq!(flat[0].author, "alice");
        assert_eq!(flat[0].body, "First comment");
        assert_eq!(flat[1].depth, 1);
        assert_eq!(flat[2].depth, 0);
    }

    #[test]
    fn timestamps_prefer_the_unix_component() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        let expected = DateTime::from_timestamp(1710507600, 0).expect("timestamp");
        assert_eq!(page.flat_comments()[0].created_at, expected);
    }

    #[test]
    fn actions_collected_per_item() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        let story = &page.available_actions()[&100];
        assert!(story.contains(ActionKind::Upvote));
        assert!(story.contains(ActionKind::Favorite));
        assert!(story.contains(ActionKind::Flag));

        let reply = &page.available_actions()[&2];
        assert!(reply.contains(ActionKind::Upvote));
        assert!(reply.contains(ActionKind::Downvote));

        let first = &page.available_actions()[&1];
        assert!(first.contains(ActionKind::Upvote));
        assert!(!first.contains(ActionKind::Downvote));
    }

    #[test]
    fn action_urls_survive_entity_decoding() {
        let page = RenderedPage::parse(PAGE).expect("parse");
        let up = page.available_actions()[&100]
            .get(ActionKind::Upvote)
            .expect("upvote");
        assert_eq!(up.url, "vote?id=100&how=up&auth=deadbeef&goto=news");
    }

    #[test]
    fn fave_with_un_param_is_unfavorite() {
        assert_eq!(
            classify_action("fave?id=5&auth=x&un=t"),
            Some((ActionKind::Unfavorite, 5))
        );
        assert_eq!(
            classify_action("flag?id=5&auth=x"),
            Some((ActionKind::Flag, 5))
        );
        assert_eq!(classify_action("hide?id=5&auth=x"), None);
        assert_eq!(classify_action("vote?id=5&how=sideways"), None);
    }

    #[test]
    fn spacer_image_width_falls_back_as_depth() {
        let html = PAGE.replace(r#"class="ind" indent="1""#, r#"class="ind""#);
        let page = RenderedPage::parse(&html).expect("parse");
        // Comment 2 still reports depth 1 from its 40px spacer.
        assert_eq!(page.flat_comments()[1].depth, 1);
    }

    #[test]
    fn document_without_item_table_fails_structurally() {
        let err = RenderedPage::parse("<html><body>Login required</body></html>")
            .expect_err("must fail");
        assert!(matches!(err, ApiError::StructuralParse(_)));
    }
}
