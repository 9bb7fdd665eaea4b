//! Turns the flat comment list of a post into display order.
//!
//! Roots are comments without a parent, or whose parent is not in the set.
//! Replies are grouped under their root and shown behind a toggle marker.
//! In [`SortMode::Top`] the root ranking is computed once and then frozen:
//! later snapshots never reorder it, new roots are appended after it until
//! [`ThreadAssembler::refresh_ranking`] is called.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::models::Comment;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    #[default]
    Newest,
    Top,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ThreadEntry {
    Comment {
        comment: Comment,
        is_reply: bool,
    },
    Toggle {
        root_id: String,
        reply_count: usize,
        expanded: bool,
    },
}

pub fn top_score(like_count: u64, reply_count: usize) -> u64 {
    like_count * 2 + reply_count as u64
}

#[derive(Debug, Default)]
pub struct ThreadAssembler {
    mode: SortMode,
    frozen: Option<Vec<String>>,
    expanded: HashSet<String>,
}

impl ThreadAssembler {
    pub fn new(mode: SortMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn mode(&self) -> SortMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SortMode) {
        if self.mode != mode {
            self.mode = mode;
            self.frozen = None;
        }
    }

    /// Drops the frozen ranking; the next `assemble` ranks again.
    pub fn refresh_ranking(&mut self) {
        self.frozen = None;
    }

    pub fn is_expanded(&self, root_id: &str) -> bool {
        self.expanded.contains(root_id)
    }

    pub fn expand(&mut self, root_id: &str) {
        self.expanded.insert(root_id.to_string());
    }

    /// Returns the new expanded state.
    pub fn toggle_expanded(&mut self, root_id: &str) -> bool {
        if self.expanded.remove(root_id) {
            false
        } else {
            self.expanded.insert(root_id.to_string());
            true
        }
    }

    /// Orders `comments` for display. In top mode the first non-empty set of
    /// roots fixes the ranking.
    pub fn assemble(&mut self, comments: &[Comment]) -> Vec<ThreadEntry> {
        let part = partition(comments);
        if self.mode == SortMode::Top && self.frozen.is_none() && !part.roots.is_empty() {
            self.frozen = Some(rank(&part.roots, &part.replies));
        }
        self.emit(&part, comments.len())
    }

    /// Same ordering as [`assemble`](Self::assemble), but never freezes a ranking.
    pub fn preview(&self, comments: &[Comment]) -> Vec<ThreadEntry> {
        self.emit(&partition(comments), comments.len())
    }

    fn emit(&self, part: &Partition<'_>, capacity: usize) -> Vec<ThreadEntry> {
        let ordered = match (self.mode, &self.frozen) {
            (SortMode::Newest, _) => part.roots.clone(),
            (SortMode::Top, Some(frozen)) => order_roots(&part.roots, frozen),
            (SortMode::Top, None) => order_roots(&part.roots, &rank(&part.roots, &part.replies)),
        };

        let mut entries = Vec::with_capacity(capacity + ordered.len());
        for root in ordered {
            entries.push(ThreadEntry::Comment {
                comment: root.clone(),
                is_reply: false,
            });
            let Some(group) = part.replies.get(root.id.as_str()) else {
                continue;
            };
            let expanded = self.expanded.contains(&root.id);
            entries.push(ThreadEntry::Toggle {
                root_id: root.id.clone(),
                reply_count: group.len(),
                expanded,
            });
            if expanded {
                entries.extend(group.iter().map(|r| ThreadEntry::Comment {
                    comment: (*r).clone(),
                    is_reply: true,
                }));
            }
        }
        entries
    }
}

/// Id of the root `comment_id` displays under, its own id when it displays
/// as a root. `None` when the comment is not in the set.
pub fn display_root<'a>(comments: &'a [Comment], comment_id: &str) -> Option<&'a str> {
    let by_id: HashMap<&str, &Comment> = comments.iter().map(|c| (c.id.as_str(), c)).collect();
    let comment = by_id.get(comment_id).copied()?;
    Some(resolve_root(comment, &by_id).unwrap_or(comment.id.as_str()))
}

struct Partition<'a> {
    roots: Vec<&'a Comment>,
    replies: HashMap<&'a str, Vec<&'a Comment>>,
}

fn partition(comments: &[Comment]) -> Partition<'_> {
    let by_id: HashMap<&str, &Comment> = comments.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut roots = Vec::new();
    let mut replies: HashMap<&str, Vec<&Comment>> = HashMap::new();
    for c in comments {
        match resolve_root(c, &by_id) {
            Some(root_id) => replies.entry(root_id).or_default().push(c),
            None => roots.push(c),
        }
    }
    for group in replies.values_mut() {
        group.sort_by_key(|c| c.created_at);
    }
    Partition { roots, replies }
}

/// `None` when `comment` displays as a root (no parent, missing parent, or a cycle).
fn resolve_root<'a>(comment: &'a Comment, by_id: &HashMap<&'a str, &'a Comment>) -> Option<&'a str> {
    let mut parent: &'a Comment = by_id.get(comment.parent_id.as_deref()?).copied()?;
    for _ in 0..by_id.len() {
        match parent.parent_id.as_deref().and_then(|id| by_id.get(id).copied()) {
            Some(next) => parent = next,
            None => {
                return if parent.id == comment.id {
                    None
                } else {
                    Some(parent.id.as_str())
                };
            }
        }
    }
    None
}

/// Ranked ids first, then unranked roots in received order.
fn order_roots<'a>(roots: &[&'a Comment], ranking: &[String]) -> Vec<&'a Comment> {
    let by_id: HashMap<&str, &Comment> = roots.iter().map(|c| (c.id.as_str(), *c)).collect();
    let ranked: HashSet<&str> = ranking.iter().map(String::as_str).collect();
    let mut out: Vec<&Comment> = ranking
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).copied())
        .collect();
    out.extend(roots.iter().filter(|c| !ranked.contains(c.id.as_str())).copied());
    out
}

fn rank(roots: &[&Comment], replies: &HashMap<&str, Vec<&Comment>>) -> Vec<String> {
    let mut scored: Vec<(u64, &Comment)> = roots
        .iter()
        .map(|c| {
            let n = replies.get(c.id.as_str()).map_or(0, Vec::len);
            (top_score(c.like_count, n), *c)
        })
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| b.created_at.cmp(&a.created_at)));
    scored.into_iter().map(|(_, c)| c.id.clone()).collect()
}
