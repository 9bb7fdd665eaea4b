use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if s.is_empty() {
            return Err("Actor ID cannot be empty.".to_string());
        }
        // '_' joins actor and target in edge document ids
        if s.contains('_') || s.contains('/') {
            return Err("Actor ID cannot contain underscores ('_') or slashes ('/').".to_string());
        }
        if s.len() > 128 {
            return Err("Actor ID is too long (max 128 chars).".to_string());
        }
        Ok(Self(s))
    }

    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Applies a signed delta to an unsigned counter, clamping at zero.
pub fn apply_delta(value: u64, delta: i64) -> u64 {
    if delta < 0 {
        value.saturating_sub(delta.unsigned_abs())
    } else {
        value.saturating_add(delta as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Counter {
    Likes,
    Comments,
    Reposts,
    Shares,
}

/// Enough information to undo one counter change exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterChange {
    pub counter: Counter,
    pub before: u64,
    pub engagement_before: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub author_id: ActorId,
    pub text: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub repost_count: u64,
    #[serde(default)]
    pub share_count: u64,
    /// Missing on records written before the aggregate existed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engagement_count: Option<u64>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub edited_at: Option<DateTime<Utc>>,
}

impl Post {
    pub fn new(id: impl Into<String>, author_id: ActorId, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            author_id,
            text: text.into(),
            image_url: None,
            like_count: 0,
            comment_count: 0,
            repost_count: 0,
            share_count: 0,
            engagement_count: Some(0),
            created_at: Utc::now(),
            edited_at: None,
        }
    }

    pub fn counter_sum(&self) -> u64 {
        self.like_count + self.comment_count + self.repost_count + self.share_count
    }

    pub fn engagement(&self) -> u64 {
        self.engagement_count.unwrap_or_else(|| self.counter_sum())
    }

    pub fn counter(&self, counter: Counter) -> u64 {
        match counter {
            Counter::Likes => self.like_count,
            Counter::Comments => self.comment_count,
            Counter::Reposts => self.repost_count,
            Counter::Shares => self.share_count,
        }
    }

    fn counter_mut(&mut self, counter: Counter) -> &mut u64 {
        match counter {
            Counter::Likes => &mut self.like_count,
            Counter::Comments => &mut self.comment_count,
            Counter::Reposts => &mut self.repost_count,
            Counter::Shares => &mut self.share_count,
        }
    }

    /// Moves one counter and the engagement aggregate together. A missing
    /// aggregate is initialised from the counter sum before the delta lands.
    pub fn adjust(&mut self, counter: Counter, delta: i64) -> CounterChange {
        let change = CounterChange {
            counter,
            before: self.counter(counter),
            engagement_before: self.engagement_count,
        };
        let engagement = self.engagement();
        let after = apply_delta(change.before, delta);
        *self.counter_mut(counter) = after;
        self.engagement_count = Some(apply_delta(engagement, after as i64 - change.before as i64));
        change
    }

    /// Restores the counter and the aggregate, including a missing aggregate.
    pub fn revert(&mut self, change: CounterChange) {
        *self.counter_mut(change.counter) = change.before;
        self.engagement_count = change.engagement_before;
    }

    /// Overwrites one counter with an authoritative value, keeping engagement in step.
    pub fn set_counter(&mut self, counter: Counter, value: u64) {
        let delta = value as i64 - self.counter(counter) as i64;
        self.adjust(counter, delta);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ActorId,
    pub username: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub follower_count: u64,
    #[serde(default)]
    pub following_count: u64,
    #[serde(default)]
    pub post_count: u64,
}

impl Profile {
    pub fn new(id: ActorId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            display_name: None,
            avatar_url: None,
            bio: None,
            follower_count: 0,
            following_count: 0,
            post_count: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTarget {
    pub author_id: ActorId,
    pub author_name: String,
    pub comment_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author_id: ActorId,
    pub author_name: String,
    pub text: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub replying_to: Option<ReplyTarget>,
    #[serde(default)]
    pub like_count: u64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Like,
    Repost,
    Bookmark,
    Follow,
    Block,
    CommentLike,
}

impl EdgeKind {
    /// Each kind lives in its own namespace.
    pub fn collection(self) -> &'static str {
        match self {
            EdgeKind::Like => "likes",
            EdgeKind::Repost => "reposts",
            EdgeKind::Bookmark => "bookmarks",
            EdgeKind::Follow => "follows",
            EdgeKind::Block => "blocks",
            EdgeKind::CommentLike => "comment_likes",
        }
    }

    pub fn post_counter(self) -> Option<Counter> {
        match self {
            EdgeKind::Like => Some(Counter::Likes),
            EdgeKind::Repost => Some(Counter::Reposts),
            _ => None,
        }
    }

    pub fn targets_actor(self) -> bool {
        matches!(self, EdgeKind::Follow | EdgeKind::Block)
    }

    pub fn notification(self) -> Option<NotificationKind> {
        match self {
            EdgeKind::Like => Some(NotificationKind::Like),
            EdgeKind::Repost => Some(NotificationKind::Repost),
            EdgeKind::Follow => Some(NotificationKind::Follow),
            EdgeKind::CommentLike => Some(NotificationKind::CommentLike),
            EdgeKind::Bookmark | EdgeKind::Block => None,
        }
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "like" => Ok(EdgeKind::Like),
            "repost" => Ok(EdgeKind::Repost),
            "bookmark" => Ok(EdgeKind::Bookmark),
            "follow" => Ok(EdgeKind::Follow),
            "block" => Ok(EdgeKind::Block),
            "comment_like" => Ok(EdgeKind::CommentLike),
            other => Err(format!("Unknown edge kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeKey {
    pub kind: EdgeKind,
    pub actor: ActorId,
    pub target: String,
}

impl EdgeKey {
    pub fn new(kind: EdgeKind, actor: ActorId, target: impl Into<String>) -> Self {
        Self {
            kind,
            actor,
            target: target.into(),
        }
    }

    pub fn doc_id(&self) -> String {
        edge_doc_id(&self.actor, &self.target)
    }
}

pub fn edge_doc_id(actor: &ActorId, target: &str) -> String {
    format!("{}_{}", actor, target)
}

/// Stored edge record. Presence asserts the edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub actor: ActorId,
    pub target: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl Edge {
    pub fn new(actor: ActorId, target: impl Into<String>) -> Self {
        Self {
            actor,
            target: target.into(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub participants: Vec<ActorId>,
    #[serde(default)]
    pub participant_info: HashMap<ActorId, ParticipantInfo>,
    #[serde(default)]
    pub unread: HashMap<ActorId, u32>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    /// One conversation per pair, independent of who starts it.
    pub fn id_for(a: &ActorId, b: &ActorId) -> String {
        if a <= b {
            format!("{}_{}", a, b)
        } else {
            format!("{}_{}", b, a)
        }
    }

    pub fn other(&self, me: &ActorId) -> Option<&ActorId> {
        self.participants.iter().find(|p| *p != me)
    }

    pub fn includes(&self, actor: &ActorId) -> bool {
        self.participants.contains(actor)
    }

    pub fn unread_for(&self, actor: &ActorId) -> u32 {
        self.unread.get(actor).copied().unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: ActorId,
    pub text: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub client_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    Repost,
    Follow,
    Comment,
    Reply,
    CommentLike,
    Message,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub kind: NotificationKind,
    pub actor: ActorId,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub preview: Option<String>,
}

impl PushPayload {
    pub fn new(kind: NotificationKind, actor: ActorId, target: Option<String>) -> Self {
        Self {
            kind,
            actor,
            target,
            preview: None,
        }
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }
}
