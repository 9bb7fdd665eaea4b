mod commands;
mod error;
mod events;
mod models;
pub mod thread;

pub use commands::{PostAction, ProfileAction, Relationship};
pub use error::{Error, Result};
pub use events::ChangeEvent;
pub use models::{
    apply_delta, edge_doc_id, ActorId, Comment, Conversation, Counter, CounterChange, Edge,
    EdgeKey, EdgeKind, MediaBlob, Message, NotificationKind, ParticipantInfo, Post, Profile,
    PushPayload, ReplyTarget,
};
