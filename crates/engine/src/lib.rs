//! Client core: optimistic mutations and live screen state over a document store.

pub mod actions;
pub mod live;
pub mod notify;
pub mod optimistic;
pub mod posts;
pub mod relations;
pub mod screens;
pub mod services;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

pub use actions::{dispatch_post_action, dispatch_profile_action, post_link, ActionOutcome};
pub use live::{spawn_listener, Confirmable, Listener, LiveList, RenderSignal};
pub use notify::{Notifier, RetryPolicy};
pub use optimistic::{run_toggle, OptimisticTarget, PendingEdges, ToggleOutcome, ToggleReceipt};
pub use posts::{delete_post, edit_post, report, Report, ReportTarget};
pub use relations::{is_blocked_between, relationship};
pub use screens::comments::{fetch_thread, CommentsScreen, CommentsView};
pub use screens::composer::{Composer, Draft};
pub use screens::conversation::{mark_read, start_conversation, ConversationScreen, ConversationView};
pub use screens::inbox::{
    visible_conversations, BlockFeeds, InboxRow, InboxScreen, InboxView, DEFAULT_PAGE_SIZE,
};
pub use screens::post_card::{PostCard, PostCardView};
pub use screens::profile::{ProfileScreen, ProfileView};
pub use services::Services;
pub use session::StaticSession;
pub use traits::{AuthProvider, HapticCue, MediaUploader, PushDispatcher, UiFeedback};
