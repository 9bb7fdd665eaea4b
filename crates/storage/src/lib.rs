mod memory;
mod query;
mod subscription;
mod traits;

pub use memory::MemoryStore;
pub use query::{Direction, Filter, Query};
pub use subscription::{Snapshot, SnapshotFeed, Subscription};
pub use traits::{decode, decode_all, encode, DocumentStore, Txn, TxnExt, Write};

/// Collection names shared by every client of the store.
/// Edge collections come from `EdgeKind::collection`.
pub mod collections {
    pub const POSTS: &str = "posts";
    pub const COMMENTS: &str = "comments";
    pub const PROFILES: &str = "profiles";
    pub const CONVERSATIONS: &str = "conversations";
    pub const MESSAGES: &str = "messages";
    pub const REPORTS: &str = "reports";
}
