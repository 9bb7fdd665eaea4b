pub mod comments;
pub mod conversations;
pub mod inbox;
pub mod media;
pub mod notifications;
pub mod posts;
pub mod profiles;
pub mod sse;
