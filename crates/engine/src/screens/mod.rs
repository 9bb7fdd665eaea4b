pub mod comments;
pub mod composer;
pub mod conversation;
pub mod inbox;
pub mod post_card;
pub mod profile;
