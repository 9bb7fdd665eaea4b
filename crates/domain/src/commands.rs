use crate::models::{ActorId, Post};
use serde::{Deserialize, Serialize};

/// Entries of the post "more" sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostAction {
    Edit,
    Delete,
    Share,
    CopyLink,
    Bookmark,
    RemoveBookmark,
    Report,
    BlockAuthor,
}

impl PostAction {
    pub fn label(self) -> &'static str {
        match self {
            PostAction::Edit => "Edit post",
            PostAction::Delete => "Delete post",
            PostAction::Share => "Share",
            PostAction::CopyLink => "Copy link",
            PostAction::Bookmark => "Bookmark",
            PostAction::RemoveBookmark => "Remove bookmark",
            PostAction::Report => "Report post",
            PostAction::BlockAuthor => "Block author",
        }
    }

    pub fn menu(viewer: Option<&ActorId>, post: &Post, bookmarked: bool) -> Vec<PostAction> {
        let Some(viewer) = viewer else {
            return vec![PostAction::CopyLink];
        };
        let bookmark = if bookmarked {
            PostAction::RemoveBookmark
        } else {
            PostAction::Bookmark
        };
        if *viewer == post.author_id {
            vec![
                PostAction::Edit,
                bookmark,
                PostAction::Share,
                PostAction::CopyLink,
                PostAction::Delete,
            ]
        } else {
            vec![
                bookmark,
                PostAction::Share,
                PostAction::CopyLink,
                PostAction::Report,
                PostAction::BlockAuthor,
            ]
        }
    }
}

/// The viewer's edges towards a profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub following: bool,
    pub blocking: bool,
    pub blocked_by: bool,
}

impl Relationship {
    pub fn is_blocked(&self) -> bool {
        self.blocking || self.blocked_by
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileAction {
    Follow,
    Unfollow,
    Message,
    Block,
    Unblock,
    Report,
}

impl ProfileAction {
    pub fn label(self) -> &'static str {
        match self {
            ProfileAction::Follow => "Follow",
            ProfileAction::Unfollow => "Unfollow",
            ProfileAction::Message => "Message",
            ProfileAction::Block => "Block",
            ProfileAction::Unblock => "Unblock",
            ProfileAction::Report => "Report account",
        }
    }

    pub fn menu(viewer: Option<&ActorId>, target: &ActorId, rel: Relationship) -> Vec<ProfileAction> {
        match viewer {
            None => Vec::new(),
            Some(v) if v == target => Vec::new(),
            Some(_) if rel.blocking => vec![ProfileAction::Unblock, ProfileAction::Report],
            Some(_) if rel.blocked_by => vec![ProfileAction::Block, ProfileAction::Report],
            Some(_) => {
                let follow = if rel.following {
                    ProfileAction::Unfollow
                } else {
                    ProfileAction::Follow
                };
                vec![
                    follow,
                    ProfileAction::Message,
                    ProfileAction::Block,
                    ProfileAction::Report,
                ]
            }
        }
    }
}
