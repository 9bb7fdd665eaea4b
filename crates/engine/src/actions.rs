//! Dispatch tables for the post and profile action menus.

use domain::{EdgeKind, Error, PostAction, ProfileAction, Relationship, Result};
use serde::Serialize;
use storage::DocumentStore;
use tracing::debug;

use crate::optimistic::{run_toggle, PendingEdges, ToggleOutcome};
use crate::posts::{self, ReportTarget};
use crate::screens::conversation::start_conversation;
use crate::screens::post_card::PostCard;
use crate::screens::profile::ProfileScreen;

pub fn post_link(post_id: &str) -> String {
    format!("/posts/{}", post_id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The shell opens its editor with the current text.
    OpenEditor { post_id: String, text: String },
    Deleted { post_id: String },
    Shared { link: String, share_count: u64 },
    Link { link: String },
    Toggled { kind: EdgeKind, result: ToggleOutcome },
    Reported { report_id: String },
    OpenConversation { conversation_id: String },
    Relationship { relationship: Relationship },
}

fn refuse(label: &str) -> Error {
    debug!(action = label, "Action not offered in the current menu");
    Error::PermissionDenied(format!("\"{}\" is not available here", label))
}

pub async fn dispatch_post_action<S: DocumentStore>(
    card: &PostCard<S>,
    blocks: &PendingEdges,
    action: PostAction,
) -> Result<ActionOutcome> {
    if !card.actions().contains(&action) {
        return Err(refuse(action.label()));
    }
    let post_id = card.post_id().to_string();
    let services = card.services();

    let outcome = match action {
        PostAction::Edit => ActionOutcome::OpenEditor {
            text: card.view().post.text,
            post_id,
        },
        PostAction::Delete => {
            posts::delete_post(services, &post_id).await?;
            ActionOutcome::Deleted { post_id }
        }
        PostAction::Share => {
            let share_count = card.share().await?;
            ActionOutcome::Shared {
                link: post_link(&post_id),
                share_count,
            }
        }
        PostAction::CopyLink => ActionOutcome::Link {
            link: post_link(&post_id),
        },
        PostAction::Bookmark | PostAction::RemoveBookmark => ActionOutcome::Toggled {
            kind: EdgeKind::Bookmark,
            result: card.toggle_bookmark().await?,
        },
        PostAction::Report => {
            let report =
                posts::report(services, ReportTarget::Post, &post_id, "Reported from post menu")
                    .await?;
            ActionOutcome::Reported {
                report_id: report.id,
            }
        }
        PostAction::BlockAuthor => {
            let author = card.view().post.author_id;
            ActionOutcome::Toggled {
                kind: EdgeKind::Block,
                result: run_toggle(services, blocks, EdgeKind::Block, author.as_str()).await?,
            }
        }
    };
    Ok(outcome)
}

pub async fn dispatch_profile_action<S: DocumentStore>(
    screen: &ProfileScreen<S>,
    action: ProfileAction,
) -> Result<ActionOutcome> {
    if !screen.actions().contains(&action) {
        return Err(refuse(action.label()));
    }
    let services = screen.services();

    let outcome = match action {
        ProfileAction::Follow | ProfileAction::Unfollow => {
            screen.toggle_follow().await?;
            ActionOutcome::Relationship {
                relationship: screen.view().relationship,
            }
        }
        ProfileAction::Block | ProfileAction::Unblock => {
            screen.toggle_block().await?;
            ActionOutcome::Relationship {
                relationship: screen.view().relationship,
            }
        }
        ProfileAction::Message => {
            let conversation = start_conversation(services, screen.profile_id()).await?;
            ActionOutcome::OpenConversation {
                conversation_id: conversation.id,
            }
        }
        ProfileAction::Report => {
            let report = posts::report(
                services,
                ReportTarget::Profile,
                screen.profile_id().as_str(),
                "Reported from profile menu",
            )
            .await?;
            ActionOutcome::Reported {
                report_id: report.id,
            }
        }
    };
    Ok(outcome)
}
