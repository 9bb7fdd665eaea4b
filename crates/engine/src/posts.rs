//! Owner operations on posts, and reports.

use chrono::{DateTime, Utc};
use domain::{ActorId, Comment, EdgeKind, Error, Post, Profile, Result};
use serde::{Deserialize, Serialize};
use storage::collections::{COMMENTS, POSTS, PROFILES, REPORTS};
use storage::{DocumentStore, Query, TxnExt, Write};
use tracing::{info, warn};

use crate::optimistic::load_post;
use crate::services::Services;
use crate::traits::HapticCue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportTarget {
    Post,
    Profile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub reporter: ActorId,
    pub target_kind: ReportTarget,
    pub target_id: String,
    pub reason: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

fn owned_post(txn: &dyn storage::Txn, post_id: &str, actor: &ActorId) -> Result<Post> {
    let post = load_post(txn, post_id)?;
    if post.author_id != *actor {
        return Err(Error::PermissionDenied(
            "only the author can change a post".to_string(),
        ));
    }
    Ok(post)
}

pub async fn edit_post<S: DocumentStore>(
    services: &Services<S>,
    post_id: &str,
    text: &str,
) -> Result<Post> {
    let actor = services.require_actor()?;
    let text = text.trim().to_string();
    if text.is_empty() {
        return Err(Error::InvalidInput("Post text cannot be empty.".to_string()));
    }
    let id = post_id.to_string();
    let result = services
        .store
        .transaction(move |txn| {
            let mut post = owned_post(txn, &id, &actor)?;
            post.text = text.clone();
            post.edited_at = Some(Utc::now());
            txn.set_as(POSTS, &post.id, &post)?;
            Ok(post)
        })
        .await;
    match result {
        Ok(post) => {
            info!(post_id, "Post edited");
            Ok(post)
        }
        Err(e) => {
            warn!(post_id, "Edit failed: {}", e);
            services.surface("Couldn't save changes", &e);
            Err(e)
        }
    }
}

/// Deletes the post and lowers the author's post counter. Comments and
/// edges on the post are cleaned up afterwards; that cleanup only logs.
pub async fn delete_post<S: DocumentStore>(services: &Services<S>, post_id: &str) -> Result<()> {
    let actor = services.require_actor()?;
    let id = post_id.to_string();
    let result = services
        .store
        .transaction(move |txn| {
            owned_post(txn, &id, &actor)?;
            txn.delete(POSTS, &id);
            if let Some(mut profile) = txn.get_as::<Profile>(PROFILES, actor.as_str())? {
                profile.post_count = profile.post_count.saturating_sub(1);
                txn.set_as(PROFILES, actor.as_str(), &profile)?;
            }
            Ok(())
        })
        .await;

    if let Err(e) = result {
        warn!(post_id, "Delete failed: {}", e);
        services.surface("Couldn't delete post", &e);
        return Err(e);
    }
    info!(post_id, "Post deleted");
    services.feedback.haptic(HapticCue::Warning);

    match cleanup(&*services.store, post_id).await {
        Ok(removed) => info!(post_id, removed, "Post leftovers removed"),
        Err(e) => warn!(post_id, "Post cleanup failed: {}", e),
    }
    Ok(())
}

async fn cleanup<S: DocumentStore>(store: &S, post_id: &str) -> Result<usize> {
    let comments: Vec<Comment> = store
        .query_as(&Query::collection(COMMENTS).where_eq("post_id", post_id))
        .await?;
    let mut writes: Vec<Write> = comments
        .iter()
        .map(|c| Write::delete(COMMENTS, &c.id))
        .collect();

    for kind in [EdgeKind::Like, EdgeKind::Repost, EdgeKind::Bookmark] {
        let edges = store
            .query(&Query::collection(kind.collection()).where_eq("target", post_id))
            .await?;
        for edge in edges {
            let edge: domain::Edge = storage::decode(edge)?;
            writes.push(Write::delete(
                kind.collection(),
                &domain::edge_doc_id(&edge.actor, &edge.target),
            ));
        }
    }

    let removed = writes.len();
    if removed > 0 {
        store.batch(writes).await?;
    }
    Ok(removed)
}

/// Files a report. Reports are write-only from the client.
pub async fn report<S: DocumentStore>(
    services: &Services<S>,
    target_kind: ReportTarget,
    target_id: &str,
    reason: &str,
) -> Result<Report> {
    let reporter = services.require_actor()?;
    let report = Report {
        id: services.store.generate_id(),
        reporter,
        target_kind,
        target_id: target_id.to_string(),
        reason: reason.trim().to_string(),
        created_at: Utc::now(),
    };
    let write = Write::set(REPORTS, &report.id, &report)?;
    match services.store.batch(vec![write]).await {
        Ok(()) => {
            info!(report_id = %report.id, ?target_kind, target_id, "Report filed");
            Ok(report)
        }
        Err(e) => {
            warn!(target_id, "Report failed: {}", e);
            services.surface("Couldn't send report", &e);
            Err(e)
        }
    }
}
