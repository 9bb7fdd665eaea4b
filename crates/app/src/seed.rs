use chrono::{Duration, Utc};
use domain::{ActorId, Comment, Conversation, Edge, EdgeKind, Message, ParticipantInfo, Post, Profile};
use std::collections::HashMap;
use storage::collections::{COMMENTS, CONVERSATIONS, MESSAGES, POSTS, PROFILES};
use storage::{DocumentStore, Write};
use tracing::info;

const PEOPLE: [(&str, &str); 3] = [("alice", "Alice"), ("bob", "Bob"), ("carol", "Carol")];

fn actor(id: &str) -> ActorId {
    ActorId::new_unchecked(id)
}

fn comment(id: &str, post_id: &str, author: &str, text: &str, minutes_ago: i64) -> Comment {
    Comment {
        id: id.to_string(),
        post_id: post_id.to_string(),
        author_id: actor(author),
        author_name: author.to_string(),
        text: text.to_string(),
        parent_id: None,
        replying_to: None,
        like_count: 0,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        client_token: None,
    }
}

fn demo_writes() -> domain::Result<Vec<Write>> {
    let now = Utc::now();
    let mut writes = Vec::new();

    let mut profiles: HashMap<&str, Profile> = PEOPLE
        .iter()
        .map(|(id, name)| {
            let mut p = Profile::new(actor(id), *id);
            p.display_name = Some(name.to_string());
            (*id, p)
        })
        .collect();

    let mut hello = Post::new("welcome", actor("alice"), "Hello from the demo feed!");
    hello.created_at = now - Duration::hours(2);
    let mut coffee = Post::new("coffee", actor("bob"), "Coffee first, then code.");
    coffee.created_at = now - Duration::hours(1);

    let comments = vec![
        comment("c-welcome-1", "welcome", "bob", "Welcome aboard", 90),
        comment("c-welcome-2", "welcome", "carol", "Nice to see you here", 60),
    ];
    let mut reply = comment("c-welcome-3", "welcome", "alice", "Thanks both!", 30);
    reply.parent_id = Some("c-welcome-1".to_string());
    reply.replying_to = Some(domain::ReplyTarget {
        author_id: actor("bob"),
        author_name: "bob".to_string(),
        comment_id: "c-welcome-1".to_string(),
    });
    hello.comment_count = 3;
    hello.like_count = 1;
    hello.engagement_count = Some(hello.counter_sum());

    // carol follows alice and likes her post
    let follow = domain::EdgeKey::new(EdgeKind::Follow, actor("carol"), "alice");
    writes.push(Write::set(
        follow.kind.collection(),
        &follow.doc_id(),
        &Edge::new(actor("carol"), "alice"),
    )?);
    let like = domain::EdgeKey::new(EdgeKind::Like, actor("carol"), "welcome");
    writes.push(Write::set(
        like.kind.collection(),
        &like.doc_id(),
        &Edge::new(actor("carol"), "welcome"),
    )?);
    if let Some(p) = profiles.get_mut("alice") {
        p.follower_count = 1;
        p.post_count = 1;
    }
    if let Some(p) = profiles.get_mut("carol") {
        p.following_count = 1;
    }
    if let Some(p) = profiles.get_mut("bob") {
        p.post_count = 1;
    }

    let (a, b) = (actor("alice"), actor("bob"));
    let conversation_id = Conversation::id_for(&a, &b);
    let message = Message {
        id: "m-1".to_string(),
        conversation_id: conversation_id.clone(),
        sender_id: b.clone(),
        text: "Are you coming tonight?".to_string(),
        created_at: now - Duration::minutes(5),
        client_token: None,
    };
    let conversation = Conversation {
        id: conversation_id.clone(),
        participant_info: [&a, &b]
            .into_iter()
            .map(|p| {
                let info = ParticipantInfo {
                    username: p.to_string(),
                    avatar_url: None,
                };
                (p.clone(), info)
            })
            .collect(),
        participants: vec![a.clone(), b],
        unread: HashMap::from([(a, 1)]),
        last_message: Some(message.text.clone()),
        last_activity_at: message.created_at,
    };

    for (id, profile) in &profiles {
        writes.push(Write::set(PROFILES, id, profile)?);
    }
    for post in [&hello, &coffee] {
        writes.push(Write::set(POSTS, &post.id, post)?);
    }
    for c in comments.iter().chain(std::iter::once(&reply)) {
        writes.push(Write::set(COMMENTS, &c.id, c)?);
    }
    writes.push(Write::set(CONVERSATIONS, &conversation_id, &conversation)?);
    writes.push(Write::set(MESSAGES, &message.id, &message)?);
    Ok(writes)
}

/// Writes a small cast of profiles, posts, comments and one conversation.
pub async fn seed_demo<S: DocumentStore>(store: &S) -> domain::Result<()> {
    let writes = demo_writes()?;
    let count = writes.len();
    store.batch(writes).await?;
    info!(documents = count, "Seeded demo data");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStore;

    #[tokio::test]
    async fn demo_counters_match_documents() {
        let store = MemoryStore::new();
        seed_demo(&store).await.unwrap();

        let post: Post = store.get_as(POSTS, "welcome").await.unwrap().unwrap();
        assert_eq!(post.comment_count as usize, store.len(COMMENTS));
        assert_eq!(post.engagement(), 4);

        let alice: Profile = store.get_as(PROFILES, "alice").await.unwrap().unwrap();
        assert_eq!(alice.follower_count, 1);
        assert_eq!(store.len(PROFILES), 3);
    }
}
