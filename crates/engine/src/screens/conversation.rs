use chrono::Utc;
use domain::{
    ActorId, Conversation, Error, Message, NotificationKind, ParticipantInfo, Profile,
    PushPayload, Result,
};
use futures::future;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use storage::collections::{CONVERSATIONS, MESSAGES};
use storage::{Direction, DocumentStore, Query, Subscription, Txn, TxnExt};
use tracing::{info, warn};

use crate::live::{spawn_listener, Listener, LiveList, RenderSignal};
use crate::optimistic::load_profile;
use crate::relations::blocked_between;
use crate::screens::comments::preview;
use crate::services::Services;

fn load_conversation(txn: &dyn Txn, id: &str, actor: &ActorId) -> Result<Conversation> {
    let conversation: Conversation = txn
        .get_as(CONVERSATIONS, id)?
        .ok_or_else(|| Error::NotFound("conversation".to_string()))?;
    if !conversation.includes(actor) {
        return Err(Error::PermissionDenied(
            "not a participant of this conversation".to_string(),
        ));
    }
    Ok(conversation)
}

/// Returns the pair's conversation, creating it on first contact.
/// Refused while a block edge exists in either direction.
pub async fn start_conversation<S: DocumentStore>(
    services: &Services<S>,
    other: &ActorId,
) -> Result<Conversation> {
    let actor = services.require_actor()?;
    if actor == *other {
        return Err(Error::InvalidInput(
            "You can't message yourself.".to_string(),
        ));
    }
    let other = other.clone();
    let me = actor.clone();
    let result = services
        .store
        .transaction(move |txn| {
            if blocked_between(txn, &me, &other) {
                return Err(Error::Blocked);
            }
            let id = Conversation::id_for(&me, &other);
            if let Some(existing) = txn.get_as::<Conversation>(CONVERSATIONS, &id)? {
                return Ok((existing, false));
            }
            let mine = load_profile(txn, &me).ok();
            let theirs = load_profile(txn, &other)?;
            let info = |id: &ActorId, profile: Option<&Profile>| ParticipantInfo {
                username: profile.map_or_else(|| id.to_string(), |p| p.username.clone()),
                avatar_url: profile.and_then(|p| p.avatar_url.clone()),
            };
            let conversation = Conversation {
                id,
                participants: vec![me.clone(), other.clone()],
                participant_info: HashMap::from([
                    (me.clone(), info(&me, mine.as_ref())),
                    (other.clone(), info(&other, Some(&theirs))),
                ]),
                unread: HashMap::from([(me.clone(), 0), (other.clone(), 0)]),
                last_message: None,
                last_activity_at: Utc::now(),
            };
            txn.set_as(CONVERSATIONS, &conversation.id, &conversation)?;
            Ok((conversation, true))
        })
        .await;

    match result {
        Ok((conversation, created)) => {
            if created {
                info!(conversation_id = %conversation.id, "Conversation started");
            }
            Ok(conversation)
        }
        Err(e) => {
            warn!(%actor, "Starting conversation failed: {}", e);
            services.surface("Couldn't start conversation", &e);
            Err(e)
        }
    }
}

/// Zeroes the actor's unread counter.
pub async fn mark_read<S: DocumentStore>(
    services: &Services<S>,
    conversation_id: &str,
) -> Result<()> {
    let actor = services.require_actor()?;
    let id = conversation_id.to_string();
    services
        .store
        .transaction(move |txn| {
            let mut conversation = load_conversation(txn, &id, &actor)?;
            if conversation.unread_for(&actor) > 0 {
                conversation.unread.insert(actor.clone(), 0);
                txn.set_as(CONVERSATIONS, &id, &conversation)?;
            }
            Ok(())
        })
        .await
}

#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub other: Option<ActorId>,
    pub messages: Vec<Message>,
    pub pending: usize,
    pub loading: bool,
    pub error: Option<String>,
}

struct ConversationShared {
    messages: Mutex<LiveList<Message>>,
    render: RenderSignal,
}

impl ConversationShared {
    fn lock(&self) -> MutexGuard<'_, LiveList<Message>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct ConversationScreen<S> {
    services: Services<S>,
    conversation: Conversation,
    shared: Arc<ConversationShared>,
    _listener: Listener,
}

impl<S: DocumentStore> ConversationScreen<S> {
    pub async fn open(services: Services<S>, conversation_id: &str) -> Result<Self> {
        let actor = services.require_actor()?;
        let conversation: Conversation = services
            .store
            .get_as(CONVERSATIONS, conversation_id)
            .await?
            .ok_or_else(|| Error::NotFound("conversation".to_string()))?;
        if !conversation.includes(&actor) {
            return Err(Error::PermissionDenied(
                "not a participant of this conversation".to_string(),
            ));
        }
        let subscription = services.store.subscribe(
            Query::collection(MESSAGES)
                .where_eq("conversation_id", conversation_id)
                .order_by("created_at", Direction::Asc),
        );
        Ok(Self::attach(services, conversation, subscription))
    }

    pub fn attach(services: Services<S>, conversation: Conversation, messages: Subscription) -> Self {
        let shared = Arc::new(ConversationShared {
            messages: Mutex::new(LiveList::new()),
            render: RenderSignal::default(),
        });
        let target = shared.clone();
        let listener = spawn_listener(messages, move |snapshot| {
            target.lock().apply_snapshot(snapshot, "messages");
            target.render.bump();
            future::ready(())
        });
        Self {
            services,
            conversation,
            shared,
            _listener: listener,
        }
    }

    pub fn render(&self) -> &RenderSignal {
        &self.shared.render
    }

    pub async fn ready(&self) {
        let shared = &self.shared;
        shared.render.wait_for(|| !shared.lock().is_loading()).await;
    }

    pub fn view(&self) -> ConversationView {
        let other = self
            .services
            .actor()
            .and_then(|me| self.conversation.other(&me).cloned());
        let messages = self.shared.lock();
        ConversationView {
            conversation_id: self.conversation.id.clone(),
            other,
            messages: messages.merged(),
            pending: messages.pending().len(),
            loading: messages.is_loading(),
            error: messages.error().map(|e| e.user_message()),
        }
    }

    /// Shows the message at once; the store write bumps the recipient's
    /// unread counter and the conversation preview in the same transaction.
    pub async fn send_message(&self, text: &str) -> Result<Message> {
        let actor = self.services.require_actor()?;
        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(Error::InvalidInput("Message cannot be empty.".to_string()));
        }
        let token = format!("local-{}", self.services.store.generate_id());
        let placeholder = Message {
            id: token.clone(),
            conversation_id: self.conversation.id.clone(),
            sender_id: actor.clone(),
            text,
            created_at: Utc::now(),
            client_token: Some(token.clone()),
        };
        self.shared.lock().push_pending(placeholder.clone());
        self.shared.render.bump();

        let draft = placeholder;
        let result = self
            .services
            .store
            .transaction(move |txn| {
                let mut conversation =
                    load_conversation(txn, &draft.conversation_id, &draft.sender_id)?;
                let recipient = conversation
                    .other(&draft.sender_id)
                    .cloned()
                    .ok_or_else(|| Error::InvalidInput("conversation has no recipient".to_string()))?;
                if blocked_between(txn, &draft.sender_id, &recipient) {
                    return Err(Error::Blocked);
                }
                let mut message = draft.clone();
                message.id = txn.generate_id();
                message.created_at = Utc::now();
                txn.set_as(MESSAGES, &message.id, &message)?;

                *conversation.unread.entry(recipient.clone()).or_insert(0) += 1;
                conversation.last_message = Some(preview(&message.text));
                conversation.last_activity_at = message.created_at;
                txn.set_as(CONVERSATIONS, &conversation.id, &conversation)?;
                Ok((message, recipient))
            })
            .await;

        match result {
            Ok((message, recipient)) => {
                self.shared.lock().confirm_pending(&token, message.clone());
                self.shared.render.bump();
                info!(conversation_id = %self.conversation.id, "Message sent");
                let payload = PushPayload::new(
                    NotificationKind::Message,
                    actor,
                    Some(self.conversation.id.clone()),
                )
                .with_preview(preview(&message.text));
                self.services.notifier.notify(&recipient, payload);
                Ok(message)
            }
            Err(e) => {
                self.shared.lock().discard_pending(&token);
                self.shared.render.bump();
                warn!(conversation_id = %self.conversation.id, "Message failed: {}", e);
                self.services.surface("Message not sent", &e);
                Err(e)
            }
        }
    }
}
