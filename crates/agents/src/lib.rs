use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use intelli_core::{welcome_reply, IntentTag, Link, Reply, RuleTable, Topic};
use intelli_observability::AppMetrics;
use intelli_storage::{
    ConversationHandle, ConversationRecord, ConversationRepository, TurnRecord,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

pub const MAX_CONVERSATION_ID_CHARS: usize = 64;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("conversation id must be 1 to 64 letters, digits, '-' or '_'")]
    InvalidConversationId,
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatInput {
    pub conversation_id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub conversation_id: String,
    pub intent: IntentTag,
    pub topic: Option<Topic>,
    pub body: String,
    pub links: Vec<Link>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationOpened {
    pub conversation_id: String,
    pub reply: Reply,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    pub conversation_ttl: Duration,
    pub max_transcript_turns: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            conversation_ttl: Duration::minutes(30),
            max_transcript_turns: 40,
        }
    }
}

/// Owns conversation lifecycles and feeds each turn through the rule table.
/// A conversation's record stays locked for the whole turn, so turns of the
/// same conversation run one at a time and in arrival order.
pub struct AssistantAgent<S>
where
    S: ConversationRepository,
{
    rules: Arc<RuleTable>,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    settings: AgentSettings,
}

impl<S> Clone for AssistantAgent<S>
where
    S: ConversationRepository,
{
    fn clone(&self) -> Self {
        Self {
            rules: self.rules.clone(),
            store: self.store.clone(),
            metrics: self.metrics.clone(),
            settings: self.settings,
        }
    }
}

impl<S> AssistantAgent<S>
where
    S: ConversationRepository,
{
    pub fn new(
        rules: Arc<RuleTable>,
        store: Arc<S>,
        metrics: Arc<AppMetrics>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            rules,
            store,
            metrics,
            settings,
        }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    pub fn metrics(&self) -> &AppMetrics {
        &self.metrics
    }

    pub async fn open_conversation(&self) -> Result<ConversationOpened, AgentError> {
        let conversation_id = Uuid::new_v4().to_string();
        let record =
            ConversationRecord::new(&conversation_id, Utc::now(), self.settings.conversation_ttl);
        let expires_at = record.expires_at;

        self.store.open(record).await?;
        self.metrics.inc_conversation_opened();
        info!(conversation_id = %conversation_id, "conversation opened");

        Ok(ConversationOpened {
            conversation_id,
            reply: welcome_reply(),
            expires_at,
        })
    }

    #[instrument(skip(self, input))]
    pub async fn handle_turn(&self, input: ChatInput) -> Result<ChatReply, AgentError> {
        if input.text.trim().is_empty() {
            self.metrics.inc_empty_rejected();
            return Err(AgentError::EmptyMessage);
        }

        let conversation_id = match input.conversation_id {
            Some(id) if is_valid_conversation_id(&id) => id,
            Some(_) => return Err(AgentError::InvalidConversationId),
            None => Uuid::new_v4().to_string(),
        };

        let started = Instant::now();
        let now = Utc::now();

        let handle = self.checkout(&conversation_id, now).await?;
        let outcome = {
            let mut record = handle.lock();
            let outcome = self.rules.resolve_turn(&mut record.state, &input.text);
            record.touch(now, self.settings.conversation_ttl);
            record.push_turn(
                TurnRecord {
                    at: now,
                    user_text: input.text.clone(),
                    intent: outcome.intent,
                    topic: outcome.topic,
                    reply: outcome.reply.clone(),
                },
                self.settings.max_transcript_turns,
            );
            outcome
        };

        self.metrics.inc_turn();
        if outcome.intent == IntentTag::Fallback {
            self.metrics.inc_fallback();
        }
        self.metrics.observe_latency(started.elapsed());
        info!(
            conversation_id = %conversation_id,
            intent = %outcome.intent.as_code(),
            topic = outcome.topic.map(Topic::as_code).unwrap_or("none"),
            links = outcome.reply.links.len(),
            "turn handled"
        );

        Ok(ChatReply {
            conversation_id,
            intent: outcome.intent,
            topic: outcome.topic,
            body: outcome.reply.body,
            links: outcome.reply.links,
            at: now,
        })
    }

    pub async fn transcript(
        &self,
        conversation_id: &str,
    ) -> Result<Option<ConversationRecord>, AgentError> {
        let handle = self.store.load(conversation_id, Utc::now()).await?;
        Ok(handle.map(|handle| handle.lock().clone()))
    }

    pub async fn end_conversation(&self, conversation_id: &str) -> Result<bool, AgentError> {
        let removed = self.store.remove(conversation_id).await?;
        if removed {
            self.metrics.add_conversations_ended(1);
            info!(conversation_id = %conversation_id, "conversation ended");
        }
        Ok(removed)
    }

    pub async fn purge_expired(&self) -> Result<u64, AgentError> {
        let removed = self.store.purge_expired(Utc::now()).await?;
        self.metrics.add_conversations_ended(removed);
        Ok(removed)
    }

    pub async fn open_conversations(&self) -> Result<usize, AgentError> {
        Ok(self.store.count().await?)
    }

    async fn checkout(
        &self,
        conversation_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ConversationHandle, AgentError> {
        if let Some(handle) = self.store.load(conversation_id, now).await? {
            return Ok(handle);
        }

        let handle = self
            .store
            .open(ConversationRecord::new(
                conversation_id,
                now,
                self.settings.conversation_ttl,
            ))
            .await?;
        self.metrics.inc_conversation_opened();
        Ok(handle)
    }
}

/// Ids are caller-chosen or server-issued uuids; both must fit this shape.
pub fn is_valid_conversation_id(id: &str) -> bool {
    !id.is_empty()
        && id.chars().count() <= MAX_CONVERSATION_ID_CHARS
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelli_core::follow_up;
    use intelli_storage::MemoryStore;

    fn agent_with(settings: AgentSettings) -> AssistantAgent<MemoryStore> {
        AssistantAgent::new(
            Arc::new(RuleTable::default_table()),
            Arc::new(MemoryStore::new()),
            AppMetrics::shared(),
            settings,
        )
    }

    fn agent() -> AssistantAgent<MemoryStore> {
        agent_with(AgentSettings::default())
    }

    fn say(conversation_id: &str, text: &str) -> ChatInput {
        ChatInput {
            conversation_id: Some(conversation_id.to_string()),
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn opening_returns_welcome() {
        let agent = agent();
        let opened = agent.open_conversation().await.unwrap();
        assert!(opened.reply.body.starts_with("Hello! I'm IntelliAssist"));
        assert_eq!(agent.open_conversations().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn topic_carries_across_turns() {
        let agent = agent();
        let id = agent.open_conversation().await.unwrap().conversation_id;

        let reply = agent.handle_turn(say(&id, "hostel rooms")).await.unwrap();
        assert_eq!(reply.topic, Some(Topic::Hostel));
        assert!(reply.body.ends_with(follow_up(Some(Topic::Hostel))));

        let reply = agent.handle_turn(say(&id, "asdkj random text")).await.unwrap();
        assert_eq!(reply.intent, IntentTag::Fallback);
        assert_eq!(reply.topic, Some(Topic::Hostel));

        let record = agent.transcript(&id).await.unwrap().unwrap();
        assert_eq!(record.state.topic, Some(Topic::Hostel));
        assert_eq!(record.turns.len(), 2);
    }

    #[tokio::test]
    async fn conversations_are_isolated() {
        let agent = agent();
        agent.handle_turn(say("a", "admission")).await.unwrap();
        agent.handle_turn(say("b", "upcoming events")).await.unwrap();

        let a = agent.transcript("a").await.unwrap().unwrap();
        let b = agent.transcript("b").await.unwrap().unwrap();
        assert_eq!(a.state.topic, Some(Topic::Admission));
        assert_eq!(b.state.topic, Some(Topic::Events));
    }

    #[tokio::test]
    async fn rejects_blank_messages() {
        let agent = agent();
        let err = agent.handle_turn(say("a", "  \n ")).await.unwrap_err();
        assert!(matches!(err, AgentError::EmptyMessage));
        assert!(agent.transcript("a").await.unwrap().is_none());
        assert_eq!(agent.metrics().snapshot().empty_rejected_total, 1);
    }

    #[tokio::test]
    async fn rejects_malformed_conversation_ids() {
        let agent = agent();
        let too_long = "x".repeat(MAX_CONVERSATION_ID_CHARS + 1);
        for id in ["", "   ", "a b", "../etc", too_long.as_str()] {
            let err = agent.handle_turn(say(id, "hello")).await.unwrap_err();
            assert!(matches!(err, AgentError::InvalidConversationId), "id {id:?}");
        }
        assert_eq!(agent.open_conversations().await.unwrap(), 0);

        let longest = "x".repeat(MAX_CONVERSATION_ID_CHARS);
        assert!(agent.handle_turn(say(&longest, "hello")).await.is_ok());
    }

    #[test]
    fn issued_ids_are_valid() {
        assert!(is_valid_conversation_id(&Uuid::new_v4().to_string()));
        assert!(is_valid_conversation_id("kiosk_2-session"));
    }

    #[tokio::test]
    async fn missing_id_opens_a_conversation() {
        let agent = agent();
        let reply = agent
            .handle_turn(ChatInput {
                conversation_id: None,
                text: "hello".to_string(),
            })
            .await
            .unwrap();
        assert!(agent.transcript(&reply.conversation_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn transcript_is_bounded() {
        let agent = agent_with(AgentSettings {
            max_transcript_turns: 2,
            ..AgentSettings::default()
        });
        for text in ["fees", "library", "exam"] {
            agent.handle_turn(say("c", text)).await.unwrap();
        }
        let record = agent.transcript("c").await.unwrap().unwrap();
        let intents = record.turns.iter().map(|t| t.intent).collect::<Vec<_>>();
        assert_eq!(intents, vec![IntentTag::Library, IntentTag::Exams]);
    }

    #[tokio::test]
    async fn ending_discards_state() {
        let agent = agent();
        agent.handle_turn(say("c", "placements")).await.unwrap();
        assert!(agent.end_conversation("c").await.unwrap());
        assert!(!agent.end_conversation("c").await.unwrap());

        let reply = agent.handle_turn(say("c", "hello")).await.unwrap();
        assert_eq!(reply.topic, None);
    }

    #[tokio::test]
    async fn expired_conversations_start_over() {
        let agent = agent_with(AgentSettings {
            conversation_ttl: Duration::zero(),
            ..AgentSettings::default()
        });
        agent.handle_turn(say("c", "courses")).await.unwrap();
        let reply = agent.handle_turn(say("c", "hello")).await.unwrap();
        assert_eq!(reply.topic, None);
        assert_eq!(agent.purge_expired().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_turns_on_one_conversation_all_land() {
        let agent = agent();
        let id = agent.open_conversation().await.unwrap().conversation_id;

        let tasks = (0..16)
            .map(|index| {
                let agent = agent.clone();
                let id = id.clone();
                let text = if index % 2 == 0 { "courses" } else { "hostel" };
                tokio::spawn(async move { agent.handle_turn(say(&id, text)).await })
            })
            .collect::<Vec<_>>();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let record = agent.transcript(&id).await.unwrap().unwrap();
        assert_eq!(record.turns.len(), 16);
        assert_eq!(
            record.state.topic,
            record.turns.last().and_then(|turn| turn.topic)
        );
        assert_eq!(agent.metrics().snapshot().turns_total, 16);
    }
}
