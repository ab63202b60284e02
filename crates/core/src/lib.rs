pub mod composer;
pub mod context;
pub mod followup;
pub mod intent;
pub mod models;
pub mod rules;

pub use composer::{compose_reply, welcome_reply};
pub use context::advance_topic;
pub use followup::{follow_up, follow_up_for_intent};
pub use intent::{classify_utterance, match_intent, normalize_utterance};
pub use models::*;
pub use rules::{rules_from_json, RuleTable, RuleTableError, ShadowedKeyword};

impl RuleTable {
    /// Runs one turn: normalize, match, update the conversation topic, compose.
    pub fn resolve_turn(&self, state: &mut ConversationState, utterance: &str) -> TurnOutcome {
        let normalized = normalize_utterance(utterance);
        let intent = match_intent(&normalized, self);
        let topic = state.update(intent);

        TurnOutcome {
            intent,
            topic,
            reply: compose_reply(intent, topic),
        }
    }
}

/// One turn against the built-in rule table.
pub fn process_turn(state: &mut ConversationState, utterance: &str) -> Reply {
    RuleTable::shared_default()
        .resolve_turn(state, utterance)
        .reply
}
