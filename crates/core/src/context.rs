use crate::models::{ConversationState, IntentTag, Topic};

/// Topic transition: a topic-bearing intent replaces the topic, anything else keeps it.
pub fn advance_topic(current: Option<Topic>, intent: IntentTag) -> Option<Topic> {
    intent.topic().or(current)
}

impl ConversationState {
    /// Applies one matched intent and returns the resulting topic.
    pub fn update(&mut self, intent: IntentTag) -> Option<Topic> {
        self.topic = advance_topic(self.topic, intent);
        self.topic
    }
}
