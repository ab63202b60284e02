use crate::models::IntentTag;
use crate::rules::RuleTable;

pub fn normalize_utterance(input: &str) -> String {
    input.trim().to_lowercase()
}

/// First rule in table order with any keyword contained in `normalized` wins.
pub fn match_intent(normalized: &str, table: &RuleTable) -> IntentTag {
    table
        .rules()
        .iter()
        .find(|rule| contains_any(normalized, &rule.keywords))
        .map(|rule| rule.intent)
        .unwrap_or(IntentTag::Fallback)
}

pub fn classify_utterance(utterance: &str, table: &RuleTable) -> IntentTag {
    match_intent(&normalize_utterance(utterance), table)
}

fn contains_any(input: &str, needles: &[String]) -> bool {
    needles.iter().any(|needle| input.contains(needle.as_str()))
}
