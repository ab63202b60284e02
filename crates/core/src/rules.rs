use std::collections::HashSet;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::intent::{match_intent, normalize_utterance};
use crate::models::{IntentRule, IntentTag};

static DEFAULT_TABLE: Lazy<RuleTable> = Lazy::new(RuleTable::default_table);

const DEFAULT_RULES: &[(IntentTag, &[&str])] = &[
    (IntentTag::Greeting, &["hello", "hi"]),
    (IntentTag::HowAreYou, &["how are you"]),
    (IntentTag::Admission, &["admission"]),
    (IntentTag::Fees, &["fee"]),
    (
        IntentTag::Courses,
        &["course", "bca", "bba", "bjmc", "mca", "mba"],
    ),
    (IntentTag::Placements, &["placement", "package"]),
    (IntentTag::Faculty, &["faculty", "teacher"]),
    (IntentTag::Library, &["library"]),
    (IntentTag::Hostel, &["hostel", "accommodation"]),
    (IntentTag::Events, &["event", "fest", "cultural"]),
    (IntentTag::Exams, &["exam", "result"]),
    (
        IntentTag::Contact,
        &["contact", "phone", "email", "official website"],
    ),
    (IntentTag::Location, &["location", "address"]),
];

#[derive(Debug, Error)]
pub enum RuleTableError {
    #[error("fallback is implicit and cannot have a rule")]
    FallbackRule,
    #[error("intent `{0}` appears in more than one rule")]
    DuplicateIntent(&'static str),
    #[error("rule for `{0}` has no keywords")]
    NoKeywords(&'static str),
    #[error("rule for `{0}` contains an empty keyword")]
    EmptyKeyword(&'static str),
    #[error("keyword `{keyword}` of `{owner}` is shadowed by `{shadowed_by}`")]
    ShadowedKeyword {
        keyword: String,
        owner: &'static str,
        shadowed_by: &'static str,
    },
    #[error("failed reading rule table from {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rule table document")]
    Parse(#[from] serde_json::Error),
}

/// A keyword that resolves to some other rule's intent when matched on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowedKeyword {
    pub keyword: String,
    pub owner: IntentTag,
    pub shadowed_by: IntentTag,
}

#[derive(Debug, Serialize, Deserialize)]
struct RuleDocument {
    rules: Vec<IntentRule>,
}

/// Parses a `{ "rules": [...] }` document without validating it.
pub fn rules_from_json(input: &str) -> Result<Vec<IntentRule>, RuleTableError> {
    let document: RuleDocument = serde_json::from_str(input)?;
    Ok(document.rules)
}

/// Ordered, immutable rule set. Earlier rules win when several match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<IntentRule>,
}

impl RuleTable {
    /// Builds a validated table. Keywords are normalized and rules are stably
    /// sorted by ascending priority, so equal priorities keep input order.
    pub fn new(rules: Vec<IntentRule>) -> Result<Self, RuleTableError> {
        let table = Self::assemble(rules)?;

        if let Some(first) = table.shadowed_keywords().into_iter().next() {
            return Err(RuleTableError::ShadowedKeyword {
                keyword: first.keyword,
                owner: first.owner.as_code(),
                shadowed_by: first.shadowed_by.as_code(),
            });
        }

        Ok(table)
    }

    /// Like [`RuleTable::new`] but keeps keyword collisions, for inspection.
    pub fn new_unchecked_shadowing(rules: Vec<IntentRule>) -> Result<Self, RuleTableError> {
        Self::assemble(rules)
    }

    pub fn default_table() -> Self {
        let rules = DEFAULT_RULES
            .iter()
            .enumerate()
            .map(|(rank, (intent, keywords))| IntentRule {
                intent: *intent,
                keywords: keywords.iter().map(|k| k.to_string()).collect(),
                priority: rank as u32,
            })
            .collect();

        Self { rules }
    }

    /// Process-wide default table, built on first use.
    pub fn shared_default() -> &'static RuleTable {
        &DEFAULT_TABLE
    }

    pub fn from_json_str(input: &str) -> Result<Self, RuleTableError> {
        Self::new(rules_from_json(input)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RuleTableError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| RuleTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn to_json_pretty(&self) -> Result<String, RuleTableError> {
        let document = RuleDocument {
            rules: self.rules.clone(),
        };
        Ok(serde_json::to_string_pretty(&document)?)
    }

    pub fn rules(&self) -> &[IntentRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every keyword that, matched alone, lands on a different rule.
    pub fn shadowed_keywords(&self) -> Vec<ShadowedKeyword> {
        self.rules
            .iter()
            .flat_map(|rule| {
                rule.keywords.iter().filter_map(move |keyword| {
                    let resolved = match_intent(keyword, self);
                    (resolved != rule.intent).then(|| ShadowedKeyword {
                        keyword: keyword.clone(),
                        owner: rule.intent,
                        shadowed_by: resolved,
                    })
                })
            })
            .collect()
    }

    fn assemble(rules: Vec<IntentRule>) -> Result<Self, RuleTableError> {
        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(rules.len());

        for rule in rules {
            let code = rule.intent.as_code();
            if rule.intent == IntentTag::Fallback {
                return Err(RuleTableError::FallbackRule);
            }
            if !seen.insert(rule.intent) {
                return Err(RuleTableError::DuplicateIntent(code));
            }
            if rule.keywords.is_empty() {
                return Err(RuleTableError::NoKeywords(code));
            }

            let keywords = rule
                .keywords
                .iter()
                .map(|keyword| normalize_utterance(keyword))
                .collect::<Vec<_>>();
            if keywords.iter().any(String::is_empty) {
                return Err(RuleTableError::EmptyKeyword(code));
            }

            normalized.push(IntentRule {
                intent: rule.intent,
                keywords,
                priority: rule.priority,
            });
        }

        normalized.sort_by_key(|rule| rule.priority);
        Ok(Self { rules: normalized })
    }
}

impl Default for RuleTable {
    fn default() -> Self {
        Self::default_table()
    }
}
