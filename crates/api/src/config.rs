use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_API_KEY: &str = "dev-intelli-key";
const DEFAULT_CONVERSATION_TTL_SECONDS: u64 = 30 * 60;
const DEFAULT_MAX_TRANSCRIPT_TURNS: usize = 40;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX: usize = 80;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub api_key: String,
    pub rules_path: Option<PathBuf>,
    pub conversation_ttl: Duration,
    pub max_transcript_turns: usize,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    /// Key rate limits on `x-forwarded-for`; only safe behind a proxy that sets it.
    pub trust_forwarded: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            rules_path: None,
            conversation_ttl: Duration::from_secs(DEFAULT_CONVERSATION_TTL_SECONDS),
            max_transcript_turns: DEFAULT_MAX_TRANSCRIPT_TURNS,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECONDS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            trust_forwarded: false,
        }
    }
}

impl ApiConfig {
    /// Reads `INTELLI_*` variables; unset or unparseable values keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            bind: text("INTELLI_BIND").unwrap_or(defaults.bind),
            api_key: text("INTELLI_API_KEY").unwrap_or(defaults.api_key),
            rules_path: text("INTELLI_RULES_PATH").map(PathBuf::from),
            conversation_ttl: parsed(text("INTELLI_CONVERSATION_TTL_SECONDS"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.conversation_ttl),
            max_transcript_turns: parsed(text("INTELLI_MAX_TRANSCRIPT_TURNS"))
                .filter(|turns| *turns > 0)
                .unwrap_or(defaults.max_transcript_turns),
            rate_limit_window: parsed(text("INTELLI_RATE_LIMIT_WINDOW_SECONDS"))
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: parsed(text("INTELLI_RATE_LIMIT_MAX"))
                .unwrap_or(defaults.rate_limit_max),
            trust_forwarded: text("INTELLI_TRUST_FORWARDED")
                .map(|value| flag(&value))
                .unwrap_or(defaults.trust_forwarded),
        }
    }
}

fn flag(value: &str) -> bool {
    matches!(
        value.to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parsed<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|value| value.parse::<T>().ok())
}
