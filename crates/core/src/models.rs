use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    Greeting,
    HowAreYou,
    Admission,
    Fees,
    Courses,
    Placements,
    Faculty,
    Library,
    Hostel,
    Events,
    Exams,
    Contact,
    Location,
    Fallback,
}

impl IntentTag {
    pub const ALL: [IntentTag; 14] = [
        Self::Greeting,
        Self::HowAreYou,
        Self::Admission,
        Self::Fees,
        Self::Courses,
        Self::Placements,
        Self::Faculty,
        Self::Library,
        Self::Hostel,
        Self::Events,
        Self::Exams,
        Self::Contact,
        Self::Location,
        Self::Fallback,
    ];

    pub fn as_code(self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::HowAreYou => "how_are_you",
            Self::Admission => "admission",
            Self::Fees => "fees",
            Self::Courses => "courses",
            Self::Placements => "placements",
            Self::Faculty => "faculty",
            Self::Library => "library",
            Self::Hostel => "hostel",
            Self::Events => "events",
            Self::Exams => "exams",
            Self::Contact => "contact",
            Self::Location => "location",
            Self::Fallback => "fallback",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_code() == value)
    }

    /// The topic this intent opens, if it opens one.
    pub fn topic(self) -> Option<Topic> {
        Topic::try_from(self).ok()
    }
}

/// Intents that persist as the open subject of a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Admission,
    Courses,
    Placements,
    Events,
    Hostel,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Self::Admission,
        Self::Courses,
        Self::Placements,
        Self::Events,
        Self::Hostel,
    ];

    pub fn intent(self) -> IntentTag {
        match self {
            Self::Admission => IntentTag::Admission,
            Self::Courses => IntentTag::Courses,
            Self::Placements => IntentTag::Placements,
            Self::Events => IntentTag::Events,
            Self::Hostel => IntentTag::Hostel,
        }
    }

    pub fn as_code(self) -> &'static str {
        self.intent().as_code()
    }
}

impl TryFrom<IntentTag> for Topic {
    type Error = IntentTag;

    fn try_from(intent: IntentTag) -> Result<Self, Self::Error> {
        match intent {
            IntentTag::Admission => Ok(Self::Admission),
            IntentTag::Courses => Ok(Self::Courses),
            IntentTag::Placements => Ok(Self::Placements),
            IntentTag::Events => Ok(Self::Events),
            IntentTag::Hostel => Ok(Self::Hostel),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRule {
    pub intent: IntentTag,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub priority: u32,
}

/// Per-conversation context. One instance belongs to exactly one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub topic: Option<Topic>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub label: String,
    pub url: String,
}

/// Structured reply. `body` is plain text; hyperlinks only ever travel in `links`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Reply {
    pub body: String,
    pub links: Vec<Link>,
}

impl Reply {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub intent: IntentTag,
    pub topic: Option<Topic>,
    pub reply: Reply,
}
