use crate::followup::follow_up;
use crate::models::{IntentTag, Link, Reply, Topic};

pub const OFFICIAL_SITE_LABEL: &str = "iitmjp.ac.in";
pub const OFFICIAL_SITE_URL: &str = "https://iitmjp.ac.in/";

const PARAGRAPH: &str = "\n\n";

pub fn welcome_reply() -> Reply {
    Reply::text(
        "Hello! I'm IntelliAssist, your AI assistant for IITM Janakpuri College. How can I help you today?",
    )
}

/// Builds the reply for a matched intent. `topic` is the post-update topic of the
/// conversation; it only contributes a follow-up when `intent` itself opens a topic.
pub fn compose_reply(intent: IntentTag, topic: Option<Topic>) -> Reply {
    let mut body = primary_text(intent).to_string();

    if intent.topic().is_some() {
        let question = follow_up(topic);
        if !question.is_empty() {
            body.push_str(PARAGRAPH);
            body.push_str(question);
        }
    }

    let links = match intent {
        IntentTag::Contact => vec![Link {
            label: OFFICIAL_SITE_LABEL.to_string(),
            url: OFFICIAL_SITE_URL.to_string(),
        }],
        _ => Vec::new(),
    };

    Reply { body, links }
}

fn primary_text(intent: IntentTag) -> &'static str {
    match intent {
        IntentTag::Greeting => "Hello! How can I assist you about IITM Janakpuri today?",
        IntentTag::HowAreYou => "I'm doing great! What can I help you with about IITM?",
        IntentTag::Admission => concat!(
            "Admissions at IITM Janakpuri are conducted through GGSIPU (IPU) counselling. ",
            "You must apply via the IPU portal. Required documents include 12th marksheet, ",
            "ID proof, photos and category certificates."
        ),
        IntentTag::Fees => concat!(
            "Fee structure varies by course:\n",
            "• BCA: ~₹1,50,000 per year\n",
            "• BBA: ~₹1,45,000 per year\n",
            "• BJMC: ~₹1,40,000 per year\n",
            "• MBA/MCA: ~₹1,80,000 per year\n\n",
            "If you want official details, ask: 'Show me the official website'."
        ),
        IntentTag::Courses => concat!(
            "IITM Janakpuri offers:\n",
            "• BCA\n• BBA\n• BJMC\n• B.Com (Hons)\n• MCA\n• MBA\n\n",
            "Which course do you want details about?"
        ),
        IntentTag::Placements => concat!(
            "IITM has strong placement records with companies like TCS, Infosys, Deloitte, KPMG, EY.\n",
            "Average package: 4–8 LPA\n",
            "Highest package: Up to 12–14 LPA\n",
            "Placement rate: ~85–90%"
        ),
        IntentTag::Faculty => {
            "The faculty is experienced, supportive and strong in both practical and academic knowledge."
        }
        IntentTag::Library => concat!(
            "Library hours: 9 AM – 6 PM (Mon–Sat). Includes 50,000+ books, journals, ",
            "digital study materials & reading hall."
        ),
        IntentTag::Hostel => concat!(
            "IITM offers separate hostels for boys & girls with WiFi, mess, 24x7 security, ",
            "laundry & study rooms."
        ),
        IntentTag::Events => concat!(
            "IITM hosts multiple events like:\n",
            "• Impulse (Annual Fest)\n• TechnoVision\n• Hackathons\n• Cultural Week\n• Sports Fest"
        ),
        IntentTag::Exams => concat!(
            "Exam results and notices are published on the GGSIPU official portal. ",
            "Ask for the official website if you need the link."
        ),
        IntentTag::Contact => concat!(
            "Here are the official contacts:\n",
            "Phone: 011-28520890\n",
            "Email: info@iitmjp.ac.in\n",
            "Official Website: linked below."
        ),
        IntentTag::Location => {
            "IITM Janakpuri is located at D-29, Institutional Area, Janakpuri, New Delhi – 110058."
        }
        IntentTag::Fallback => concat!(
            "I can help you with admissions, fees, courses, events, hostels, placements and more. ",
            "Please ask something specific about IITM Janakpuri."
        ),
    }
}
