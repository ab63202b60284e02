use crate::models::{IntentTag, Topic};

pub fn follow_up(topic: Option<Topic>) -> &'static str {
    match topic {
        Some(Topic::Admission) => {
            "Would you like details about eligibility, documents, dates, or registration process?"
        }
        Some(Topic::Courses) => "Do you want the syllabus, fees, duration, or career scope?",
        Some(Topic::Placements) => "Do you want company lists, average packages, or training info?",
        Some(Topic::Events) => "Want to know about Impulse, Technovation, or cultural fests?",
        Some(Topic::Hostel) => "Should I tell you about fees, facilities, or room allocation?",
        None => "",
    }
}

pub fn follow_up_for_intent(intent: IntentTag) -> &'static str {
    follow_up(intent.topic())
}
