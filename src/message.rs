use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat message as fetched from the platform. Never mutated after decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub content: String,
    #[serde(rename = "author")]
    pub author_name: String,
    pub author_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replied_to: Option<String>,
}

impl Message {
    pub fn is_question(&self) -> bool {
        self.content.contains('?')
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> Message {
        Message {
            id: "1".to_string(),
            content: "héllo wörld?".to_string(),
            author_name: "ada".to_string(),
            author_id: "42".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap(),
            replied_to: None,
        }
    }

    #[test]
    fn test_persisted_field_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["author"], "ada");
        assert_eq!(json["author_id"], "42");
        assert!(json.get("replied_to").is_none());
        assert!(json.get("author_name").is_none());
    }

    #[test]
    fn test_question_detection() {
        let mut msg = sample();
        assert!(msg.is_question());
        msg.content = "just chatting".to_string();
        assert!(!msg.is_question());
    }
}
