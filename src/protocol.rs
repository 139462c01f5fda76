use serde::{Deserialize, Serialize};

/// Messages a client may send over the wire.
///
/// `username` and `text` default to empty strings so a missing field goes
/// through the same "required" validation as a blank one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        username: String,
    },
    Message {
        #[serde(default)]
        text: String,
    },
}

/// Messages the server emits. Every kind carries the emission timestamp
/// (RFC 3339, UTC) so clients can order what they render.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Join confirmation, sent to the joining connection only.
    Joined { username: String, timestamp: String },
    /// A chat message, broadcast to every joined connection.
    Message {
        username: String,
        text: String,
        timestamp: String,
    },
    /// Presence notifications ("x joined/left the chat").
    System { text: String, timestamp: String },
    Error { message: String, timestamp: String },
}

impl ServerMessage {
    pub fn joined(username: impl Into<String>) -> Self {
        Self::Joined {
            username: username.into(),
            timestamp: now(),
        }
    }

    pub fn message(username: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            username: username.into(),
            text: text.into(),
            timestamp: now(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::System {
            text: text.into(),
            timestamp: now(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: now(),
        }
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join","username":"alice"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                username: "alice".to_string()
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"message","text":"hi"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Message {
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                username: String::new()
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"message"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Message { text: String::new() });
    }

    #[test]
    fn test_unknown_type_fails_typed_parse() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"vote"}"#).is_err());
        assert!(serde_json::from_str::<ClientMessage>(r#"{"text":"hi"}"#).is_err());
    }

    #[test]
    fn test_server_message_wire_format() {
        let json = serde_json::to_value(ServerMessage::message("bob", "hello")).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["username"], "bob");
        assert_eq!(json["text"], "hello");
        assert!(json["timestamp"].is_string());

        let json = serde_json::to_value(ServerMessage::joined("bob")).unwrap();
        assert_eq!(json["type"], "joined");
        assert_eq!(json["username"], "bob");

        let json = serde_json::to_value(ServerMessage::system("bob joined the chat")).unwrap();
        assert_eq!(json["type"], "system");
        assert_eq!(json["text"], "bob joined the chat");

        let json = serde_json::to_value(ServerMessage::error("Username is required")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "Username is required");
    }

    #[test]
    fn test_timestamp_is_rfc3339() {
        let ServerMessage::System { timestamp, .. } = ServerMessage::system("x") else {
            panic!("expected System");
        };
        assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
    }
}
