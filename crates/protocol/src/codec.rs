//! Text frame codec: classify, validate and serialize [`Message`]s.

use serde::Deserialize;

use crate::models::{msg_types, Message, MessageKind};

/// Why a frame could not be turned into a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[source] serde_json::Error),
    #[error("missing message type")]
    MissingType,
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} message: {source}")]
    InvalidBody {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Only the discriminator; every other field is skipped.
#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    r#type: Option<String>,
}

/// Reads the `type` of a frame without validating the rest of it.
pub fn peek_kind(text: &str) -> Result<MessageKind, DecodeError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Json)?;
    match envelope.r#type.as_deref() {
        Some(msg_types::HELLO) => Ok(MessageKind::Hello),
        Some(msg_types::STATE) => Ok(MessageKind::State),
        Some(msg_types::COMMAND) => Ok(MessageKind::Command),
        Some(other) => Err(DecodeError::UnknownType(other.to_string())),
        None => Err(DecodeError::MissingType),
    }
}

/// Fully decodes a frame. Unknown fields are ignored.
pub fn decode(text: &str) -> Result<Message, DecodeError> {
    let kind = peek_kind(text)?;
    serde_json::from_str(text).map_err(|source| DecodeError::InvalidBody {
        kind: kind.as_str(),
        source,
    })
}

pub fn encode(msg: &Message) -> String {
    // Every variant is a map of strings and bools; serialization cannot fail.
    serde_json::to_string(msg).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Command, Phase, Role, StateSnapshot, Timer};

    #[test]
    fn decodes_hello() {
        let msg = decode(r#"{"type":"hello","client":"producer"}"#).unwrap();
        assert_eq!(msg, Message::hello(Role::Producer));
    }

    #[test]
    fn decodes_partial_state_and_ignores_unknown_fields() {
        let msg = decode(r#"{"type":"state","task":"Draft report","tabId":7}"#).unwrap();
        assert_eq!(
            msg,
            Message::State(StateSnapshot {
                task: Some("Draft report".to_string()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn decodes_full_state() {
        let msg = decode(
            r#"{"type":"state","timer":"24:59","task":"Draft report","phase":"work","running":true,"loggedIn":true}"#,
        )
        .unwrap();
        let Message::State(s) = msg else {
            panic!("expected state");
        };
        assert_eq!(s.timer, Some(Timer::from_secs(24 * 60 + 59)));
        assert_eq!(s.phase, Some(Phase::Work));
        assert_eq!(s.running, Some(true));
        assert_eq!(s.logged_in, Some(true));
    }

    #[test]
    fn null_fields_count_as_absent() {
        let msg = decode(r#"{"type":"state","timer":null,"running":false}"#).unwrap();
        assert_eq!(
            msg,
            Message::State(StateSnapshot {
                running: Some(false),
                ..Default::default()
            })
        );
    }

    #[test]
    fn decodes_command() {
        let msg = decode(r#"{"type":"command","cmd":"pause"}"#).unwrap();
        assert_eq!(msg, Message::command(Command::Pause));
    }

    #[test]
    fn rejects_frames_outside_the_union() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(
            decode(r#"{"client":"producer"}"#),
            Err(DecodeError::MissingType)
        ));
        assert!(matches!(
            decode(r#"{"type":"ping"}"#),
            Err(DecodeError::UnknownType(t)) if t == "ping"
        ));
        assert!(matches!(
            decode(r#"{"type":"command","cmd":"reset"}"#),
            Err(DecodeError::InvalidBody { kind: "command", .. })
        ));
        assert!(matches!(
            decode(r#"{"type":"hello","client":"fridge"}"#),
            Err(DecodeError::InvalidBody { kind: "hello", .. })
        ));
    }

    #[test]
    fn peek_does_not_validate_body() {
        let kind = peek_kind(r#"{"type":"state","timer":"whenever"}"#).unwrap();
        assert_eq!(kind, MessageKind::State);
        assert!(decode(r#"{"type":"state","timer":"whenever"}"#).is_err());
    }

    #[test]
    fn encode_then_peek_agrees_on_kind() {
        let msg = Message::command(Command::Start);
        let text = encode(&msg);
        assert_eq!(peek_kind(&text).unwrap(), msg.kind());
        assert_eq!(text, r#"{"type":"command","cmd":"start"}"#);
    }
}
