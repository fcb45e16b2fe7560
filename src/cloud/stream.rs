//! Realtime Database streaming events.
//!
//! The REST streaming endpoint speaks Server-Sent Events:
//! ```text
//! event: put
//! data: {"path": "/", "data": "waiting"}
//!
//! event: keep-alive
//! data: null
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::cloud::Change;
use crate::error::{ArmError, Result};

/// Events sent by the streaming endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Data at `path` replaced
    Put(Change),
    /// Children at `path` updated
    Patch(Change),
    /// Connection heartbeat
    KeepAlive,
    /// Security rules no longer allow reading the location
    Cancel(String),
    /// Credential expired or revoked
    AuthRevoked,
}

#[derive(Debug, Deserialize)]
struct Payload {
    path: String,
    #[serde(default)]
    data: Value,
}

/// Parse one SSE message by event name and data line.
///
/// Unknown event names are skipped (`Ok(None)`).
pub fn parse_stream_event(event: &str, data: &str) -> Result<Option<StreamEvent>> {
    let parsed = match event {
        "put" | "patch" => {
            let payload: Payload = serde_json::from_str(data)?;
            let change = Change {
                path: payload.path,
                data: payload.data,
            };
            if event == "put" {
                StreamEvent::Put(change)
            } else {
                StreamEvent::Patch(change)
            }
        }
        "keep-alive" => StreamEvent::KeepAlive,
        "cancel" => StreamEvent::Cancel(data.trim_matches('"').to_string()),
        "auth_revoked" => StreamEvent::AuthRevoked,
        other => {
            log::debug!("Skipping unknown stream event '{}'", other);
            return Ok(None);
        }
    };
    Ok(Some(parsed))
}

impl StreamEvent {
    /// Turn the event into a change, a skip, or a terminal error.
    pub fn into_change(self) -> Result<Option<Change>> {
        match self {
            StreamEvent::Put(change) | StreamEvent::Patch(change) => Ok(Some(change)),
            StreamEvent::KeepAlive => Ok(None),
            StreamEvent::Cancel(reason) => Err(ArmError::Cloud(format!(
                "stream cancelled by server: {}",
                reason
            ))),
            StreamEvent::AuthRevoked => {
                Err(ArmError::Auth("stream credential revoked".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_put_root_string() {
        let event = parse_stream_event("put", r#"{"path":"/","data":"waiting"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, StreamEvent::Put(Change::root(json!("waiting"))));
    }

    #[test]
    fn test_parse_put_null_data() {
        let event = parse_stream_event("put", r#"{"path":"/","data":null}"#)
            .unwrap()
            .unwrap();
        assert_eq!(event, StreamEvent::Put(Change::root(Value::Null)));
    }

    #[test]
    fn test_parse_patch() {
        let event = parse_stream_event("patch", r#"{"path":"/","data":{"0":120}}"#)
            .unwrap()
            .unwrap();
        match event {
            StreamEvent::Patch(change) => assert_eq!(change.data, json!({"0": 120})),
            other => panic!("Expected patch, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_keep_alive_and_unknown() {
        assert_eq!(
            parse_stream_event("keep-alive", "null").unwrap(),
            Some(StreamEvent::KeepAlive)
        );
        assert_eq!(parse_stream_event("something-new", "{}").unwrap(), None);
    }

    #[test]
    fn test_parse_malformed_put() {
        assert!(parse_stream_event("put", "not json").is_err());
    }

    #[test]
    fn test_into_change() {
        assert!(StreamEvent::KeepAlive.into_change().unwrap().is_none());
        assert!(matches!(
            StreamEvent::AuthRevoked.into_change(),
            Err(ArmError::Auth(_))
        ));
        assert!(matches!(
            StreamEvent::Cancel("permission denied".to_string()).into_change(),
            Err(ArmError::Cloud(_))
        ));
        let change = StreamEvent::Put(Change::root(json!("idle")))
            .into_change()
            .unwrap();
        assert_eq!(change, Some(Change::root(json!("idle"))));
    }
}
