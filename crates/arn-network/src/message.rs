//! JSON-array frames exchanged with websocket relays.
//!
//! Client → relay: `["EVENT", ev]`, `["REQ", sub, filter…]`, `["CLOSE", sub]`.
//! Relay → client: `["EVENT", sub, ev]`, `["OK", id, accepted, msg]`,
//! `["EOSE", sub]`, `["CLOSED", sub, msg]`, `["NOTICE", msg]`.

use arn_protocol::{Event, Filter};
use serde_json::{json, Value};

use crate::NetworkError;

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Event(Event),
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    Close(String),
}

impl ClientMessage {
    pub fn to_json(&self) -> Result<String, NetworkError> {
        let value = match self {
            Self::Event(event) => json!(["EVENT", event]),
            Self::Req {
                subscription_id,
                filters,
            } => {
                let mut frame = vec![json!("REQ"), json!(subscription_id)];
                for filter in filters {
                    frame.push(serde_json::to_value(filter)?);
                }
                Value::Array(frame)
            }
            Self::Close(subscription_id) => json!(["CLOSE", subscription_id]),
        };
        Ok(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    Event {
        subscription_id: String,
        event: Event,
    },
    Ok {
        event_id: String,
        accepted: bool,
        message: String,
    },
    Eose(String),
    Closed {
        subscription_id: String,
        message: String,
    },
    Notice(String),
}

impl RelayMessage {
    pub fn parse(text: &str) -> Result<Self, NetworkError> {
        let value: Value = serde_json::from_str(text)?;
        let frame = value
            .as_array()
            .ok_or_else(|| NetworkError::Frame("relay frame is not an array".into()))?;
        let label = frame
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| NetworkError::Frame("relay frame has no label".into()))?;

        let string_at = |i: usize| -> Result<String, NetworkError> {
            frame
                .get(i)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| NetworkError::Frame(format!("{label} frame missing string at {i}")))
        };

        match label {
            "EVENT" => {
                let raw = frame
                    .get(2)
                    .ok_or_else(|| NetworkError::Frame("EVENT frame missing event".into()))?;
                Ok(Self::Event {
                    subscription_id: string_at(1)?,
                    event: serde_json::from_value(raw.clone())?,
                })
            }
            "OK" => Ok(Self::Ok {
                event_id: string_at(1)?,
                accepted: frame
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| NetworkError::Frame("OK frame missing accepted flag".into()))?,
                message: string_at(3).unwrap_or_default(),
            }),
            "EOSE" => Ok(Self::Eose(string_at(1)?)),
            "CLOSED" => Ok(Self::Closed {
                subscription_id: string_at(1)?,
                message: string_at(2).unwrap_or_default(),
            }),
            "NOTICE" => Ok(Self::Notice(string_at(1)?)),
            other => Err(NetworkError::Frame(format!("unknown relay frame '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arn_protocol::{EventKind, Identity, UnsignedEvent};

    fn sample_event() -> Event {
        UnsignedEvent::new(EventKind::AgentDiscovery, "{}".into())
            .sign(&Identity::generate())
            .unwrap()
    }

    #[test]
    fn test_req_frame_layout() {
        let msg = ClientMessage::Req {
            subscription_id: "sub1".into(),
            filters: vec![Filter::new().kind(EventKind::AgentAnnouncement), Filter::new().limit(1)],
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value[0], "REQ");
        assert_eq!(value[1], "sub1");
        assert_eq!(value[2]["kinds"][0], 31910);
        assert_eq!(value[3]["limit"], 1);
    }

    #[test]
    fn test_parse_event_frame() {
        let event = sample_event();
        let text = json!(["EVENT", "sub1", event]).to_string();
        match RelayMessage::parse(&text).unwrap() {
            RelayMessage::Event {
                subscription_id,
                event: parsed,
            } => {
                assert_eq!(subscription_id, "sub1");
                assert_eq!(parsed, event);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_ok_and_eose() {
        let ok = RelayMessage::parse(r#"["OK","abc",false,"blocked: spam"]"#).unwrap();
        assert_eq!(
            ok,
            RelayMessage::Ok {
                event_id: "abc".into(),
                accepted: false,
                message: "blocked: spam".into()
            }
        );
        assert_eq!(RelayMessage::parse(r#"["EOSE","s"]"#).unwrap(), RelayMessage::Eose("s".into()));
        assert_eq!(
            RelayMessage::parse(r#"["NOTICE","hi"]"#).unwrap(),
            RelayMessage::Notice("hi".into())
        );
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(RelayMessage::parse("{}").is_err());
        assert!(RelayMessage::parse("[]").is_err());
        assert!(RelayMessage::parse(r#"["AUTH","x"]"#).is_err());
        assert!(RelayMessage::parse(r#"["OK","abc"]"#).is_err());
        assert!(RelayMessage::parse(r#"["EVENT","s"]"#).is_err());
    }
}
