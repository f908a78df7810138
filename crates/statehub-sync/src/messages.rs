//! Wire envelope.
//!
//! One JSON object per frame. Every envelope carries the store fingerprint
//! under `_hash`; the kind is tagged under `_msg`:
//!
//! ```text
//! {"_hash":"<hex>","_msg":"AUTH","_login":"<hex>","_password":"<hex>"}
//! {"_hash":"<hex>","_msg":"AUTHSTATE","_value":false,"_banned":true}
//! {"_hash":"<hex>","_msg":"START"}
//! {"_hash":"<hex>","_msg":"ACTION_TO_HUB","_action":{"type":"INCREMENT"}}
//! {"_hash":"<hex>","_msg":"ACTION_TO_WORKER","_action":{"type":"INCREMENT"}}
//! ```

use serde::{Deserialize, Serialize};

use statehub_core::{Action, IdentityHash, SecretHash, StoreFingerprint};

use crate::error::{Result, SyncError};

/// A message addressed to one logical store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "_hash")]
    pub fingerprint: StoreFingerprint,
    #[serde(flatten)]
    pub message: Message,
}

/// Message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "_msg")]
pub enum Message {
    /// Leaf to Hub: credentials.
    #[serde(rename = "AUTH")]
    Auth {
        #[serde(rename = "_login")]
        login: IdentityHash,
        #[serde(rename = "_password")]
        password: SecretHash,
    },

    /// Hub to Leaf: authentication verdict.
    #[serde(rename = "AUTHSTATE")]
    AuthState {
        #[serde(rename = "_value")]
        value: bool,
        /// Set only when the origin address is locked out.
        #[serde(rename = "_banned", default, skip_serializing_if = "Option::is_none")]
        banned: Option<bool>,
    },

    /// Leaf to Hub: request a full snapshot.
    #[serde(rename = "START")]
    Start,

    /// Leaf to Hub: an action dispatched on the Leaf.
    #[serde(rename = "ACTION_TO_HUB")]
    ActionToHub {
        #[serde(rename = "_action", default, skip_serializing_if = "Option::is_none")]
        action: Option<Action>,
    },

    /// Hub to Leaf: an action or snapshot to apply.
    #[serde(rename = "ACTION_TO_WORKER")]
    ActionToLeaf {
        #[serde(rename = "_action", default, skip_serializing_if = "Option::is_none")]
        action: Option<Action>,
    },

    /// Any kind this version does not know. Ignored by both roles.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// The `_msg` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Auth { .. } => "AUTH",
            Message::AuthState { .. } => "AUTHSTATE",
            Message::Start => "START",
            Message::ActionToHub { .. } => "ACTION_TO_HUB",
            Message::ActionToLeaf { .. } => "ACTION_TO_WORKER",
            Message::Unknown => "UNKNOWN",
        }
    }
}

impl Envelope {
    pub fn new(fingerprint: StoreFingerprint, message: Message) -> Self {
        Self {
            fingerprint,
            message,
        }
    }

    pub fn auth(fingerprint: StoreFingerprint, login: IdentityHash, password: SecretHash) -> Self {
        Self::new(fingerprint, Message::Auth { login, password })
    }

    pub fn auth_state(fingerprint: StoreFingerprint, value: bool, banned: bool) -> Self {
        Self::new(
            fingerprint,
            Message::AuthState {
                value,
                banned: banned.then_some(true),
            },
        )
    }

    pub fn start(fingerprint: StoreFingerprint) -> Self {
        Self::new(fingerprint, Message::Start)
    }

    pub fn to_hub(fingerprint: StoreFingerprint, action: Action) -> Self {
        Self::new(
            fingerprint,
            Message::ActionToHub {
                action: Some(action),
            },
        )
    }

    pub fn to_leaf(fingerprint: StoreFingerprint, action: Action) -> Self {
        Self::new(
            fingerprint,
            Message::ActionToLeaf {
                action: Some(action),
            },
        )
    }

    /// Serialize to one text frame.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| SyncError::Parse(e.to_string()))
    }

    /// Parse one text frame.
    pub fn decode(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| SyncError::Parse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn fp() -> StoreFingerprint {
        StoreFingerprint::derive("counter")
    }

    fn as_json(envelope: &Envelope) -> Value {
        serde_json::from_str(&envelope.encode().unwrap()).unwrap()
    }

    #[test]
    fn test_auth_field_names() {
        let login = IdentityHash::derive("demo");
        let password = SecretHash::derive("demo");
        let value = as_json(&Envelope::auth(fp(), login, password));

        assert_eq!(value["_msg"], "AUTH");
        assert_eq!(value["_hash"], fp().to_hex());
        assert_eq!(value["_login"], login.0.to_hex());
        assert_eq!(value["_password"], password.0.to_hex());
    }

    #[test]
    fn test_banned_flag_only_when_set() {
        let ok = as_json(&Envelope::auth_state(fp(), true, false));
        assert_eq!(ok, json!({ "_hash": fp().to_hex(), "_msg": "AUTHSTATE", "_value": true }));

        let banned = as_json(&Envelope::auth_state(fp(), false, true));
        assert_eq!(banned["_banned"], true);
        assert_eq!(banned["_value"], false);
    }

    #[test]
    fn test_action_envelope_shape() {
        let value = as_json(&Envelope::to_hub(fp(), Action::new("ADD").with_payload(2)));
        assert_eq!(
            value,
            json!({
                "_hash": fp().to_hex(),
                "_msg": "ACTION_TO_HUB",
                "_action": { "type": "ADD", "payload": 2 },
            })
        );
    }

    #[test]
    fn test_decode_start() {
        let frame = format!(r#"{{"_hash":"{}","_msg":"START"}}"#, fp().to_hex());
        let envelope = Envelope::decode(&frame).unwrap();
        assert_eq!(envelope, Envelope::start(fp()));
    }

    #[test]
    fn test_decode_action_without_payload() {
        let frame = format!(r#"{{"_hash":"{}","_msg":"ACTION_TO_WORKER"}}"#, fp().to_hex());
        let envelope = Envelope::decode(&frame).unwrap();
        assert_eq!(envelope.message, Message::ActionToLeaf { action: None });
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let frame = format!(r#"{{"_hash":"{}","_msg":"PING","extra":1}}"#, fp().to_hex());
        let envelope = Envelope::decode(&frame).unwrap();
        assert_eq!(envelope.message, Message::Unknown);
    }

    #[test]
    fn test_garbage_is_a_parse_error() {
        assert!(matches!(Envelope::decode("not json"), Err(SyncError::Parse(_))));
        assert!(matches!(Envelope::decode(r#"{"_msg":"START"}"#), Err(SyncError::Parse(_))));
        assert!(matches!(
            Envelope::decode(r#"{"_hash":"zz","_msg":"START"}"#),
            Err(SyncError::Parse(_))
        ));
    }
}
