//! Encoding of the session cookie value.
//!
//! The cookie value is always a [`Crypter`] token. Its plaintext depends on the
//! [`TokenMode`]: either the bare session id, or a versioned JSON envelope carrying the id and
//! the session values.
//!
//! Note: the envelope is versioned, but it is still considered an implementation detail and may
//! evolve.

use std::{borrow::Cow, collections::HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::TokenMode,
    crypter::Crypter,
    error::{Error, Result},
    id::SessionId,
    store::SessionRecord,
};

const VERSION: u8 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<'a> {
    v: u8,
    id: Cow<'a, SessionId>,
    generation: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    values: Cow<'a, HashMap<String, Value>>,
}

/// What a decoded session cookie carried.
#[derive(Debug, Clone, PartialEq)]
pub enum CookieValue {
    Id(SessionId),
    Payload {
        id: SessionId,
        generation: u64,
        values: HashMap<String, Value>,
    },
}

impl CookieValue {
    pub fn id(&self) -> &SessionId {
        match self {
            Self::Id(id) | Self::Payload { id, .. } => id,
        }
    }
}

/// Encrypt the cookie value for a session.
pub fn encode(crypter: &Crypter, mode: TokenMode, record: &SessionRecord) -> Result<String> {
    match mode {
        TokenMode::Id => crypter.encrypt(record.id.as_str()),
        TokenMode::Payload => {
            let envelope = Envelope {
                v: VERSION,
                id: Cow::Borrowed(&record.id),
                generation: record.generation,
                values: Cow::Borrowed(&record.values),
            };
            crypter.encrypt(&serde_json::to_string(&envelope)?)
        }
    }
}

/// Authenticate, decrypt and parse a cookie value.
///
/// Fails with [`Error::AuthenticationFailed`] when the token does not verify, and with
/// [`Error::Format`] when a verified plaintext is not what `mode` expects.
pub fn decode(crypter: &Crypter, mode: TokenMode, value: &str) -> Result<CookieValue> {
    let plaintext = crypter.decrypt(value)?;
    match mode {
        TokenMode::Id => SessionId::parse(&plaintext).map(CookieValue::Id),
        TokenMode::Payload => {
            let envelope: Envelope<'static> = serde_json::from_str(&plaintext)
                .map_err(|err| Error::Format(err.to_string()))?;
            if envelope.v != VERSION {
                return Err(Error::Format(format!(
                    "Unsupported cookie session version: {}",
                    envelope.v
                )));
            }
            Ok(CookieValue::Payload {
                id: envelope.id.into_owned(),
                generation: envelope.generation,
                values: envelope.values.into_owned(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Key, config::CookieConfig};

    fn crypter() -> Crypter {
        Crypter::gcm(&Key::generate()).expect("gcm crypter builds")
    }

    fn record() -> SessionRecord {
        SessionRecord::new(SessionId::random(), CookieConfig::default())
    }

    #[test]
    fn id_mode_carries_only_the_id() {
        let crypter = crypter();
        let mut record = record();
        record.values.insert("user".to_owned(), Value::from("alice"));

        let token = encode(&crypter, TokenMode::Id, &record).expect("encodes");
        assert_eq!(crypter.decrypt(&token).expect("decrypts"), record.id.as_str());
        assert_eq!(
            decode(&crypter, TokenMode::Id, &token).expect("decodes"),
            CookieValue::Id(record.id)
        );
    }

    #[test]
    fn payload_mode_carries_values() {
        let crypter = crypter();
        let mut record = record();
        record.generation = 7;
        record.values.insert("count".to_owned(), Value::from(1));

        let token = encode(&crypter, TokenMode::Payload, &record).expect("encodes");
        let decoded = decode(&crypter, TokenMode::Payload, &token).expect("decodes");
        assert_eq!(decoded.id(), &record.id);
        assert_eq!(
            decoded,
            CookieValue::Payload {
                id: record.id,
                generation: 7,
                values: record.values,
            }
        );
    }

    #[test]
    fn mode_mismatch_is_a_format_error() {
        let crypter = crypter();
        let token = encode(&crypter, TokenMode::Payload, &record()).expect("encodes");
        assert!(matches!(
            decode(&crypter, TokenMode::Id, &token),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn unknown_envelope_version_is_rejected() {
        let crypter = crypter();
        let token = crypter
            .encrypt(r#"{"v":2,"id":"507f1f77bcf86cd799439011","generation":0}"#)
            .expect("encrypts");
        assert!(matches!(
            decode(&crypter, TokenMode::Payload, &token),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn garbage_is_an_authentication_failure() {
        assert!(matches!(
            decode(&crypter(), TokenMode::Id, "Z2FyYmFnZQ=="),
            Err(Error::AuthenticationFailed)
        ));
    }
}
