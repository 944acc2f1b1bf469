use std::fmt;

use rand::{RngCore, rngs::OsRng};

use crate::error::{Error, Result};

/// Bytes of entropy in a session id.
pub const ID_BYTES: usize = 12;

/// The identifier of a session.
///
/// Twelve bytes drawn from the operating system's random number generator, rendered as 24
/// lowercase hex characters. Uniqueness against the store is checked by
/// [`SessionManager::generate_id`](crate::SessionManager::generate_id), not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    pub fn random() -> Self {
        let mut bytes = [0u8; ID_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    pub fn parse(value: &str) -> Result<Self> {
        let well_formed = value.len() == ID_BYTES * 2
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !well_formed {
            return Err(Error::Format("session id is not 24 lowercase hex characters".into()));
        }
        Ok(Self(value.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_ids_are_hex_and_distinct() {
        let a = SessionId::random();
        let b = SessionId::random();
        assert_eq!(a.as_str().len(), 24);
        assert!(SessionId::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn parse_rejects_foreign_shapes() {
        for bad in ["", "abc", "507F1F77BCF86CD799439011", "507f1f77bcf86cd79943901g", "507f1f77bcf86cd7994390110"] {
            assert!(matches!(SessionId::parse(bad), Err(Error::Format(_))), "{bad}");
        }
        assert!(SessionId::parse("507f1f77bcf86cd799439011").is_ok());
    }

    #[test]
    fn serde_validates() {
        let id: SessionId = serde_json::from_str("\"507f1f77bcf86cd799439011\"").expect("valid id");
        assert_eq!(serde_json::to_string(&id).expect("serializes"), "\"507f1f77bcf86cd799439011\"");
        assert!(serde_json::from_str::<SessionId>("\"nope\"").is_err());
    }
}
