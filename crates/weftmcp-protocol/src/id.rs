//! Request id and progress token unions.
//!
//! JSON-RPC allows an id to be a string or a number. MCP additionally allows
//! fractional-free numbers only, and progress tokens share the same shape
//! while being semantically distinct. Both types preserve the original
//! lexical form across a decode/encode round trip, and equality respects the
//! discriminator: `RequestId::Num(1) != RequestId::Str("1".into())`.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A JSON-RPC request identifier: a string or a signed 64-bit integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    /// String identifier, emitted as a JSON string.
    Str(String),
    /// Integer identifier, emitted as a JSON number.
    Num(i64),
}

/// An opaque token correlating progress notifications to a request.
///
/// Carried in a request's `params._meta.progressToken`. Same wire shape as
/// [`RequestId`] but never interchangeable implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProgressToken {
    /// String token.
    Str(String),
    /// Integer token.
    Num(i64),
}

macro_rules! impl_id_union {
    ($ty:ident, $expecting:literal) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    Self::Str(s) => write!(f, "{s}"),
                    Self::Num(n) => write!(f, "{n}"),
                }
            }
        }

        impl From<String> for $ty {
            fn from(s: String) -> Self {
                Self::Str(s)
            }
        }

        impl From<&str> for $ty {
            fn from(s: &str) -> Self {
                Self::Str(s.to_string())
            }
        }

        impl From<i64> for $ty {
            fn from(n: i64) -> Self {
                Self::Num(n)
            }
        }

        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                match self {
                    Self::Str(s) => serializer.serialize_str(s),
                    Self::Num(n) => serializer.serialize_i64(*n),
                }
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $ty;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        f.write_str($expecting)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        Ok($ty::Str(v.to_string()))
                    }

                    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                        Ok($ty::Str(v))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                        Ok($ty::Num(v))
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                        i64::try_from(v)
                            .map($ty::Num)
                            .map_err(|_| E::custom("integer id out of i64 range"))
                    }

                    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
                        // Tolerate numbers like 1e2 that arrive as floats, but
                        // reject anything fractional or non-finite.
                        if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
                            Ok($ty::Num(v as i64))
                        } else {
                            Err(E::custom("id must be a string or an integral number"))
                        }
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

impl_id_union!(RequestId, "a string or integer request id");
impl_id_union!(ProgressToken, "a string or integer progress token");

impl RequestId {
    /// Reinterpret this id as a progress token with the same wire form.
    pub fn as_progress_token(&self) -> ProgressToken {
        match self {
            Self::Str(s) => ProgressToken::Str(s.clone()),
            Self::Num(n) => ProgressToken::Num(*n),
        }
    }
}

impl ProgressToken {
    /// Reinterpret this token as a request id with the same wire form.
    pub fn as_request_id(&self) -> RequestId {
        match self {
            Self::Str(s) => RequestId::Str(s.clone()),
            Self::Num(n) => RequestId::Num(*n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn string_id_round_trips() {
        let id: RequestId = serde_json::from_str("\"req-7\"").unwrap();
        assert_eq!(id, RequestId::Str("req-7".to_string()));
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"req-7\"");
    }

    #[test]
    fn integer_id_round_trips() {
        let id: RequestId = serde_json::from_str("42").unwrap();
        assert_eq!(id, RequestId::Num(42));
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
    }

    #[test]
    fn negative_id_round_trips() {
        let id: RequestId = serde_json::from_str("-3").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "-3");
    }

    #[test]
    fn fractional_id_rejected() {
        assert!(serde_json::from_str::<RequestId>("1.5").is_err());
    }

    #[test]
    fn equality_respects_discriminator() {
        assert_ne!(RequestId::Num(1), RequestId::Str("1".to_string()));
    }

    #[test]
    fn progress_token_conversion_preserves_form() {
        let id = RequestId::Num(9);
        assert_eq!(id.as_progress_token(), ProgressToken::Num(9));
        assert_eq!(id.as_progress_token().as_request_id(), id);
    }
}
