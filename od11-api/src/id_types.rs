//! Identity types for device-assigned tokens
//!
//! The OD-11 sends source ids and session ids as JSON integers, but nothing in
//! the protocol promises that. Both types accept integers or strings on the
//! wire; numeric strings are normalized to integers so `"4"` and `4` name the
//! same source.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Raw wire representation of an opaque token
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
enum RawToken {
    Int(i64),
    Text(String),
}

/// Normalized token: numeric text becomes an integer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawToken", into = "RawToken")]
struct Token(RawToken);

impl From<RawToken> for Token {
    fn from(raw: RawToken) -> Self {
        match raw {
            RawToken::Text(text) => Token::parse(text),
            int => Token(int),
        }
    }
}

impl From<Token> for RawToken {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl Token {
    fn parse(text: String) -> Self {
        match text.trim().parse::<i64>() {
            Ok(n) => Token(RawToken::Int(n)),
            Err(_) => Token(RawToken::Text(text)),
        }
    }

    fn as_int(&self) -> Option<i64> {
        match self.0 {
            RawToken::Int(n) => Some(n),
            RawToken::Text(_) => None,
        }
    }
}

impl Ord for Token {
    // Integers sort numerically and before text tokens
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (RawToken::Int(a), RawToken::Int(b)) => a.cmp(b),
            (RawToken::Int(_), RawToken::Text(_)) => Ordering::Less,
            (RawToken::Text(_), RawToken::Int(_)) => Ordering::Greater,
            (RawToken::Text(a), RawToken::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Token {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            RawToken::Int(n) => write!(f, "{}", n),
            RawToken::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Macro to generate common ID type implementations
macro_rules! impl_wire_id {
    ($name:ident) => {
        impl $name {
            /// Create an id from text, normalizing numeric text to an integer
            pub fn new(id: impl Into<String>) -> Self {
                Self(Token::parse(id.into()))
            }

            /// The integer value, if the device uses a numeric id
            pub fn as_int(&self) -> Option<i64> {
                self.0.as_int()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name::new(s)
            }
        }

        impl From<i64> for $name {
            fn from(n: i64) -> Self {
                Self(Token(RawToken::Int(n)))
            }
        }
    };
}

/// Identifier of a selectable input source
///
/// The stock firmware numbers its sources `0..=5`; see
/// [`SourceAlias::canonical_id`](crate::SourceAlias::canonical_id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceId(Token);

impl_wire_id!(SourceId);

/// Session identifier (`sid`) handed out by the device in `group_joined`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Token);

impl_wire_id!(SessionId);
