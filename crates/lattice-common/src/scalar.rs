use std::fmt;

use serde::Serialize;

/// A primitive value carried by a `Value` node in the stream.
///
/// Markup documents are mostly text; the other variants exist so that
/// programmatic node streams (and replayed buffers) do not have to squeeze
/// everything through strings. Text-to-typed conversion policy lives in the
/// runtime's converter registry, not here.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl Scalar {
    /// The text payload, if this scalar is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short human-readable name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Scalar::Text(_) => "text",
            Scalar::Int(_) => "int",
            Scalar::Float(_) => "float",
            Scalar::Bool(_) => "bool",
            Scalar::Null => "null",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Text(s) => write!(f, "{s}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(x) => write!(f, "{x}"),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Null => write!(f, "null"),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_text_only_for_text() {
        assert_eq!(Scalar::from("b1").as_text(), Some("b1"));
        assert_eq!(Scalar::Int(3).as_text(), None);
    }

    #[test]
    fn display() {
        assert_eq!(Scalar::from("hi").to_string(), "hi");
        assert_eq!(Scalar::Bool(true).to_string(), "true");
        assert_eq!(Scalar::Null.to_string(), "null");
    }
}
