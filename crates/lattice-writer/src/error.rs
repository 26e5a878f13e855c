//! Error taxonomy for the object writer.
//!
//! Structural, duplicate, constructor, and conversion failures are fatal
//! and raised immediately, first one wins. Unresolved forward references
//! are different: they are collected across the whole parse and reported
//! once, as a single aggregate error at end of stream, each entry carrying
//! its own source position.

use std::fmt;

use lattice_common::Span;

/// An error raised while building the object graph.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteError {
    pub kind: WriteErrorKind,
    pub span: Span,
}

impl WriteError {
    pub fn new(kind: WriteErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The specific kind of write error.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteErrorKind {
    /// A node appeared in a scope where it is not valid.
    UnexpectedNode {
        node: &'static str,
        context: &'static str,
    },
    /// The same member was assigned twice within one object scope.
    DuplicateMember { ty: String, member: String },
    /// The same name was registered twice in one name scope.
    DuplicateName { name: String },
    /// No way to construct an instance of the type.
    NoConstructor { ty: String, reason: String },
    /// A directive was used somewhere it does not belong.
    DirectiveMisuse {
        directive: &'static str,
        reason: String,
    },
    /// The member cannot be set on this object.
    UnsettableMember { ty: String, member: String },
    /// Text-to-value conversion failed. Wraps the converter's reason.
    Conversion { detail: String },
    /// The runtime provider rejected an operation.
    Runtime { detail: String },
    /// Names that were referenced but never defined anywhere in the
    /// document. Reported once, after the end-of-stream completion pass.
    UnresolvedReferences { refs: Vec<UnresolvedRef> },
}

/// One entry of the aggregate unresolved-references error.
#[derive(Debug, Clone, PartialEq)]
pub struct UnresolvedRef {
    /// The names the parked assignment was still waiting for.
    pub names: Vec<String>,
    /// Where the reference appeared in the source.
    pub span: Span,
}

impl fmt::Display for WriteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteErrorKind::UnexpectedNode { node, context } => {
                write!(f, "unexpected {node} {context}")
            }
            WriteErrorKind::DuplicateMember { ty, member } => {
                write!(f, "member `{member}` assigned twice on `{ty}`")
            }
            WriteErrorKind::DuplicateName { name } => {
                write!(f, "name `{name}` registered twice in the same name scope")
            }
            WriteErrorKind::NoConstructor { ty, reason } => {
                write!(f, "cannot construct `{ty}`: {reason}")
            }
            WriteErrorKind::DirectiveMisuse { directive, reason } => {
                write!(f, "directive `{directive}` misused: {reason}")
            }
            WriteErrorKind::UnsettableMember { ty, member } => {
                write!(f, "member `{member}` cannot be set on `{ty}`")
            }
            WriteErrorKind::Conversion { detail } => {
                write!(f, "conversion failed: {detail}")
            }
            WriteErrorKind::Runtime { detail } => {
                write!(f, "runtime rejected operation: {detail}")
            }
            WriteErrorKind::UnresolvedReferences { refs } => {
                write!(f, "{} unresolved forward reference(s): ", refs.len())?;
                for (i, r) in refs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "`{}`", r.names.join("`, `"))?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for WriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for WriteError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_display_lists_every_name() {
        let err = WriteError::new(
            WriteErrorKind::UnresolvedReferences {
                refs: vec![
                    UnresolvedRef {
                        names: vec!["a".into()],
                        span: Span::new(0, 1),
                    },
                    UnresolvedRef {
                        names: vec!["b".into(), "c".into()],
                        span: Span::new(2, 3),
                    },
                ],
            },
            Span::new(0, 3),
        );
        let text = err.to_string();
        assert!(text.contains("2 unresolved"));
        assert!(text.contains("`a`"));
        assert!(text.contains("`b`, `c`"));
    }

    #[test]
    fn duplicate_member_display() {
        let err = WriteErrorKind::DuplicateMember {
            ty: "demo:Button".into(),
            member: "Text".into(),
        };
        assert_eq!(err.to_string(), "member `Text` assigned twice on `demo:Button`");
    }
}
