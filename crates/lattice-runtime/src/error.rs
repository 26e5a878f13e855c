use std::fmt;

/// An error raised by the runtime provider.
///
/// Runtime errors carry no spans -- the writer attaches the span of the
/// node it was processing when it surfaces one. `KeyTypeMismatch` is
/// special: the writer's dictionary drain treats it as "convert the key and
/// retry once" rather than a failure (the only local recovery in the
/// system).
#[derive(Debug, Clone, PartialEq)]
pub enum RuntimeError {
    /// The type's descriptor says it cannot be constructed.
    NotConstructible { ty: String },
    /// Constructor argument count does not match the parameter list.
    CtorArityMismatch {
        ty: String,
        expected: usize,
        found: usize,
    },
    /// No factory method registered under this name for the type.
    UnknownFactory { ty: String, method: String },
    /// Item add on a type without the collection capability.
    NotACollection { ty: String },
    /// Keyed add on a type without the dictionary capability.
    NotADictionary { ty: String },
    /// A raw key was offered to a dictionary whose key type requires
    /// conversion. The caller may convert and retry once.
    KeyTypeMismatch { ty: String, key: String },
    /// An item's type is not assignable to the container's item type.
    ItemTypeMismatch { container: String, item: String },
    /// No converter behavior bound to the handle.
    UnboundConverter { name: String },
    /// A converter rejected its input text.
    ConversionFailed {
        converter: String,
        text: String,
        reason: String,
    },
    /// Provide-value called on a type with no extension behavior.
    NotAnExtension { ty: String },
    /// Member read on a slot that has no value and no implicit default.
    UnsetMember { ty: String, member: String },
    /// Begin/end-init called out of order.
    InitOutOfOrder { ty: String },
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::NotConstructible { ty } => {
                write!(f, "type `{ty}` is not constructible")
            }
            RuntimeError::CtorArityMismatch { ty, expected, found } => write!(
                f,
                "constructor of `{ty}` takes {expected} argument(s), got {found}"
            ),
            RuntimeError::UnknownFactory { ty, method } => {
                write!(f, "type `{ty}` has no factory method `{method}`")
            }
            RuntimeError::NotACollection { ty } => {
                write!(f, "type `{ty}` does not accept item adds")
            }
            RuntimeError::NotADictionary { ty } => {
                write!(f, "type `{ty}` does not accept keyed adds")
            }
            RuntimeError::KeyTypeMismatch { ty, key } => {
                write!(f, "dictionary `{ty}` rejected unconverted key `{key}`")
            }
            RuntimeError::ItemTypeMismatch { container, item } => {
                write!(f, "container `{container}` cannot hold an item of type `{item}`")
            }
            RuntimeError::UnboundConverter { name } => {
                write!(f, "converter `{name}` has no behavior bound")
            }
            RuntimeError::ConversionFailed { converter, text, reason } => {
                write!(f, "converter `{converter}` failed on `{text}`: {reason}")
            }
            RuntimeError::NotAnExtension { ty } => {
                write!(f, "type `{ty}` has no provide-value behavior")
            }
            RuntimeError::UnsetMember { ty, member } => {
                write!(f, "member `{member}` of `{ty}` has no value")
            }
            RuntimeError::InitOutOfOrder { ty } => {
                write!(f, "begin/end-init out of order on `{ty}`")
            }
        }
    }
}

impl std::error::Error for RuntimeError {}
