use lattice_common::{NodeBuffer, Scalar};
use serde::Serialize;

/// Handle to an instance in the runtime's heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ObjId(pub u32);

/// A value in the object graph under construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    /// A primitive leaf.
    Scalar(Scalar),
    /// A live instance.
    Object(ObjId),
    /// Captured deferred content, materialized on demand by its consumer.
    Buffer(NodeBuffer),
}

impl Value {
    pub fn as_object(&self) -> Option<ObjId> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// The text payload, if this is a text scalar.
    pub fn as_text(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_text)
    }

    /// Short variant name for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Scalar(s) => s.kind_name(),
            Value::Object(_) => "object",
            Value::Buffer(_) => "buffer",
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

/// Result of an operation that may need names that are not resolvable yet.
///
/// Converters and provide-value hooks return `Pending` instead of raising:
/// "value not yet available" is an expected outcome on the hot path, not an
/// error. The writer parks the operation and re-runs it once the names
/// resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum Provided {
    Value(Value),
    Pending {
        /// Names that must resolve before the operation can complete.
        names: Vec<String>,
        /// When true (and a single name is pending), the resolved value can
        /// be assigned to the target directly without re-running the
        /// operation.
        assign_direct: bool,
    },
}

/// Resolves registered object names to their values.
///
/// Implemented by the object writer over its name scope; consumed by
/// converters and provide-value hooks.
pub trait NameResolver {
    fn resolve_name(&self, name: &str) -> Option<Value>;
}

/// A resolver that knows no names. Useful in tests and for drains that are
/// guaranteed not to hit name references.
pub struct EmptyResolver;

impl NameResolver for EmptyResolver {
    fn resolve_name(&self, _name: &str) -> Option<Value> {
        None
    }
}
