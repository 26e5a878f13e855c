//! Shared leaf types for the Lattice declarative-markup toolkit.
//!
//! Everything downstream -- the schema tables, the runtime object model,
//! the object writer -- speaks in terms of the types defined here:
//!
//! - [`span`]: byte-offset spans and on-demand line/column conversion
//! - [`scalar`]: the primitive values a markup document can carry
//! - [`node`]: the flat node-stream vocabulary consumed by the writer

pub mod node;
pub mod scalar;
pub mod span;

pub use node::{MemberId, Node, NodeBuffer, NodeBufferReader, NodeKind, TypeId, ValueNode};
pub use scalar::Scalar;
pub use span::{LineIndex, Span};
