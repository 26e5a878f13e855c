//! The Lattice object writer.
//!
//! Consumes a flat markup node stream and drives a [`Runtime`] to build
//! the object graph it describes, including graphs with cycles: forward
//! by-name references park in a fixup graph and are patched in as names
//! register. The writer is strictly single-document; make a new one per
//! stream.
//!
//! - [`writer`]: the construction engine and its name scope
//! - [`fixup`]: dependency bookkeeping for parked assignments
//! - [`defer`]: verbatim capture of deferred member content
//! - [`error`]: the write error taxonomy
//! - [`diagnostics`]: ariadne rendering of write errors
//!
//! [`Runtime`]: lattice_runtime::Runtime

pub mod defer;
pub mod diagnostics;
pub mod error;
pub mod fixup;
pub mod writer;

mod frames;
mod pending;

pub use error::{UnresolvedRef, WriteError, WriteErrorKind};
pub use writer::{NameScope, ObjectWriter};
