//! Runtime provider for the Lattice toolkit.
//!
//! The object writer never touches instances directly; every creation,
//! member write, and container mutation goes through the [`Runtime`] trait
//! defined here. This crate also ships [`ObjectRuntime`], a heap-backed
//! object model that backs the CLI and the test suites, plus the built-in
//! converter behaviors.
//!
//! - [`value`]: graph values, handles, and the `Provided` pending result
//! - [`convert`]: the `Converter` trait and standard converters
//! - [`heap`]: the arena-backed `ObjectRuntime`
//! - [`error`]: runtime error taxonomy
//! - [`dump`]: cycle-safe JSON rendering of finished graphs

pub mod convert;
pub mod dump;
pub mod error;
pub mod heap;
pub mod value;

use lattice_common::{MemberId, TypeId};
use lattice_schema::ConverterId;

pub use convert::Converter;
pub use error::RuntimeError;
pub use heap::{Instance, ObjectRuntime, ProvideValueFn};
pub use value::{EmptyResolver, NameResolver, ObjId, Provided, Value};

/// The capability interface the object writer drives.
///
/// One method per operation the construction algorithm needs (spans and
/// parking are the writer's business; the runtime only ever sees resolved
/// work). `get_value` takes `&mut self` because reading a member may
/// materialize its implicit default.
pub trait Runtime {
    /// The declared type of a live instance.
    fn type_of(&self, obj: ObjId) -> TypeId;

    /// Construct an instance, optionally with positional arguments.
    fn create_instance(&mut self, ty: TypeId, args: &[Value]) -> Result<ObjId, RuntimeError>;

    /// Construct through a named factory method.
    fn create_with_factory(
        &mut self,
        ty: TypeId,
        method: &str,
        args: &[Value],
    ) -> Result<ObjId, RuntimeError>;

    /// Read the current value of a member.
    fn get_value(&mut self, obj: ObjId, member: MemberId) -> Result<Value, RuntimeError>;

    /// Write a member.
    fn set_value(&mut self, obj: ObjId, member: MemberId, value: Value)
        -> Result<(), RuntimeError>;

    /// Append an item to a collection.
    fn add(&mut self, collection: ObjId, item: Value) -> Result<(), RuntimeError>;

    /// Insert a keyed entry into a dictionary.
    fn add_to_dictionary(&mut self, dict: ObjId, key: Value, item: Value)
        -> Result<(), RuntimeError>;

    /// Notify the instance that member assignment is starting.
    fn begin_init(&mut self, obj: ObjId) -> Result<(), RuntimeError>;

    /// Notify the instance that member assignment is complete.
    fn end_init(&mut self, obj: ObjId) -> Result<(), RuntimeError>;

    /// Evaluate a markup extension to its actual value.
    fn call_provide_value(
        &mut self,
        ext: ObjId,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError>;

    /// Run a registered converter over text.
    fn create_from_converted_value(
        &mut self,
        converter: ConverterId,
        text: &str,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError>;
}

// A writer can borrow a runtime instead of owning it, so several documents
// (or a deferred-content replay) can share one heap.
impl<T: Runtime + ?Sized> Runtime for &mut T {
    fn type_of(&self, obj: ObjId) -> TypeId {
        (**self).type_of(obj)
    }

    fn create_instance(&mut self, ty: TypeId, args: &[Value]) -> Result<ObjId, RuntimeError> {
        (**self).create_instance(ty, args)
    }

    fn create_with_factory(
        &mut self,
        ty: TypeId,
        method: &str,
        args: &[Value],
    ) -> Result<ObjId, RuntimeError> {
        (**self).create_with_factory(ty, method, args)
    }

    fn get_value(&mut self, obj: ObjId, member: MemberId) -> Result<Value, RuntimeError> {
        (**self).get_value(obj, member)
    }

    fn set_value(
        &mut self,
        obj: ObjId,
        member: MemberId,
        value: Value,
    ) -> Result<(), RuntimeError> {
        (**self).set_value(obj, member, value)
    }

    fn add(&mut self, collection: ObjId, item: Value) -> Result<(), RuntimeError> {
        (**self).add(collection, item)
    }

    fn add_to_dictionary(
        &mut self,
        dict: ObjId,
        key: Value,
        item: Value,
    ) -> Result<(), RuntimeError> {
        (**self).add_to_dictionary(dict, key, item)
    }

    fn begin_init(&mut self, obj: ObjId) -> Result<(), RuntimeError> {
        (**self).begin_init(obj)
    }

    fn end_init(&mut self, obj: ObjId) -> Result<(), RuntimeError> {
        (**self).end_init(obj)
    }

    fn call_provide_value(
        &mut self,
        ext: ObjId,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError> {
        (**self).call_provide_value(ext, resolver)
    }

    fn create_from_converted_value(
        &mut self,
        converter: ConverterId,
        text: &str,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError> {
        (**self).create_from_converted_value(converter, text, resolver)
    }
}
