//! The writer's object-scope stack.
//!
//! One frame per open object scope. Because construction is lazy (an
//! instance is normally built at `EndObject`, once its constructor
//! directives are known), a frame doubles as the preconstruction bag:
//! everything assigned before the instance exists is buffered here and
//! replayed right after construction.

use lattice_common::{MemberId, Span, TypeId};
use lattice_runtime::Value;
use rustc_hash::FxHashSet;

use crate::fixup::{Slot, TokenId};

/// A member assignment buffered before the owner was constructed.
#[derive(Debug)]
pub struct BufferedMember {
    pub member: MemberId,
    pub slot: Slot,
    pub span: Span,
}

/// A collection item buffered before the container was constructed.
#[derive(Debug)]
pub struct BufferedItem {
    pub item: Slot,
    /// Dictionary key with its own source span, so key diagnostics do not
    /// borrow the item's position.
    pub key: Option<(Slot, Span)>,
    pub span: Span,
}

/// One open object scope.
pub struct Frame {
    pub ty: TypeId,
    pub span: Span,
    /// The member scope currently open inside this object, if any.
    pub member: Option<MemberId>,
    pub member_span: Span,
    /// The live instance, once constructed (or retrieved, or pre-supplied).
    pub instance: Option<Value>,
    /// Instance came from `GetObject`; it is already in place in the parent
    /// and its `EndObject` must not deliver a fresh value.
    pub retrieved: bool,
    pub began_init: bool,
    /// The open member already received its one value.
    pub property_value_set: bool,
    /// Value waiting for the member scope to close.
    pub pending_value: Option<(Value, Span)>,
    /// Members already opened in this scope, for duplicate detection.
    pub assigned: FxHashSet<MemberId>,
    /// Name directive seen before construction.
    pub name: Option<(String, Span)>,
    /// Key directive value, held until `EndObject` delivers to the parent.
    pub key: Option<(Slot, Span)>,
    pub factory: Option<String>,
    pub init_text: Option<(String, Span)>,
    /// Initialization text pended on unresolved names; the frame's
    /// `EndObject` delivers this token instead of an instance.
    pub init_parked: Option<TokenId>,
    pub ctor_args: Vec<Value>,
    pub positional: Vec<(Value, Span)>,
    pub buffered: Vec<BufferedMember>,
    pub items_buffer: Vec<BufferedItem>,
}

impl Frame {
    pub fn new(ty: TypeId, span: Span) -> Self {
        Self {
            ty,
            span,
            member: None,
            member_span: span,
            instance: None,
            retrieved: false,
            began_init: false,
            property_value_set: false,
            pending_value: None,
            assigned: FxHashSet::default(),
            name: None,
            key: None,
            factory: None,
            init_text: None,
            init_parked: None,
            ctor_args: Vec::new(),
            positional: Vec::new(),
            buffered: Vec::new(),
            items_buffer: Vec::new(),
        }
    }
}
