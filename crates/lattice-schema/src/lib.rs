//! Descriptor tables for the Lattice toolkit.
//!
//! This crate is the Type/Member Descriptor Provider: it resolves
//! `(namespace, name)` pairs to capability-bearing descriptors and hands
//! out index-based handles ([`TypeId`]/[`MemberId`]) that the rest of the
//! toolkit passes around. The table is built once through
//! [`SchemaBuilder`], frozen by `finish`, and never mutated afterwards --
//! a writer session only ever reads it.
//!
//! - [`desc`]: `TypeDesc`, `MemberDesc`, `Directive`, converter handles
//! - [`builder`]: the one-shot `SchemaBuilder`

pub mod builder;
pub mod desc;

use lattice_common::{MemberId, TypeId};
use rustc_hash::FxHashMap;

pub use builder::SchemaBuilder;
pub use desc::{ConverterId, CtorParam, Directive, MemberDesc, TypeDesc};

/// The frozen descriptor table.
pub struct Schema {
    pub(crate) types: Vec<TypeDesc>,
    pub(crate) members: Vec<MemberDesc>,
    pub(crate) converters: Vec<String>,
    pub(crate) type_lookup: FxHashMap<(String, String), TypeId>,
    pub(crate) member_lookup: FxHashMap<(TypeId, String), MemberId>,
}

impl Schema {
    /// Start building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// The descriptor behind a type handle.
    pub fn ty(&self, id: TypeId) -> &TypeDesc {
        &self.types[id.0 as usize]
    }

    /// The descriptor behind a member handle.
    pub fn member(&self, id: MemberId) -> &MemberDesc {
        &self.members[id.0 as usize]
    }

    /// Resolve a type by namespace and name.
    pub fn resolve_type(&self, namespace: &str, name: &str) -> Option<TypeId> {
        self.type_lookup
            .get(&(namespace.to_string(), name.to_string()))
            .copied()
    }

    /// Resolve a member by owner type and name, walking the base chain.
    pub fn resolve_member(&self, owner: TypeId, name: &str) -> Option<MemberId> {
        let mut probe = Some(owner);
        while let Some(ty) = probe {
            if let Some(&id) = self.member_lookup.get(&(ty, name.to_string())) {
                return Some(id);
            }
            probe = self.ty(ty).base;
        }
        None
    }

    /// The pre-seeded member id of a directive.
    ///
    /// Directive members occupy the first slots of the member table, in
    /// [`Directive::ALL`] order.
    pub fn directive(&self, directive: Directive) -> MemberId {
        let idx = Directive::ALL
            .iter()
            .position(|&d| d == directive)
            .expect("directive is in ALL");
        MemberId(idx as u32)
    }

    /// Which directive a member id is, if it is one.
    pub fn directive_of(&self, member: MemberId) -> Option<Directive> {
        self.member(member).directive
    }

    /// Whether a value of type `from` can be assigned where `to` is
    /// declared, walking `from`'s base chain.
    pub fn is_assignable(&self, from: TypeId, to: TypeId) -> bool {
        let mut probe = Some(from);
        while let Some(ty) = probe {
            if ty == to {
                return true;
            }
            probe = self.ty(ty).base;
        }
        false
    }

    /// Symbolic name of a converter handle.
    pub fn converter_name(&self, id: ConverterId) -> &str {
        &self.converters[id.0 as usize]
    }

    /// Resolve a converter handle by symbolic name.
    pub fn resolve_converter(&self, name: &str) -> Option<ConverterId> {
        self.converters
            .iter()
            .position(|c| c == name)
            .map(|idx| ConverterId(idx as u32))
    }

    /// Number of registered types.
    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}
