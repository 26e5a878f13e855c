use lattice_common::{MemberId, TypeId};
use rustc_hash::FxHashMap;

use crate::desc::{ConverterId, CtorParam, Directive, MemberDesc, TypeDesc};
use crate::Schema;

/// Builds an immutable [`Schema`].
///
/// All descriptors are registered up front, before any writer session
/// starts; `finish` freezes the tables. The builder pre-seeds one member
/// descriptor per [`Directive`], so directive member ids are stable across
/// every schema.
pub struct SchemaBuilder {
    types: Vec<TypeDesc>,
    members: Vec<MemberDesc>,
    converters: Vec<String>,
    type_lookup: FxHashMap<(String, String), TypeId>,
    member_lookup: FxHashMap<(TypeId, String), MemberId>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        let members = Directive::ALL
            .iter()
            .map(|&d| MemberDesc {
                name: d.name().to_string(),
                owner: None,
                ty: None,
                directive: Some(d),
                attachable: false,
                event: false,
                // Items and the argument directives accept several values
                // without intervening member boundaries.
                collection: matches!(
                    d,
                    Directive::Items | Directive::Arguments | Directive::PositionalParameters
                ),
                dictionary: false,
                deferred: false,
                converter: None,
            })
            .collect();
        Self {
            types: Vec::new(),
            members,
            converters: Vec::new(),
            type_lookup: FxHashMap::default(),
            member_lookup: FxHashMap::default(),
        }
    }

    /// Allocate a converter handle under a symbolic name.
    ///
    /// The runtime binds behavior to the handle; the schema only records
    /// the name for diagnostics and for config-file references.
    pub fn add_converter(&mut self, name: &str) -> ConverterId {
        if let Some(idx) = self.converters.iter().position(|c| c == name) {
            return ConverterId(idx as u32);
        }
        let id = ConverterId(self.converters.len() as u32);
        self.converters.push(name.to_string());
        id
    }

    /// Register a plain constructible type.
    pub fn add_type(&mut self, namespace: &str, name: &str) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDesc {
            namespace: namespace.to_string(),
            name: name.to_string(),
            base: None,
            constructible: true,
            collection: false,
            dictionary: false,
            markup_extension: false,
            converter: None,
            item_type: None,
            key_type: None,
            ctor_params: Vec::new(),
        });
        self.type_lookup
            .insert((namespace.to_string(), name.to_string()), id);
        id
    }

    pub fn set_base(&mut self, ty: TypeId, base: TypeId) {
        self.types[ty.0 as usize].base = Some(base);
    }

    pub fn set_constructible(&mut self, ty: TypeId, constructible: bool) {
        self.types[ty.0 as usize].constructible = constructible;
    }

    pub fn set_type_converter(&mut self, ty: TypeId, converter: ConverterId) {
        self.types[ty.0 as usize].converter = Some(converter);
    }

    pub fn mark_collection(&mut self, ty: TypeId, item: TypeId) {
        let desc = &mut self.types[ty.0 as usize];
        desc.collection = true;
        desc.item_type = Some(item);
    }

    pub fn mark_dictionary(&mut self, ty: TypeId, key: TypeId, item: TypeId) {
        let desc = &mut self.types[ty.0 as usize];
        desc.dictionary = true;
        desc.key_type = Some(key);
        desc.item_type = Some(item);
    }

    pub fn mark_markup_extension(&mut self, ty: TypeId) {
        self.types[ty.0 as usize].markup_extension = true;
    }

    pub fn set_ctor_params(&mut self, ty: TypeId, params: Vec<(&str, TypeId)>) {
        self.types[ty.0 as usize].ctor_params = params
            .into_iter()
            .map(|(name, ty)| CtorParam {
                name: name.to_string(),
                ty,
            })
            .collect();
    }

    /// Register an ordinary member on `owner`.
    ///
    /// Collection/dictionary flags are derived from the member's value type
    /// as registered so far.
    pub fn add_member(&mut self, owner: TypeId, name: &str, ty: TypeId) -> MemberId {
        let value_desc = &self.types[ty.0 as usize];
        let id = MemberId(self.members.len() as u32);
        self.members.push(MemberDesc {
            name: name.to_string(),
            owner: Some(owner),
            ty: Some(ty),
            directive: None,
            attachable: false,
            event: false,
            collection: value_desc.collection,
            dictionary: value_desc.dictionary,
            deferred: false,
            converter: None,
        });
        self.member_lookup.insert((owner, name.to_string()), id);
        id
    }

    /// Register an attachable member: owned by `owner` but settable on
    /// instances of any type.
    pub fn add_attachable(&mut self, owner: TypeId, name: &str, ty: TypeId) -> MemberId {
        let id = self.add_member(owner, name, ty);
        self.members[id.0 as usize].attachable = true;
        id
    }

    pub fn mark_event(&mut self, member: MemberId) {
        self.members[member.0 as usize].event = true;
    }

    pub fn mark_deferred(&mut self, member: MemberId) {
        self.members[member.0 as usize].deferred = true;
    }

    pub fn set_member_converter(&mut self, member: MemberId, converter: ConverterId) {
        self.members[member.0 as usize].converter = Some(converter);
    }

    /// Freeze the tables into an immutable schema.
    pub fn finish(self) -> Schema {
        Schema {
            types: self.types,
            members: self.members,
            converters: self.converters,
            type_lookup: self.type_lookup,
            member_lookup: self.member_lookup,
        }
    }
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}
