use lattice_common::{MemberId, TypeId};
use lattice_schema::{ConverterId, Schema};
use rustc_hash::FxHashMap;

use crate::convert::{
    BoolConverter, Converter, FloatConverter, IntConverter, NameRefConverter, StringConverter,
};
use crate::error::RuntimeError;
use crate::value::{NameResolver, ObjId, Provided, Value};
use crate::Runtime;

/// Initialization state of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Constructed,
    Initializing,
    Ready,
}

/// One live instance in the heap arena.
#[derive(Debug)]
pub struct Instance {
    ty: TypeId,
    ctor_args: Vec<Value>,
    slots: FxHashMap<MemberId, Value>,
    /// Assignment order of the slots, for deterministic iteration.
    slot_order: Vec<MemberId>,
    items: Vec<Value>,
    entries: Vec<(Value, Value)>,
    state: InitState,
}

impl Instance {
    pub fn ty(&self) -> TypeId {
        self.ty
    }

    pub fn ctor_args(&self) -> &[Value] {
        &self.ctor_args
    }

    pub fn get(&self, member: MemberId) -> Option<&Value> {
        self.slots.get(&member)
    }

    /// Member slots in assignment order.
    pub fn members(&self) -> impl Iterator<Item = (MemberId, &Value)> {
        self.slot_order.iter().map(|m| (*m, &self.slots[m]))
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn entries(&self) -> &[(Value, Value)] {
        &self.entries
    }

    /// Whether end-init has been called.
    pub fn is_ready(&self) -> bool {
        self.state == InitState::Ready
    }
}

/// Provide-value behavior for a markup-extension type.
pub type ProvideValueFn =
    fn(&ObjectRuntime, ObjId, &dyn NameResolver) -> Result<Provided, RuntimeError>;

/// A registered factory method for a type.
pub type FactoryFn = fn(&mut ObjectRuntime, &[Value]) -> Result<ObjId, RuntimeError>;

/// Heap-backed implementation of the [`Runtime`] trait.
///
/// Instances live in an arena and are addressed by [`ObjId`]; member slots,
/// collection items, and dictionary entries all preserve their assignment
/// order. Converter behavior and provide-value hooks are bound here,
/// against the handles the schema allocated.
pub struct ObjectRuntime<'s> {
    schema: &'s Schema,
    objects: Vec<Instance>,
    converters: Vec<Option<Box<dyn Converter>>>,
    providers: FxHashMap<TypeId, ProvideValueFn>,
    factories: FxHashMap<(TypeId, String), FactoryFn>,
}

impl<'s> ObjectRuntime<'s> {
    pub fn new(schema: &'s Schema) -> Self {
        let mut converters = Vec::new();
        converters.resize_with(schema.type_count().max(64), || None);
        let mut rt = Self {
            schema,
            objects: Vec::new(),
            converters,
            providers: FxHashMap::default(),
            factories: FxHashMap::default(),
        };
        rt.bind_standard_converters();
        rt
    }

    /// Bind the built-in converters to their well-known schema names, where
    /// the schema registered them.
    fn bind_standard_converters(&mut self) {
        let standard: [(&str, Box<dyn Converter>); 5] = [
            ("int", Box::new(IntConverter)),
            ("float", Box::new(FloatConverter)),
            ("bool", Box::new(BoolConverter)),
            ("string", Box::new(StringConverter)),
            ("name-ref", Box::new(NameRefConverter)),
        ];
        for (name, behavior) in standard {
            if let Some(id) = self.schema.resolve_converter(name) {
                self.bind_converter(id, behavior);
            }
        }
    }

    /// Bind conversion behavior to a converter handle.
    pub fn bind_converter(&mut self, id: ConverterId, behavior: Box<dyn Converter>) {
        let idx = id.0 as usize;
        if idx >= self.converters.len() {
            self.converters.resize_with(idx + 1, || None);
        }
        self.converters[idx] = Some(behavior);
    }

    /// Bind provide-value behavior to a markup-extension type.
    pub fn bind_extension(&mut self, ty: TypeId, provider: ProvideValueFn) {
        self.providers.insert(ty, provider);
    }

    /// Bind the built-in by-name reference behavior to an extension type:
    /// provide-value resolves the first positional argument as a name.
    pub fn bind_reference_extension(&mut self, ty: TypeId) {
        self.bind_extension(ty, reference_provide_value);
    }

    /// Register a factory method for `create_with_factory`.
    pub fn bind_factory(&mut self, ty: TypeId, method: &str, factory: FactoryFn) {
        self.factories.insert((ty, method.to_string()), factory);
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    /// The instance behind a handle.
    pub fn instance(&self, id: ObjId) -> &Instance {
        &self.objects[id.0 as usize]
    }

    fn instance_mut(&mut self, id: ObjId) -> &mut Instance {
        &mut self.objects[id.0 as usize]
    }

    fn qualified(&self, ty: TypeId) -> String {
        self.schema.ty(ty).qualified_name()
    }

    /// Allocate a raw instance. Used by factories as well as
    /// `create_instance`.
    pub fn alloc(&mut self, ty: TypeId, ctor_args: Vec<Value>) -> ObjId {
        let id = ObjId(self.objects.len() as u32);
        self.objects.push(Instance {
            ty,
            ctor_args,
            slots: FxHashMap::default(),
            slot_order: Vec::new(),
            items: Vec::new(),
            entries: Vec::new(),
            state: InitState::Constructed,
        });
        id
    }
}

/// Whether a scalar already has the kind the named converter produces.
/// Unknown converters match nothing, forcing the convert-and-retry path.
fn scalar_matches_converter(scalar: &lattice_common::Scalar, converter: &str) -> bool {
    use lattice_common::Scalar;
    matches!(
        (converter, scalar),
        ("string", Scalar::Text(_))
            | ("int", Scalar::Int(_))
            | ("float", Scalar::Float(_))
            | ("bool", Scalar::Bool(_))
    )
}

fn reference_provide_value(
    rt: &ObjectRuntime,
    ext: ObjId,
    resolver: &dyn NameResolver,
) -> Result<Provided, RuntimeError> {
    let inst = rt.instance(ext);
    let name = inst
        .ctor_args()
        .first()
        .and_then(Value::as_text)
        .ok_or_else(|| RuntimeError::UnsetMember {
            ty: rt.qualified(inst.ty()),
            member: "PositionalParameters".to_string(),
        })?;
    match resolver.resolve_name(name) {
        Some(value) => Ok(Provided::Value(value)),
        None => Ok(Provided::Pending {
            names: vec![name.to_string()],
            assign_direct: true,
        }),
    }
}

impl Runtime for ObjectRuntime<'_> {
    fn type_of(&self, obj: ObjId) -> TypeId {
        self.instance(obj).ty()
    }

    fn create_instance(&mut self, ty: TypeId, args: &[Value]) -> Result<ObjId, RuntimeError> {
        let desc = self.schema.ty(ty);
        if !desc.constructible {
            return Err(RuntimeError::NotConstructible {
                ty: desc.qualified_name(),
            });
        }
        // Zero-arg construction is always allowed; positional construction
        // must match the declared parameter list by arity.
        if !args.is_empty() && desc.ctor_params.len() != args.len() {
            return Err(RuntimeError::CtorArityMismatch {
                ty: desc.qualified_name(),
                expected: desc.ctor_params.len(),
                found: args.len(),
            });
        }
        Ok(self.alloc(ty, args.to_vec()))
    }

    fn create_with_factory(
        &mut self,
        ty: TypeId,
        method: &str,
        args: &[Value],
    ) -> Result<ObjId, RuntimeError> {
        let Some(&factory) = self.factories.get(&(ty, method.to_string())) else {
            return Err(RuntimeError::UnknownFactory {
                ty: self.qualified(ty),
                method: method.to_string(),
            });
        };
        factory(self, args)
    }

    fn get_value(&mut self, obj: ObjId, member: MemberId) -> Result<Value, RuntimeError> {
        if let Some(value) = self.instance(obj).get(member) {
            return Ok(value.clone());
        }
        // Implicit default: container-typed members materialize an empty
        // container on first read, so GetObject can retrieve it.
        let member_desc = self.schema.member(member);
        if let Some(member_ty) = member_desc.ty {
            let ty_desc = self.schema.ty(member_ty);
            if ty_desc.collection || ty_desc.dictionary {
                let container = self.alloc(member_ty, Vec::new());
                self.set_value(obj, member, Value::Object(container))?;
                return Ok(Value::Object(container));
            }
        }
        Err(RuntimeError::UnsetMember {
            ty: self.qualified(self.instance(obj).ty()),
            member: member_desc.name.clone(),
        })
    }

    fn set_value(&mut self, obj: ObjId, member: MemberId, value: Value) -> Result<(), RuntimeError> {
        let inst = self.instance_mut(obj);
        if inst.slots.insert(member, value).is_none() {
            inst.slot_order.push(member);
        }
        Ok(())
    }

    fn add(&mut self, collection: ObjId, item: Value) -> Result<(), RuntimeError> {
        let ty = self.instance(collection).ty();
        let desc = self.schema.ty(ty);
        if !desc.collection {
            return Err(RuntimeError::NotACollection {
                ty: desc.qualified_name(),
            });
        }
        if let (Some(item_ty), Some(obj)) = (desc.item_type, item.as_object()) {
            let actual = self.instance(obj).ty();
            if !self.schema.is_assignable(actual, item_ty) {
                return Err(RuntimeError::ItemTypeMismatch {
                    container: desc.qualified_name(),
                    item: self.qualified(actual),
                });
            }
        }
        self.instance_mut(collection).items.push(item);
        Ok(())
    }

    fn add_to_dictionary(
        &mut self,
        dict: ObjId,
        key: Value,
        item: Value,
    ) -> Result<(), RuntimeError> {
        let ty = self.instance(dict).ty();
        let desc = self.schema.ty(ty);
        if !desc.dictionary {
            return Err(RuntimeError::NotADictionary {
                ty: desc.qualified_name(),
            });
        }
        if let Some(key_ty) = desc.key_type {
            match &key {
                Value::Object(obj) => {
                    let actual = self.instance(*obj).ty();
                    if !self.schema.is_assignable(actual, key_ty) {
                        return Err(RuntimeError::ItemTypeMismatch {
                            container: desc.qualified_name(),
                            item: self.qualified(actual),
                        });
                    }
                }
                Value::Scalar(s) => {
                    // A scalar key is "converted" when its kind matches what
                    // the key type's converter produces; anything else is
                    // rejected so the caller can convert and retry once.
                    if let Some(conv) = self.schema.ty(key_ty).converter {
                        if !scalar_matches_converter(s, self.schema.converter_name(conv)) {
                            return Err(RuntimeError::KeyTypeMismatch {
                                ty: desc.qualified_name(),
                                key: s.to_string(),
                            });
                        }
                    }
                }
                Value::Buffer(_) => {
                    return Err(RuntimeError::KeyTypeMismatch {
                        ty: desc.qualified_name(),
                        key: "<buffer>".to_string(),
                    });
                }
            }
        }
        self.instance_mut(dict).entries.push((key, item));
        Ok(())
    }

    fn begin_init(&mut self, obj: ObjId) -> Result<(), RuntimeError> {
        let ty = self.instance(obj).ty();
        let inst = self.instance_mut(obj);
        if inst.state != InitState::Constructed {
            return Err(RuntimeError::InitOutOfOrder {
                ty: self.qualified(ty),
            });
        }
        inst.state = InitState::Initializing;
        Ok(())
    }

    fn end_init(&mut self, obj: ObjId) -> Result<(), RuntimeError> {
        let ty = self.instance(obj).ty();
        let inst = self.instance_mut(obj);
        if inst.state != InitState::Initializing {
            return Err(RuntimeError::InitOutOfOrder {
                ty: self.qualified(ty),
            });
        }
        inst.state = InitState::Ready;
        Ok(())
    }

    fn call_provide_value(
        &mut self,
        ext: ObjId,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError> {
        // Walk the base chain for a bound provider.
        let mut probe = Some(self.instance(ext).ty());
        while let Some(ty) = probe {
            if let Some(&provider) = self.providers.get(&ty) {
                return provider(self, ext, resolver);
            }
            probe = self.schema.ty(ty).base;
        }
        Err(RuntimeError::NotAnExtension {
            ty: self.qualified(self.instance(ext).ty()),
        })
    }

    fn create_from_converted_value(
        &mut self,
        converter: ConverterId,
        text: &str,
        resolver: &dyn NameResolver,
    ) -> Result<Provided, RuntimeError> {
        let name = self.schema.converter_name(converter).to_string();
        let Some(behavior) = self.converters.get(converter.0 as usize).and_then(Option::as_ref)
        else {
            return Err(RuntimeError::UnboundConverter { name });
        };
        behavior
            .convert(text, resolver)
            .map_err(|reason| RuntimeError::ConversionFailed {
                converter: name,
                text: text.to_string(),
                reason,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::EmptyResolver;
    use lattice_common::Scalar;

    fn schema() -> Schema {
        let mut b = Schema::builder();
        let string_conv = b.add_converter("string");
        let name_conv = b.add_converter("name-ref");
        let string = b.add_type("std", "String");
        b.set_type_converter(string, string_conv);
        let obj = b.add_type("demo", "Object");
        let list = b.add_type("demo", "List");
        b.mark_collection(list, obj);
        let map = b.add_type("demo", "Map");
        b.mark_dictionary(map, string, obj);
        let int_conv = b.add_converter("int");
        let int = b.add_type("std", "Int");
        b.set_type_converter(int, int_conv);
        let by_number = b.add_type("demo", "ByNumber");
        b.mark_dictionary(by_number, int, obj);
        let panel = b.add_type("demo", "Panel");
        b.set_base(panel, obj);
        b.add_member(panel, "Children", list);
        let reference = b.add_type("demo", "Reference");
        b.set_base(reference, obj);
        b.mark_markup_extension(reference);
        b.set_ctor_params(reference, vec![("Name", string)]);
        let _ = name_conv;
        b.finish()
    }

    #[test]
    fn create_and_init_lifecycle() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let panel = schema.resolve_type("demo", "Panel").unwrap();
        let obj = rt.create_instance(panel, &[]).unwrap();
        rt.begin_init(obj).unwrap();
        assert!(!rt.instance(obj).is_ready());
        rt.end_init(obj).unwrap();
        assert!(rt.instance(obj).is_ready());
        // Double end-init is out of order.
        assert!(matches!(
            rt.end_init(obj),
            Err(RuntimeError::InitOutOfOrder { .. })
        ));
    }

    #[test]
    fn get_value_materializes_container_default() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let panel_ty = schema.resolve_type("demo", "Panel").unwrap();
        let children = schema.resolve_member(panel_ty, "Children").unwrap();
        let panel = rt.create_instance(panel_ty, &[]).unwrap();

        let first = rt.get_value(panel, children).unwrap();
        let second = rt.get_value(panel, children).unwrap();
        // Same implicit instance on repeated reads.
        assert_eq!(first, second);
        let list = first.as_object().unwrap();
        rt.add(list, Value::Object(panel)).unwrap();
        assert_eq!(rt.instance(list).items().len(), 1);
    }

    #[test]
    fn add_rejects_non_collections() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let panel = schema.resolve_type("demo", "Panel").unwrap();
        let obj = rt.create_instance(panel, &[]).unwrap();
        assert!(matches!(
            rt.add(obj, Value::Scalar(Scalar::Int(1))),
            Err(RuntimeError::NotACollection { .. })
        ));
    }

    #[test]
    fn dictionary_accepts_keys_of_the_converted_kind() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let map_ty = schema.resolve_type("demo", "Map").unwrap();
        let map = rt.create_instance(map_ty, &[]).unwrap();
        // A text key already has the kind the string converter produces.
        rt.add_to_dictionary(map, Value::Scalar("k".into()), Value::Scalar(Scalar::Int(1)))
            .unwrap();
        assert_eq!(rt.instance(map).entries().len(), 1);
    }

    #[test]
    fn dictionary_rejects_unconverted_scalar_key() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let by_number = schema.resolve_type("demo", "ByNumber").unwrap();
        let map = rt.create_instance(by_number, &[]).unwrap();
        // An int-keyed dictionary sees raw text as unconverted.
        let err = rt
            .add_to_dictionary(map, Value::Scalar("3".into()), Value::Scalar(Scalar::Int(1)))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::KeyTypeMismatch { .. }));
        rt.add_to_dictionary(map, Value::Scalar(Scalar::Int(3)), Value::Scalar(Scalar::Int(1)))
            .unwrap();
        assert_eq!(rt.instance(map).entries().len(), 1);
    }

    #[test]
    fn reference_extension_pends_then_resolves() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let ref_ty = schema.resolve_type("demo", "Reference").unwrap();
        rt.bind_reference_extension(ref_ty);
        let ext = rt
            .create_instance(ref_ty, &[Value::Scalar("b1".into())])
            .unwrap();

        let pending = rt.call_provide_value(ext, &EmptyResolver).unwrap();
        assert!(matches!(pending, Provided::Pending { .. }));

        struct One(ObjId);
        impl NameResolver for One {
            fn resolve_name(&self, name: &str) -> Option<Value> {
                (name == "b1").then_some(Value::Object(self.0))
            }
        }
        let got = rt.call_provide_value(ext, &One(ext)).unwrap();
        assert_eq!(got, Provided::Value(Value::Object(ext)));
    }

    #[test]
    fn converted_value_through_registry() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let string = schema.resolve_converter("string").unwrap();
        let got = rt
            .create_from_converted_value(string, "hello", &EmptyResolver)
            .unwrap();
        assert_eq!(got, Provided::Value(Value::Scalar("hello".into())));
    }

    #[test]
    fn ctor_arity_checked_when_args_present() {
        let schema = schema();
        let mut rt = ObjectRuntime::new(&schema);
        let ref_ty = schema.resolve_type("demo", "Reference").unwrap();
        assert!(matches!(
            rt.create_instance(ref_ty, &[Value::Scalar("a".into()), Value::Scalar("b".into())]),
            Err(RuntimeError::CtorArityMismatch { expected: 1, found: 2, .. })
        ));
    }
}
