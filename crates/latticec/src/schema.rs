//! Schema configuration for the CLI.
//!
//! A schema file is TOML with one `[[type]]` entry per markup type.
//! Registration is two-pass so entries can reference types declared later
//! in the file. When no file is given, the CLI falls back to a built-in
//! demo schema covering a small widget vocabulary.
//!
//! ```toml
//! default_namespace = "app"
//!
//! [[type]]
//! name = "app:Widget"
//!
//! [[type]]
//! name = "app:Button"
//! base = "app:Widget"
//!
//! [[type.member]]
//! name = "Label"
//! type = "std:String"
//! ```

use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::Path;

use lattice_common::TypeId;
use lattice_runtime::ObjectRuntime;
use lattice_schema::Schema;

/// A schema plus the CLI-level facts that do not live in the descriptor
/// tables: the default namespace for bare names in scripts, and which
/// types get the built-in by-name reference behavior.
pub struct LoadedSchema {
    pub schema: Schema,
    pub default_namespace: String,
    extension_types: Vec<TypeId>,
}

impl LoadedSchema {
    /// A runtime over this schema with standard converters and reference
    /// extensions bound.
    pub fn runtime(&self) -> ObjectRuntime<'_> {
        let mut rt = ObjectRuntime::new(&self.schema);
        for &ty in &self.extension_types {
            rt.bind_reference_extension(ty);
        }
        rt
    }
}

// ── TOML Format ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default = "default_namespace")]
    default_namespace: String,
    #[serde(default, rename = "type")]
    types: Vec<TypeEntry>,
}

fn default_namespace() -> String {
    "app".to_string()
}

#[derive(Debug, Deserialize)]
struct TypeEntry {
    name: String,
    #[serde(default)]
    base: Option<String>,
    /// Converter used for initialization text and scalar assignment.
    #[serde(default)]
    converter: Option<String>,
    #[serde(default = "yes")]
    constructible: bool,
    /// Bind the built-in by-name reference behavior to this type.
    #[serde(default)]
    extension: bool,
    #[serde(default)]
    collection: Option<ContainerEntry>,
    #[serde(default)]
    dictionary: Option<ContainerEntry>,
    #[serde(default)]
    ctor: Vec<CtorEntry>,
    #[serde(default, rename = "member")]
    members: Vec<MemberEntry>,
}

fn yes() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ContainerEntry {
    #[serde(default)]
    key: Option<String>,
    item: String,
}

#[derive(Debug, Deserialize)]
struct CtorEntry {
    name: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Debug, Deserialize)]
struct MemberEntry {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    deferred: bool,
    #[serde(default)]
    attachable: bool,
    #[serde(default)]
    converter: Option<String>,
}

// ── Loading ────────────────────────────────────────────────────────────

/// Read and build a schema from a TOML file.
pub fn from_file(path: &Path) -> Result<LoadedSchema, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    from_str(&content)
}

/// Build a schema from TOML text.
pub fn from_str(content: &str) -> Result<LoadedSchema, String> {
    let file: SchemaFile =
        toml::from_str(content).map_err(|e| format!("Failed to parse schema: {}", e))?;

    let mut b = Schema::builder();
    let mut ids: FxHashMap<String, TypeId> = FxHashMap::default();

    // Pass 1: allocate every type so later entries can reference earlier
    // and later ones alike.
    for entry in &file.types {
        let (ns, name) = split_name(&entry.name, &file.default_namespace);
        let id = b.add_type(ns, name);
        ids.insert(format!("{ns}:{name}"), id);
    }

    let lookup = |ids: &FxHashMap<String, TypeId>, name: &str| -> Result<TypeId, String> {
        let (ns, bare) = split_name(name, &file.default_namespace);
        ids.get(&format!("{ns}:{bare}"))
            .copied()
            .ok_or_else(|| format!("schema references unknown type `{name}`"))
    };

    // Pass 2: wire capabilities and members.
    let mut extension_types = Vec::new();
    for entry in &file.types {
        let (ns, name) = split_name(&entry.name, &file.default_namespace);
        let id = ids[&format!("{ns}:{name}")];

        if let Some(base) = &entry.base {
            let base = lookup(&ids, base)?;
            b.set_base(id, base);
        }
        if let Some(conv) = &entry.converter {
            let conv = b.add_converter(conv);
            b.set_type_converter(id, conv);
        }
        if !entry.constructible {
            b.set_constructible(id, false);
        }
        if entry.extension {
            b.mark_markup_extension(id);
            extension_types.push(id);
        }
        if let Some(coll) = &entry.collection {
            let item = lookup(&ids, &coll.item)?;
            b.mark_collection(id, item);
        }
        if let Some(dict) = &entry.dictionary {
            let key = dict
                .key
                .as_deref()
                .ok_or_else(|| format!("dictionary `{}` needs a key type", entry.name))?;
            let key = lookup(&ids, key)?;
            let item = lookup(&ids, &dict.item)?;
            b.mark_dictionary(id, key, item);
        }
        if !entry.ctor.is_empty() {
            let mut params = Vec::new();
            for p in &entry.ctor {
                params.push((p.name.as_str(), lookup(&ids, &p.ty)?));
            }
            b.set_ctor_params(id, params);
        }
        for m in &entry.members {
            let value_ty = lookup(&ids, &m.ty)?;
            let member = if m.attachable {
                b.add_attachable(id, &m.name, value_ty)
            } else {
                b.add_member(id, &m.name, value_ty)
            };
            if m.deferred {
                b.mark_deferred(member);
            }
            if let Some(conv) = &m.converter {
                let conv = b.add_converter(conv);
                b.set_member_converter(member, conv);
            }
        }
    }

    Ok(LoadedSchema {
        schema: b.finish(),
        default_namespace: file.default_namespace,
        extension_types,
    })
}

fn split_name<'a>(name: &'a str, default_ns: &'a str) -> (&'a str, &'a str) {
    match name.split_once(':') {
        Some((ns, bare)) => (ns, bare),
        None => (default_ns, name),
    }
}

// ── Built-In Demo Schema ───────────────────────────────────────────────

/// The widget vocabulary used when no schema file is given.
pub fn built_in() -> LoadedSchema {
    let mut b = Schema::builder();
    let string_conv = b.add_converter("string");
    let int_conv = b.add_converter("int");
    let float_conv = b.add_converter("float");
    let bool_conv = b.add_converter("bool");
    let name_conv = b.add_converter("name-ref");

    let string = b.add_type("std", "String");
    b.set_type_converter(string, string_conv);
    let int = b.add_type("std", "Int");
    b.set_type_converter(int, int_conv);
    let float = b.add_type("std", "Float");
    b.set_type_converter(float, float_conv);
    let boolean = b.add_type("std", "Bool");
    b.set_type_converter(boolean, bool_conv);

    let object = b.add_type("demo", "Object");
    let list = b.add_type("demo", "List");
    b.mark_collection(list, object);
    let map = b.add_type("demo", "Map");
    b.mark_dictionary(map, string, object);

    let control = b.add_type("demo", "Control");
    b.set_base(control, object);
    b.add_member(control, "Width", int);
    b.add_member(control, "Height", int);
    b.add_member(control, "Opacity", float);
    b.add_member(control, "Resources", map);

    let button = b.add_type("demo", "Button");
    b.set_base(button, control);
    b.add_member(button, "Text", string);

    let border = b.add_type("demo", "Border");
    b.set_base(border, control);
    b.add_member(border, "Child", object);
    // Scalar assignment to Background is a by-name reference.
    let background = b.add_member(border, "Background", object);
    b.set_member_converter(background, name_conv);

    let panel = b.add_type("demo", "Panel");
    b.set_base(panel, control);
    b.add_member(panel, "Children", list);

    let host = b.add_type("demo", "ContentHost");
    b.set_base(host, control);
    let template = b.add_member(host, "Template", object);
    b.mark_deferred(template);

    let point = b.add_type("demo", "Point");
    b.set_ctor_params(point, vec![("X", int), ("Y", int)]);

    let reference = b.add_type("demo", "Reference");
    b.set_base(reference, object);
    b.mark_markup_extension(reference);
    b.set_ctor_params(reference, vec![("Name", string)]);

    b.add_attachable(object, "Dock.Side", string);

    LoadedSchema {
        schema: b.finish(),
        default_namespace: "demo".to_string(),
        extension_types: vec![reference],
    }
}
