//! Cycle-safe JSON dump of a constructed object graph.
//!
//! Used by the CLI's `build` output and by integration tests that compare
//! whole graphs structurally. Objects are tagged with `$id`/`$type`;
//! revisiting an object (cycles, shared references) emits `{"$ref": id}`
//! instead of recursing.

use rustc_hash::FxHashSet;
use serde_json::{json, Map, Value as Json};

use crate::heap::ObjectRuntime;
use crate::value::{ObjId, Value};
use lattice_common::Scalar;

impl ObjectRuntime<'_> {
    /// Render a graph value as JSON.
    pub fn dump(&self, value: &Value) -> Json {
        let mut seen = FxHashSet::default();
        self.dump_value(value, &mut seen)
    }

    fn dump_value(&self, value: &Value, seen: &mut FxHashSet<ObjId>) -> Json {
        match value {
            Value::Scalar(s) => dump_scalar(s),
            Value::Buffer(buf) => json!({ "$buffer": buf }),
            Value::Object(id) => {
                if !seen.insert(*id) {
                    return json!({ "$ref": id.0 });
                }
                self.dump_object(*id, seen)
            }
        }
    }

    fn dump_object(&self, id: ObjId, seen: &mut FxHashSet<ObjId>) -> Json {
        let inst = self.instance(id);
        let mut map = Map::new();
        map.insert("$id".to_string(), json!(id.0));
        map.insert(
            "$type".to_string(),
            json!(self.schema().ty(inst.ty()).qualified_name()),
        );
        for (member, value) in inst.members() {
            let name = self.schema().member(member).name.clone();
            map.insert(name, self.dump_value(value, seen));
        }
        if !inst.items().is_empty() {
            let items: Vec<Json> = inst
                .items()
                .iter()
                .map(|item| self.dump_value(item, seen))
                .collect();
            map.insert("$items".to_string(), Json::Array(items));
        }
        if !inst.entries().is_empty() {
            let entries: Vec<Json> = inst
                .entries()
                .iter()
                .map(|(k, v)| {
                    json!([self.dump_value(k, seen), self.dump_value(v, seen)])
                })
                .collect();
            map.insert("$entries".to_string(), Json::Array(entries));
        }
        Json::Object(map)
    }
}

fn dump_scalar(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::Text(s) => json!(s),
        Scalar::Int(i) => json!(i),
        Scalar::Float(x) => json!(x),
        Scalar::Bool(b) => json!(b),
        Scalar::Null => Json::Null,
    }
}
