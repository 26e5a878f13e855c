use lattice_common::Scalar;

use crate::value::{NameResolver, Provided, Value};

/// Text-to-value conversion behavior bound to a schema converter handle.
///
/// A converter either produces a value, reports the names it still needs
/// (via [`Provided::Pending`]), or rejects the text with a reason string.
/// The rejection becomes a fatal conversion error at the call site.
pub trait Converter {
    fn convert(&self, text: &str, resolver: &dyn NameResolver) -> Result<Provided, String>;
}

/// Parses signed decimal integers.
pub struct IntConverter;

impl Converter for IntConverter {
    fn convert(&self, text: &str, _resolver: &dyn NameResolver) -> Result<Provided, String> {
        text.trim()
            .parse::<i64>()
            .map(|n| Provided::Value(Value::Scalar(Scalar::Int(n))))
            .map_err(|e| e.to_string())
    }
}

/// Parses floating-point numbers.
pub struct FloatConverter;

impl Converter for FloatConverter {
    fn convert(&self, text: &str, _resolver: &dyn NameResolver) -> Result<Provided, String> {
        text.trim()
            .parse::<f64>()
            .map(|x| Provided::Value(Value::Scalar(Scalar::Float(x))))
            .map_err(|e| e.to_string())
    }
}

/// Accepts `true` and `false`.
pub struct BoolConverter;

impl Converter for BoolConverter {
    fn convert(&self, text: &str, _resolver: &dyn NameResolver) -> Result<Provided, String> {
        match text.trim() {
            "true" => Ok(Provided::Value(Value::Scalar(Scalar::Bool(true)))),
            "false" => Ok(Provided::Value(Value::Scalar(Scalar::Bool(false)))),
            other => Err(format!("expected `true` or `false`, got `{other}`")),
        }
    }
}

/// Passes text through unchanged.
pub struct StringConverter;

impl Converter for StringConverter {
    fn convert(&self, text: &str, _resolver: &dyn NameResolver) -> Result<Provided, String> {
        Ok(Provided::Value(Value::Scalar(Scalar::Text(text.to_string()))))
    }
}

/// Resolves the text as a registered object name.
///
/// If the name is not in scope yet, reports it as pending with
/// `assign_direct` set: once the name resolves, the named value itself is
/// the result, so the caller can assign it without re-running the
/// conversion.
pub struct NameRefConverter;

impl Converter for NameRefConverter {
    fn convert(&self, text: &str, resolver: &dyn NameResolver) -> Result<Provided, String> {
        let name = text.trim();
        if name.is_empty() {
            return Err("empty name reference".to_string());
        }
        match resolver.resolve_name(name) {
            Some(value) => Ok(Provided::Value(value)),
            None => Ok(Provided::Pending {
                names: vec![name.to_string()],
                assign_direct: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EmptyResolver, ObjId};
    use rustc_hash::FxHashMap;

    struct MapResolver(FxHashMap<String, Value>);

    impl NameResolver for MapResolver {
        fn resolve_name(&self, name: &str) -> Option<Value> {
            self.0.get(name).cloned()
        }
    }

    #[test]
    fn int_converter_parses_and_rejects() {
        let ok = IntConverter.convert(" 42 ", &EmptyResolver).unwrap();
        assert_eq!(ok, Provided::Value(Value::Scalar(Scalar::Int(42))));
        assert!(IntConverter.convert("4x", &EmptyResolver).is_err());
    }

    #[test]
    fn bool_converter_is_strict() {
        assert!(BoolConverter.convert("yes", &EmptyResolver).is_err());
        assert_eq!(
            BoolConverter.convert("false", &EmptyResolver).unwrap(),
            Provided::Value(Value::Scalar(Scalar::Bool(false)))
        );
    }

    #[test]
    fn name_ref_resolves_in_scope() {
        let mut names = FxHashMap::default();
        names.insert("b1".to_string(), Value::Object(ObjId(7)));
        let resolver = MapResolver(names);
        let got = NameRefConverter.convert("b1", &resolver).unwrap();
        assert_eq!(got, Provided::Value(Value::Object(ObjId(7))));
    }

    #[test]
    fn name_ref_pends_out_of_scope() {
        let got = NameRefConverter.convert("later", &EmptyResolver).unwrap();
        match got {
            Provided::Pending { names, assign_direct } => {
                assert_eq!(names, vec!["later".to_string()]);
                assert!(assign_direct);
            }
            other => panic!("expected Pending, got {other:?}"),
        }
    }
}
