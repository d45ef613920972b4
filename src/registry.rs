//! Built-in scalar codecs and registered enums, owned by one schema.
use std::any::TypeId;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use serde_json::Value as Json;

use crate::error::SchemaError;
use crate::naming;
use crate::value::ConstValue;

/// Host representation behind a scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Boolean,
    Int,
    Float,
    String,
}

pub const UPLOAD_SCALAR: &str = "Upload";

type Serialize = fn(&ConstValue) -> Result<Json, String>;
type Parse = fn(&ConstValue, DataKind) -> Result<Json, String>;

pub struct Scalar {
    pub name: &'static str,
    pub description: &'static str,
    serialize: Serialize,
    parse: Parse,
}

impl Scalar {
    /// Output coercion: resolver leaf → wire literal.
    pub fn serialize(&self, value: &ConstValue) -> Result<Json, String> {
        (self.serialize)(value)
    }

    /// Input coercion: literal or variable → the JSON shape `repr` deserializes from.
    pub fn parse(&self, value: &ConstValue, repr: DataKind) -> Result<Json, String> {
        (self.parse)(value, repr)
    }
}

fn mismatch(scalar: &str, value: &ConstValue) -> String {
    format!("{scalar} cannot represent {}: {value}", value.kind_name())
}

fn float_json(f: f64) -> Result<Json, String> {
    serde_json::Number::from_f64(f)
        .map(Json::Number)
        .ok_or_else(|| format!("Float cannot represent non-finite value: {f}"))
}

const BOOLEAN: Scalar = Scalar {
    name: "Boolean",
    description: "The `Boolean` scalar type represents `true` or `false`.",
    serialize: |v| match v {
        ConstValue::Boolean(b) => Ok(Json::Bool(*b)),
        other => Err(mismatch("Boolean", other)),
    },
    parse: |v, _| match v {
        ConstValue::Boolean(b) => Ok(Json::Bool(*b)),
        other => Err(mismatch("Boolean", other)),
    },
};

fn int32(i: i64) -> Result<Json, String> {
    i32::try_from(i)
        .map(Json::from)
        .map_err(|_| format!("Int cannot represent non 32-bit signed integer value: {i}"))
}

/// Int is 32-bit on the wire whatever the host integer is.
const INT: Scalar = Scalar {
    name: "Int",
    description: "The `Int` scalar type represents non-fractional signed whole numeric values. Int can represent values between -(2^31) and 2^31 - 1.",
    serialize: |v| match v {
        ConstValue::Int(i) => int32(*i),
        // Host integers wider than i64 arrive as integral floats.
        ConstValue::Float(f) if f.fract() == 0.0 => Err(format!("Int cannot represent non 32-bit signed integer value: {f}")),
        other => Err(mismatch("Int", other)),
    },
    parse: |v, _| match v {
        ConstValue::Int(i) => int32(*i),
        other => Err(mismatch("Int", other)),
    },
};

const FLOAT: Scalar = Scalar {
    name: "Float",
    description: "The `Float` scalar type represents signed double-precision fractional values.",
    serialize: |v| match v {
        ConstValue::Float(f) => float_json(*f),
        ConstValue::Int(i) => float_json(*i as f64),
        other => Err(mismatch("Float", other)),
    },
    parse: |v, _| match v {
        ConstValue::Float(f) => float_json(*f),
        ConstValue::Int(i) => float_json(*i as f64),
        other => Err(mismatch("Float", other)),
    },
};

const STRING: Scalar = Scalar {
    name: "String",
    description: "The `String` scalar type represents textual data, represented as UTF-8 character sequences.",
    serialize: |v| match v {
        ConstValue::String(s) => Ok(Json::String(s.clone())),
        other => Err(mismatch("String", other)),
    },
    parse: |v, _| match v {
        ConstValue::String(s) => Ok(Json::String(s.clone())),
        other => Err(mismatch("String", other)),
    },
};

const ID: Scalar = Scalar {
    name: "ID",
    description: "The `ID` scalar type represents a unique identifier, serialized as a String.",
    serialize: |v| match v {
        ConstValue::String(s) => Ok(Json::String(s.clone())),
        ConstValue::Int(i) => Ok(Json::String(i.to_string())),
        other => Err(mismatch("ID", other)),
    },
    parse: |v, repr| match (v, repr) {
        (ConstValue::String(s), DataKind::Int) => s
            .parse::<i64>()
            .map(Json::from)
            .map_err(|_| format!("ID backed by an integer cannot represent \"{s}\"")),
        (ConstValue::String(s), _) => Ok(Json::String(s.clone())),
        (ConstValue::Int(i), DataKind::Int) => Ok(Json::from(*i)),
        (ConstValue::Int(i), _) => Ok(Json::String(i.to_string())),
        (other, _) => Err(mismatch("ID", other)),
    },
};

const UPLOAD: Scalar = Scalar {
    name: UPLOAD_SCALAR,
    description: "The name of a file part in a multipart request.",
    serialize: |v| Err(format!("Upload is an input-only scalar, got {v}")),
    parse: |v, _| match v {
        ConstValue::String(s) => Ok(Json::String(s.clone())),
        other => Err(mismatch("Upload", other)),
    },
};

#[derive(Debug, Clone)]
pub struct EnumType {
    pub name: String,
    pub description: Option<String>,
    pub type_id: TypeId,
    /// Sorted.
    pub values: Vec<String>,
}

impl EnumType {
    pub fn contains(&self, symbol: &str) -> bool {
        self.values.binary_search_by(|v| v.as_str().cmp(symbol)).is_ok()
    }
}

pub struct Registry {
    scalars: BTreeMap<&'static str, Scalar>,
    enums: BTreeMap<String, EnumType>,
    enum_names: HashMap<TypeId, String>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let scalars = [BOOLEAN, INT, FLOAT, STRING, ID]
            .into_iter()
            .map(|s| (s.name, s))
            .collect();
        Self { scalars, enums: BTreeMap::new(), enum_names: HashMap::new() }
    }

    pub fn scalar_name(kind: DataKind, is_id: bool) -> &'static str {
        if is_id {
            return ID.name;
        }
        match kind {
            DataKind::Boolean => BOOLEAN.name,
            DataKind::Int => INT.name,
            DataKind::Float => FLOAT.name,
            DataKind::String => STRING.name,
        }
    }

    pub fn scalar(&self, name: &str) -> Option<&Scalar> {
        self.scalars.get(name)
    }

    pub fn data_scalar(&self, kind: DataKind, is_id: bool) -> &Scalar {
        match Self::scalar_name(kind, is_id) {
            "Boolean" => &BOOLEAN,
            "Int" => &INT,
            "Float" => &FLOAT,
            "ID" => &ID,
            _ => &STRING,
        }
    }

    pub fn upload(&self) -> &Scalar {
        &UPLOAD
    }

    pub(crate) fn enable_upload(&mut self) {
        self.scalars.entry(UPLOAD.name).or_insert(UPLOAD);
    }

    pub fn scalars(&self) -> impl Iterator<Item = &Scalar> {
        self.scalars.values()
    }

    pub fn is_scalar(&self, name: &str) -> bool {
        self.scalars.contains_key(name)
    }

    pub fn register_enum(
        &mut self,
        name: &str,
        description: Option<&str>,
        type_id: TypeId,
        symbols: &[&str],
    ) -> Result<(), SchemaError> {
        if !naming::is_valid_name(name) {
            return Err(SchemaError::InvalidName(name.to_string()));
        }
        if self.enums.contains_key(name) || self.enum_names.contains_key(&type_id) {
            return Err(SchemaError::DuplicateEnum(name.to_string()));
        }
        if self.scalars.contains_key(name) {
            return Err(SchemaError::DuplicateTypeName(name.to_string()));
        }
        if symbols.is_empty() {
            return Err(SchemaError::EmptyEnum(name.to_string()));
        }
        let mut values = BTreeSet::new();
        for symbol in symbols {
            if !naming::is_valid_name(symbol) || matches!(*symbol, "true" | "false" | "null") {
                return Err(SchemaError::InvalidName(symbol.to_string()));
            }
            if !values.insert(symbol.to_string()) {
                return Err(SchemaError::DuplicateEnumValue {
                    name: name.to_string(),
                    value: symbol.to_string(),
                });
            }
        }
        tracing::debug!(name, values = values.len(), "registered enum");
        self.enum_names.insert(type_id, name.to_string());
        self.enums.insert(
            name.to_string(),
            EnumType {
                name: name.to_string(),
                description: description.map(str::to_string),
                type_id,
                values: values.into_iter().collect(),
            },
        );
        Ok(())
    }

    pub fn enum_by_type(&self, type_id: TypeId) -> Option<&EnumType> {
        self.enum_names.get(&type_id).and_then(|name| self.enums.get(name))
    }

    pub fn enum_type(&self, name: &str) -> Option<&EnumType> {
        self.enums.get(name)
    }

    pub fn enums(&self) -> impl Iterator<Item = &EnumType> {
        self.enums.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtins_always_present() {
        let registry = Registry::new();
        for name in ["Boolean", "Int", "Float", "String", "ID"] {
            assert!(registry.is_scalar(name), "{name}");
        }
        assert!(!registry.is_scalar(UPLOAD_SCALAR));
    }

    #[test]
    fn id_accepts_string_and_int_and_serializes_as_string() {
        let registry = Registry::new();
        let id = registry.scalar("ID").unwrap();
        assert_eq!(id.parse(&ConstValue::Int(4), DataKind::String).unwrap(), json!("4"));
        assert_eq!(id.parse(&ConstValue::String("4".into()), DataKind::Int).unwrap(), json!(4));
        assert!(id.parse(&ConstValue::String("x".into()), DataKind::Int).is_err());
        assert!(id.parse(&ConstValue::Boolean(true), DataKind::String).is_err());
        assert_eq!(id.serialize(&ConstValue::Int(9)).unwrap(), json!("9"));
    }

    #[test]
    fn int_literal_is_a_legal_float() {
        let registry = Registry::new();
        let float = registry.scalar("Float").unwrap();
        assert_eq!(float.parse(&ConstValue::Int(2), DataKind::Float).unwrap(), json!(2.0));
        assert!(float.serialize(&ConstValue::Float(f64::NAN)).is_err());
        let int = registry.scalar("Int").unwrap();
        assert!(int.parse(&ConstValue::Float(2.5), DataKind::Int).is_err());
    }

    #[test]
    fn int_is_32_bit_both_ways() {
        let registry = Registry::new();
        let int = registry.scalar("Int").unwrap();
        let max = i64::from(i32::MAX);
        let min = i64::from(i32::MIN);
        assert_eq!(int.parse(&ConstValue::Int(max), DataKind::Int).unwrap(), json!(i32::MAX));
        assert_eq!(int.parse(&ConstValue::Int(min), DataKind::Int).unwrap(), json!(i32::MIN));
        assert_eq!(
            int.parse(&ConstValue::Int(max + 1), DataKind::Int),
            Err("Int cannot represent non 32-bit signed integer value: 2147483648".to_string())
        );
        assert!(int.parse(&ConstValue::Int(min - 1), DataKind::Int).is_err());

        assert_eq!(int.serialize(&ConstValue::Int(-7)).unwrap(), json!(-7));
        assert!(int.serialize(&ConstValue::Int(1 << 40)).is_err());
        assert!(int.serialize(&ConstValue::Float(u64::MAX as f64)).is_err());
    }

    #[test]
    fn enum_values_are_sorted_and_unique() {
        struct Color;
        let mut registry = Registry::new();
        registry
            .register_enum("Color", None, TypeId::of::<Color>(), &["Red", "Green", "Blue"])
            .unwrap();
        assert_eq!(registry.enum_type("Color").unwrap().values, ["Blue", "Green", "Red"]);
        assert!(registry.enum_by_type(TypeId::of::<Color>()).unwrap().contains("Green"));

        let again = registry.register_enum("Color", None, TypeId::of::<u8>(), &["A"]);
        assert_eq!(again, Err(SchemaError::DuplicateEnum("Color".into())));

        let dup = registry.register_enum("Shade", None, TypeId::of::<u16>(), &["A", "A"]);
        assert!(matches!(dup, Err(SchemaError::DuplicateEnumValue { .. })));
        let empty = registry.register_enum("Nothing", None, TypeId::of::<u32>(), &[]);
        assert_eq!(empty, Err(SchemaError::EmptyEnum("Nothing".into())));
    }
}
