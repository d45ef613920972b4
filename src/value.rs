//! Input values: literals in the query text and caller-supplied variables.
use std::fmt::{self, Display, Formatter};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// A value without variable references.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum ConstValue {
    #[default]
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    List(Vec<ConstValue>),
    Object(IndexMap<String, ConstValue>),
}

/// A literal as written in the query; may reference `$variables`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value")]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    Variable(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl ConstValue {
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(xs) => Self::List(xs.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(m) => {
                Self::Object(m.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Non-finite floats have no JSON form and become `null`.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => b.into(),
            Self::Int(i) => i.into(),
            Self::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::String(s) | Self::Enum(s) => s.into(),
            Self::List(xs) => xs.into_iter().map(Self::into_json).collect(),
            Self::Object(m) => serde_json::Value::Object(
                m.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "Boolean",
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::String(_) => "String",
            Self::Enum(_) => "enum value",
            Self::List(_) => "list",
            Self::Object(_) => "object",
        }
    }
}

impl Value {
    /// `Some` when the literal mentions no variable at any depth.
    pub fn as_const(&self) -> Option<ConstValue> {
        self.resolve(&mut |_| None).filter(|_| !self.has_variables())
    }

    pub fn has_variables(&self) -> bool {
        match self {
            Self::Variable(_) => true,
            Self::List(xs) => xs.iter().any(Self::has_variables),
            Self::Object(m) => m.values().any(Self::has_variables),
            _ => false,
        }
    }

    /// Substitutes variables. `None` means the value is absent: the top-level
    /// variable was not provided. Unprovided variables nested in an object drop
    /// that entry; nested in a list they become `null`.
    pub fn resolve(&self, lookup: &mut dyn FnMut(&str) -> Option<ConstValue>) -> Option<ConstValue> {
        Some(match self {
            Self::Null => ConstValue::Null,
            Self::Boolean(b) => ConstValue::Boolean(*b),
            Self::Int(i) => ConstValue::Int(*i),
            Self::Float(f) => ConstValue::Float(*f),
            Self::String(s) => ConstValue::String(s.clone()),
            Self::Enum(s) => ConstValue::Enum(s.clone()),
            Self::Variable(name) => return lookup(name),
            Self::List(xs) => ConstValue::List(
                xs.iter()
                    .map(|x| x.resolve(lookup).unwrap_or(ConstValue::Null))
                    .collect(),
            ),
            Self::Object(m) => ConstValue::Object(
                m.iter()
                    .filter_map(|(k, v)| v.resolve(lookup).map(|v| (k.clone(), v)))
                    .collect(),
            ),
        })
    }

    pub fn variables(&self, out: &mut Vec<String>) {
        match self {
            Self::Variable(name) => out.push(name.clone()),
            Self::List(xs) => xs.iter().for_each(|x| x.variables(out)),
            Self::Object(m) => m.values().for_each(|x| x.variables(out)),
            _ => {}
        }
    }
}

impl Display for ConstValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::String(s) => write!(f, "{}", serde_json::Value::from(s.as_str())),
            Self::Enum(s) => f.write_str(s),
            Self::List(xs) => {
                f.write_str("[")?;
                for (i, x) in xs.iter().enumerate() {
                    write!(f, "{}{x}", if i == 0 { "" } else { ", " })?;
                }
                f.write_str("]")
            }
            Self::Object(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    write!(f, "{}{k}: {v}", if i == 0 { "" } else { ", " })?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Caller-supplied `name → value` bindings for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variables(IndexMap<String, ConstValue>);

impl Variables {
    /// Anything but a JSON object (including `null`) yields no variables.
    pub fn from_json(value: serde_json::Value) -> Self {
        match ConstValue::from_json(value) {
            ConstValue::Object(m) => Self(m),
            _ => Self::default(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ConstValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ConstValue) {
        self.0.insert(name.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Variables {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = <Option<serde_json::Value>>::deserialize(deserializer)?;
        Ok(value.map(Self::from_json).unwrap_or_default())
    }
}

impl FromIterator<(String, ConstValue)> for Variables {
    fn from_iter<I: IntoIterator<Item = (String, ConstValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_numbers_keep_integer_shape() {
        assert_eq!(ConstValue::from_json(json!(3)), ConstValue::Int(3));
        assert_eq!(ConstValue::from_json(json!(3.5)), ConstValue::Float(3.5));
        assert_eq!(ConstValue::Int(3).into_json(), json!(3));
    }

    #[test]
    fn variables_ignore_non_objects() {
        assert!(Variables::from_json(json!([1, 2])).is_empty());
        assert!(Variables::from_json(json!(null)).is_empty());
        let vars = Variables::from_json(json!({"id": "7"}));
        assert_eq!(vars.get("id"), Some(&ConstValue::String("7".into())));
    }

    #[test]
    fn variables_deserialize_from_null() {
        let vars: Variables = serde_json::from_str("null").unwrap();
        assert!(vars.is_empty());
    }

    #[test]
    fn resolve_drops_absent_object_entries() {
        let value = Value::Object(IndexMap::from([
            ("a".to_string(), Value::Variable("x".into())),
            ("b".to_string(), Value::List(vec![Value::Variable("x".into())])),
        ]));
        let resolved = value.resolve(&mut |_| None).unwrap();
        assert_eq!(
            resolved,
            ConstValue::Object(IndexMap::from([(
                "b".to_string(),
                ConstValue::List(vec![ConstValue::Null])
            )]))
        );
        assert!(value.as_const().is_none());
        assert_eq!(Value::Int(1).as_const(), Some(ConstValue::Int(1)));
    }

    #[test]
    fn display_is_graphql_literal_syntax() {
        let value = ConstValue::Object(IndexMap::from([
            ("color".to_string(), ConstValue::Enum("RED".into())),
            ("name".to_string(), ConstValue::String("a\"b".into())),
            ("xs".to_string(), ConstValue::List(vec![ConstValue::Int(1), ConstValue::Float(2.0)])),
        ]));
        assert_eq!(value.to_string(), r#"{color: RED, name: "a\"b", xs: [1, 2.0]}"#);
    }
}
