//! Input coercion: literals and variable values into the JSON shape the
//! host argument structs deserialize from (keyed by Rust identifier).
use indexmap::IndexMap;
use serde_json::{Map, Value as Json};

use super::ctx::Ctx;
use crate::reflect::{InputDescriptor, InputField};
use crate::schema::{Schema, TypeRef};
use crate::value::ConstValue;

pub(crate) struct Coercion<'a> {
    schema: &'a Schema,
    /// Present during execution; `Upload` values are fetched through it.
    ctx: Option<&'a Ctx<'a>>,
    /// Query literals spell enum values as bare names; variables carry them as strings.
    literal: bool,
}

impl<'a> Coercion<'a> {
    pub fn literal(schema: &'a Schema) -> Self {
        Self { schema, ctx: None, literal: true }
    }

    pub fn variables(schema: &'a Schema) -> Self {
        Self { schema, ctx: None, literal: false }
    }

    pub fn execution(schema: &'a Schema, ctx: &'a Ctx<'a>) -> Self {
        Self { schema, ctx: Some(ctx), literal: false }
    }

    /// Unknown arguments are left to validation and ignored here.
    pub fn arguments(&self, declared: &[InputField], supplied: &IndexMap<String, ConstValue>) -> Result<Json, String> {
        self.fill(declared, supplied, |field, err| format!("Argument \"{}\" has invalid value: {err}", field.name), |field| {
            format!(
                "Argument \"{}\" of required type \"{}\" was not provided.",
                field.name,
                TypeRef::input(&field.ty)
            )
        })
    }

    pub fn input(&self, ty: &InputDescriptor, value: &ConstValue) -> Result<Json, String> {
        let ty = match (ty, value) {
            (InputDescriptor::Ptr(_), ConstValue::Null) => return Ok(Json::Null),
            (InputDescriptor::Ptr(inner), _) => inner.as_ref(),
            (_, ConstValue::Null) => {
                return Err(format!("Expected non-nullable type \"{}\" not to be null.", TypeRef::input(ty)));
            }
            (ty, _) => ty,
        };
        match ty {
            InputDescriptor::Ptr(inner) => self.input(inner, value),
            InputDescriptor::List(elem) => match value {
                ConstValue::List(items) => items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.input(elem, item).map_err(|err| format!("At index {index}: {err}")))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Json::Array),
                single => Ok(Json::Array(vec![self.input(elem, single)?])),
            },
            InputDescriptor::Data { kind, is_id } => self.schema.registry.data_scalar(*kind, *is_id).parse(value, *kind),
            InputDescriptor::Enum(name) => self.enum_value(name, value),
            InputDescriptor::Upload => {
                let key = self.schema.registry.upload().parse(value, crate::registry::DataKind::String)?;
                if let (Some(ctx), Json::String(key)) = (self.ctx, &key) {
                    ctx.fetch_upload(key)?;
                }
                Ok(key)
            }
            InputDescriptor::Struct(name) => {
                let ConstValue::Object(entries) = value else {
                    return Err(format!("Expected type \"{name}\" to be an object, got {}.", value.kind_name()));
                };
                let ty = self
                    .schema
                    .input_object(name)
                    .ok_or_else(|| format!("Unknown input type \"{name}\"."))?;
                if let Some(unknown) = entries.keys().find(|key| ty.field(key).is_none()) {
                    return Err(format!("Field \"{unknown}\" is not defined by type \"{name}\"."));
                }
                self.fill(&ty.fields, entries, |field, err| format!("In field \"{}\": {err}", field.name), |field| {
                    format!(
                        "Field \"{name}.{}\" of required type \"{}\" was not provided.",
                        field.name,
                        TypeRef::input(&field.ty)
                    )
                })
            }
        }
    }

    fn enum_value(&self, name: &str, value: &ConstValue) -> Result<Json, String> {
        let symbol = match value {
            ConstValue::Enum(symbol) => symbol,
            ConstValue::String(symbol) if !self.literal => symbol,
            other => return Err(format!("Enum \"{name}\" cannot represent non-enum value: {other}.")),
        };
        let ty = self.schema.registry.enum_type(name).ok_or_else(|| format!("Unknown enum \"{name}\"."))?;
        if !ty.contains(symbol) {
            return Err(format!("Value \"{symbol}\" does not exist in \"{name}\" enum."));
        }
        Ok(Json::String(symbol.clone()))
    }

    /// Absent fields take their default; absent nullable fields are left out
    /// and deserialize as `None`. An explicit `null` overrides a default.
    fn fill(
        &self,
        declared: &[InputField],
        supplied: &IndexMap<String, ConstValue>,
        invalid: impl Fn(&InputField, String) -> String,
        missing: impl Fn(&InputField) -> String,
    ) -> Result<Json, String> {
        let mut out = Map::new();
        for field in declared {
            let value = match (supplied.get(&field.name), &field.default) {
                (Some(value), _) => self.input(&field.ty, value).map_err(|err| invalid(field, err))?,
                (None, Some(default)) => default.clone(),
                (None, None) if field.ty.is_nullable() => continue,
                (None, None) => return Err(missing(field)),
            };
            out.insert(field.ident.clone(), value);
        }
        Ok(Json::Object(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{Enum, InputType, OutputType, ObjDescriptor, Reflector};
    use crate::error::SchemaError;
    use serde_json::json;

    #[allow(dead_code)]
    enum Size {
        Small,
        Large,
    }

    impl Enum for Size {
        const NAME: &'static str = "Size";

        fn symbols() -> &'static [&'static str] {
            &["SMALL", "LARGE"]
        }

        fn symbol(&self) -> &'static str {
            match self {
                Self::Small => "SMALL",
                Self::Large => "LARGE",
            }
        }
    }

    #[derive(serde::Deserialize)]
    #[allow(dead_code)]
    struct Order {
        item_name: String,
        count: Option<i32>,
    }

    impl InputType for Order {
        fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
            r.input_object::<Self, _>("Order", |b| {
                b.field::<String>("item_name")?;
                b.field::<Option<i32>>("count")?;
                Ok(())
            })
        }
    }

    struct Query;

    impl OutputType for Query {
        fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
            let size = r.input_enum::<Size>()?;
            let order = r.describe_input::<Order>()?;
            assert_eq!(size, InputDescriptor::Enum("Size".into()));
            assert_eq!(order, InputDescriptor::Struct("Order".into()));
            r.object::<Self, _>("Query", |b| {
                b.computed("ok", |_| true)?;
                Ok(())
            })
        }
    }

    fn schema() -> Schema {
        Schema::builder().register_enum::<Size>().unwrap().build::<Query, Query>().unwrap()
    }

    fn object(entries: &[(&str, ConstValue)]) -> ConstValue {
        ConstValue::Object(entries.iter().map(|(k, v)| (k.to_string(), v.clone())).collect())
    }

    #[test]
    fn enums_are_bare_in_literals_and_strings_in_variables() {
        let schema = schema();
        let ty = InputDescriptor::Enum("Size".into());
        let symbol = ConstValue::Enum("LARGE".into());
        let string = ConstValue::String("LARGE".into());
        assert_eq!(Coercion::literal(&schema).input(&ty, &symbol).unwrap(), json!("LARGE"));
        assert!(Coercion::literal(&schema).input(&ty, &string).is_err());
        assert_eq!(Coercion::variables(&schema).input(&ty, &string).unwrap(), json!("LARGE"));
        let err = Coercion::literal(&schema).input(&ty, &ConstValue::Enum("HUGE".into())).unwrap_err();
        assert_eq!(err, "Value \"HUGE\" does not exist in \"Size\" enum.");
    }

    #[test]
    fn single_values_wrap_into_lists() {
        let schema = schema();
        let ty = InputDescriptor::List(Box::new(InputDescriptor::Data { kind: crate::registry::DataKind::Int, is_id: false }));
        let coercion = Coercion::literal(&schema);
        assert_eq!(coercion.input(&ty, &ConstValue::Int(3)).unwrap(), json!([3]));
        assert!(coercion.input(&ty, &ConstValue::Null).is_err());
        let err = coercion.input(&ty, &ConstValue::List(vec![ConstValue::Int(1), ConstValue::Boolean(true)])).unwrap_err();
        assert!(err.starts_with("At index 1:"), "{err}");
    }

    #[test]
    fn input_objects_are_keyed_by_identifier() {
        let schema = schema();
        let ty = InputDescriptor::Struct("Order".into());
        let coercion = Coercion::variables(&schema);
        let value = object(&[("itemName", ConstValue::String("tea".into()))]);
        assert_eq!(coercion.input(&ty, &value).unwrap(), json!({"item_name": "tea"}));

        let err = coercion.input(&ty, &object(&[("count", ConstValue::Int(1))])).unwrap_err();
        assert_eq!(err, "Field \"Order.itemName\" of required type \"String!\" was not provided.");
        let err = coercion
            .input(&ty, &object(&[("itemName", ConstValue::String("tea".into())), ("price", ConstValue::Int(1))]))
            .unwrap_err();
        assert_eq!(err, "Field \"price\" is not defined by type \"Order\".");
    }

    #[test]
    fn argument_defaults_and_explicit_null() {
        let schema = schema();
        let mut r = Reflector::new();
        let declared = r
            .arguments("Args", |b| {
                b.field_with_default::<Option<i32>>("limit", Some(10))?;
                Ok(())
            })
            .unwrap();
        let coercion = Coercion::literal(&schema);
        assert_eq!(coercion.arguments(&declared, &IndexMap::new()).unwrap(), json!({"limit": 10}));
        let explicit = IndexMap::from([("limit".to_string(), ConstValue::Null)]);
        assert_eq!(coercion.arguments(&declared, &explicit).unwrap(), json!({"limit": null}));
    }
}
