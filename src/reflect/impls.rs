//! Built-in host types: primitives, wrappers, `Id` and `Upload`.
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{InputDescriptor, InputType, ObjDescriptor, OutputType, Reflector, Resolved, SharedValue};
use crate::error::SchemaError;
use crate::registry::DataKind;
use crate::value::ConstValue;

fn data(kind: DataKind) -> ObjDescriptor {
    ObjDescriptor::Data { kind, is_id: false }
}

fn input_data(kind: DataKind) -> InputDescriptor {
    InputDescriptor::Data { kind, is_id: false }
}

macro_rules! leaf_type {
    ($kind:ident, $variant:ident => $($t:ty),+) => {$(
        impl OutputType for $t {
            fn describe(_: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
                Ok(data(DataKind::$kind))
            }

            fn resolve(&self) -> Resolved<'_> {
                Resolved::Leaf(ConstValue::$variant((*self).into()))
            }

            fn resolve_owned<'a>(self) -> Resolved<'a> {
                Resolved::Leaf(ConstValue::$variant(self.into()))
            }
        }

        impl InputType for $t {
            fn describe(_: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
                Ok(input_data(DataKind::$kind))
            }
        }
    )+};
}

leaf_type!(Boolean, Boolean => bool);
leaf_type!(Int, Int => i8, i16, i32, i64, u8, u16, u32);
leaf_type!(Float, Float => f32, f64);

/// Values past `i64::MAX` fail `Int` serialization at the field.
macro_rules! wide_int {
    ($($t:ty),+) => {$(
        impl OutputType for $t {
            fn describe(_: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
                Ok(data(DataKind::Int))
            }

            fn resolve(&self) -> Resolved<'_> {
                Resolved::Leaf(
                    i64::try_from(*self)
                        .map(ConstValue::Int)
                        .unwrap_or(ConstValue::Float(*self as f64)),
                )
            }

            fn resolve_owned<'a>(self) -> Resolved<'a> {
                Resolved::Leaf(
                    i64::try_from(self)
                        .map(ConstValue::Int)
                        .unwrap_or(ConstValue::Float(self as f64)),
                )
            }
        }

        impl InputType for $t {
            fn describe(_: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
                Ok(input_data(DataKind::Int))
            }
        }
    )+};
}

wide_int!(u64, usize, isize);

macro_rules! unsupported {
    ($reason:literal => $($t:ty),+) => {$(
        impl OutputType for $t {
            fn describe(_: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
                Err(SchemaError::Unsupported {
                    context: std::any::type_name::<$t>().to_string(),
                    reason: $reason.to_string(),
                })
            }

            fn resolve(&self) -> Resolved<'_> {
                Resolved::Null
            }

            fn resolve_owned<'a>(self) -> Resolved<'a> {
                Resolved::Null
            }
        }
    )+};
}

unsupported!("128-bit integers do not fit the Int scalar" => i128, u128);
unsupported!("the unit type has no output representation" => ());

impl OutputType for String {
    fn describe(_: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(data(DataKind::String))
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Leaf(ConstValue::String(self.clone()))
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Leaf(ConstValue::String(self))
    }
}

impl InputType for String {
    fn describe(_: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        Ok(input_data(DataKind::String))
    }
}

impl OutputType for &'static str {
    fn describe(_: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(data(DataKind::String))
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Leaf(ConstValue::String(self.to_string()))
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Leaf(ConstValue::String(self.to_string()))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// WRAPPERS
// ————————————————————————————————————————————————————————————————————————————

impl<T: OutputType> OutputType for Option<T> {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(ObjDescriptor::Ptr(Box::new(T::describe(r)?)))
    }

    fn resolve(&self) -> Resolved<'_> {
        match self {
            Some(value) => value.resolve(),
            None => Resolved::Null,
        }
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        match self {
            Some(value) => value.resolve_owned(),
            None => Resolved::Null,
        }
    }
}

impl<T: InputType> InputType for Option<T> {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        Ok(InputDescriptor::Ptr(Box::new(T::describe(r)?)))
    }
}

impl<T: OutputType> OutputType for Vec<T> {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(ObjDescriptor::Array(Box::new(T::describe(r)?)))
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::List(self.iter().map(T::resolve).collect())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::List(self.into_iter().map(T::resolve_owned).collect())
    }
}

impl<T: InputType> InputType for Vec<T> {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        Ok(InputDescriptor::List(Box::new(T::describe(r)?)))
    }
}

impl<T: OutputType, const N: usize> OutputType for [T; N] {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(ObjDescriptor::Array(Box::new(T::describe(r)?)))
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::List(self.iter().map(T::resolve).collect())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::List(self.into_iter().map(T::resolve_owned).collect())
    }
}

impl<T: OutputType> OutputType for &'static [T] {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(ObjDescriptor::Array(Box::new(T::describe(r)?)))
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::List(self.iter().map(T::resolve).collect())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::List(self.iter().map(T::resolve).collect())
    }
}

impl<T: OutputType> OutputType for Box<T> {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        T::describe(r)
    }

    fn resolve(&self) -> Resolved<'_> {
        (**self).resolve()
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        (*self).resolve_owned()
    }
}

impl<T: InputType> InputType for Box<T> {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        T::describe(r)
    }
}

/// Transparent. A uniquely held `Arc` is unwrapped; a shared one is
/// completed by borrowing through it.
impl<T: OutputType> OutputType for Arc<T> {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        T::describe(r)
    }

    fn resolve(&self) -> Resolved<'_> {
        (**self).resolve()
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        match Arc::try_unwrap(self) {
            Ok(value) => value.resolve_owned(),
            Err(shared) => Resolved::Shared(SharedValue::new(shared)),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// ID
// ————————————————————————————————————————————————————————————————————————————

/// Host representations an `ID` can be backed by.
pub trait IdRepr: Clone + Send + Sync + 'static {
    const KIND: DataKind;
    fn to_leaf(&self) -> ConstValue;
}

impl IdRepr for String {
    const KIND: DataKind = DataKind::String;
    fn to_leaf(&self) -> ConstValue {
        ConstValue::String(self.clone())
    }
}

impl IdRepr for i64 {
    const KIND: DataKind = DataKind::Int;
    fn to_leaf(&self) -> ConstValue {
        ConstValue::Int(*self)
    }
}

impl IdRepr for i32 {
    const KIND: DataKind = DataKind::Int;
    fn to_leaf(&self) -> ConstValue {
        ConstValue::Int((*self).into())
    }
}

/// Marks a field as the `ID` scalar. Serialized as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<T = String>(pub T);

impl<T: IdRepr> OutputType for Id<T> {
    fn describe(_: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        Ok(ObjDescriptor::Data { kind: T::KIND, is_id: true })
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Leaf(self.0.to_leaf())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Leaf(self.0.to_leaf())
    }
}

impl<T: IdRepr + serde::de::DeserializeOwned> InputType for Id<T> {
    fn describe(_: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        Ok(InputDescriptor::Data { kind: T::KIND, is_id: true })
    }
}

// ————————————————————————————————————————————————————————————————————————————
// UPLOAD
// ————————————————————————————————————————————————————————————————————————————

/// An `Upload!` argument: the name of a file part in a multipart request.
/// Fetch the contents with [`Ctx::upload`](crate::resolve::Ctx::upload).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct Upload(pub String);

impl InputType for Upload {
    fn describe(r: &mut Reflector) -> Result<InputDescriptor, SchemaError> {
        r.enable_upload();
        Ok(InputDescriptor::Upload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrappers_map_to_descriptors() {
        let mut r = Reflector::new();
        assert_eq!(
            r.describe::<Vec<Option<i32>>>().unwrap(),
            ObjDescriptor::Array(Box::new(ObjDescriptor::Ptr(Box::new(data(DataKind::Int)))))
        );
        assert_eq!(r.describe::<Box<f32>>().unwrap(), data(DataKind::Float));
        assert_eq!(
            r.describe::<Id<i64>>().unwrap(),
            ObjDescriptor::Data { kind: DataKind::Int, is_id: true }
        );
        assert_eq!(
            r.describe_input::<Option<Vec<String>>>().unwrap(),
            InputDescriptor::Ptr(Box::new(InputDescriptor::List(Box::new(input_data(DataKind::String)))))
        );
    }

    #[test]
    fn unsupported_kinds_fail_at_describe() {
        let mut r = Reflector::new();
        assert!(matches!(r.describe::<u128>(), Err(SchemaError::Unsupported { .. })));
        assert!(matches!(r.describe::<Vec<()>>(), Err(SchemaError::Unsupported { .. })));
    }

    #[test]
    fn upload_enables_its_scalar() {
        let mut r = Reflector::new();
        assert!(!r.registry.is_scalar("Upload"));
        assert_eq!(r.describe_input::<Upload>().unwrap(), InputDescriptor::Upload);
        assert!(r.registry.is_scalar("Upload"));
    }

    #[test]
    fn leaves_resolve_to_const_values() {
        assert!(matches!(7u8.resolve(), Resolved::Leaf(ConstValue::Int(7))));
        assert!(matches!(u64::MAX.resolve(), Resolved::Leaf(ConstValue::Float(_))));
        assert!(matches!(None::<String>.resolve(), Resolved::Null));
        match vec![true, false].resolve_owned() {
            Resolved::List(items) => assert_eq!(items.len(), 2),
            _ => panic!("expected a list"),
        }
    }
}
