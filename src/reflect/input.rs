use std::any::TypeId;
use std::collections::HashSet;

use serde::Serialize;

use super::{InputField, InputType, Reflector};
use crate::error::SchemaError;
use crate::naming;

#[derive(Debug, Clone)]
pub struct InputObjectType {
    pub name: String,
    pub description: Option<String>,
    pub type_id: TypeId,
    /// Declaration order.
    pub fields: Vec<InputField>,
}

impl InputObjectType {
    pub(crate) fn placeholder(name: &str, type_id: TypeId) -> Self {
        Self { name: name.to_string(), description: None, type_id, fields: Vec::new() }
    }

    pub fn field(&self, name: &str) -> Option<&InputField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Declares the fields of an input object, or the arguments of a method.
///
/// Each `ident` must be the serde key of the corresponding struct field.
pub struct InputFieldsBuilder<'r> {
    reflector: &'r mut Reflector,
    owner: String,
    description: Option<String>,
    fields: Vec<InputField>,
}

impl<'r> InputFieldsBuilder<'r> {
    pub(crate) fn new(reflector: &'r mut Reflector, owner: &str) -> Self {
        Self { reflector, owner: owner.to_string(), description: None, fields: Vec::new() }
    }

    pub fn description(&mut self, text: impl Into<String>) -> &mut Self {
        self.description = Some(text.into());
        self
    }

    /// Describes the most recently declared field.
    pub fn doc(&mut self, text: impl Into<String>) -> &mut Self {
        if let Some(last) = self.fields.last_mut() {
            last.description = Some(text.into());
        }
        self
    }

    pub fn field<T: InputType>(&mut self, ident: &str) -> Result<&mut Self, SchemaError> {
        let ty = T::describe(self.reflector)?;
        self.push(ident, ty, None)
    }

    /// Used when the argument is omitted. An explicit `null` still overrides it.
    pub fn field_with_default<T>(&mut self, ident: &str, default: T) -> Result<&mut Self, SchemaError>
    where
        T: InputType + Serialize,
    {
        let ty = T::describe(self.reflector)?;
        let default = serde_json::to_value(&default).map_err(|e| SchemaError::Unsupported {
            context: format!("{}.{ident}", self.owner),
            reason: format!("default value does not serialize: {e}"),
        })?;
        self.push(ident, ty, Some(default))
    }

    fn push(
        &mut self,
        ident: &str,
        ty: super::InputDescriptor,
        default: Option<serde_json::Value>,
    ) -> Result<&mut Self, SchemaError> {
        let name = naming::field_name(ident);
        self.reflector.check_name(&name)?;
        let ident = ident.strip_prefix("r#").unwrap_or(ident);
        self.fields.push(InputField { name, ident: ident.to_string(), description: None, ty, default });
        Ok(self)
    }

    pub(crate) fn finish(self) -> Result<(Option<String>, Vec<InputField>), SchemaError> {
        let mut seen = HashSet::new();
        if let Some(dup) = self.fields.iter().find(|f| !seen.insert(f.name.as_str())) {
            return Err(SchemaError::DuplicateField { type_name: self.owner, field: dup.name.clone() });
        }
        Ok((self.description, self.fields))
    }
}
