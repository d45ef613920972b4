//! Response envelope: `{data, errors, extensions?}`.
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::{PathSegment, Pos, RequestError, SyntaxError, ValidationError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Pos>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Json>>,
}

impl ResponseError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), locations: Vec::new(), path: Vec::new(), extensions: None }
    }
}

/// `errors` is always present, empty on success. `data` is `null` when the
/// operation did not execute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub data: Json,
    pub errors: Vec<ResponseError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Json>>,
}

impl Response {
    pub(crate) fn from_errors(errors: Vec<ResponseError>) -> Self {
        Self { data: Json::Null, errors, extensions: None }
    }

    pub fn from_request_error(err: &RequestError) -> Self {
        Self::from_errors(vec![ResponseError::new(err.to_string())])
    }

    pub fn from_syntax_error(err: SyntaxError) -> Self {
        Self::from_errors(vec![ResponseError { locations: vec![err.pos], ..ResponseError::new(err.message) }])
    }

    pub fn from_validation_errors(errors: Vec<ValidationError>) -> Self {
        Self::from_errors(
            errors
                .into_iter()
                .map(|e| ResponseError { locations: e.locations, ..ResponseError::new(e.message) })
                .collect(),
        )
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or(Json::Null)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "response serialization failed");
            br#"{"data":null,"errors":[{"message":"response serialization failed"}]}"#.to_vec()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_shape() {
        let mut data = Map::new();
        data.insert("hello".into(), json!("world"));
        let response = Response { data: Json::Object(data), errors: Vec::new(), extensions: None };
        assert_eq!(String::from_utf8(response.to_bytes()).unwrap(), r#"{"data":{"hello":"world"},"errors":[]}"#);
    }

    #[test]
    fn errors_skip_empty_parts() {
        let response = Response::from_syntax_error(SyntaxError::new("Unexpected <EOF>", Pos { line: 1, column: 8 }));
        assert_eq!(
            response.to_json(),
            json!({"data": null, "errors": [{"message": "Unexpected <EOF>", "locations": [{"line": 1, "column": 8}]}]})
        );
        let err = ResponseError {
            path: vec![PathSegment::Field("books".into()), PathSegment::Index(0)],
            ..ResponseError::new("boom")
        };
        assert_eq!(serde_json::to_value(err).unwrap(), json!({"message": "boom", "path": ["books", 0]}));
    }
}
