//! Request configuration and the HTTP-shaped transport adapter.
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Deserialize;

use crate::error::RequestError;
use crate::parser::DEFAULT_MAX_DEPTH;
use crate::path_de;
use crate::reflect::UploadedFile;
use crate::response::Response;
use crate::schema::Schema;
use crate::value::Variables;

/// Shared flag; once set, resolvers that have not started yet fail.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Attach the Apollo tracing extension.
    pub tracing: bool,
    pub cancel: Option<CancelToken>,
    pub deadline: Option<Instant>,
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { tracing: false, cancel: None, deadline: None, max_depth: DEFAULT_MAX_DEPTH }
    }
}

/// Multipart form access. Each key is read at most once per request.
pub trait FormSource: Sync {
    fn value(&self, key: &str) -> Result<Option<String>, String>;
    fn file(&self, key: &str) -> Result<Option<UploadedFile>, String>;
}

/// A [`FormSource`] made of two closures.
pub struct FormCallbacks<V, F> {
    pub value: V,
    pub file: F,
}

impl<V, F> FormSource for FormCallbacks<V, F>
where
    V: Fn(&str) -> Result<Option<String>, String> + Sync,
    F: Fn(&str) -> Result<Option<UploadedFile>, String> + Sync,
{
    fn value(&self, key: &str) -> Result<Option<String>, String> {
        (self.value)(key)
    }

    fn file(&self, key: &str) -> Result<Option<UploadedFile>, String> {
        (self.file)(key)
    }
}

pub struct Request<'a> {
    pub query: String,
    pub operation_name: Option<String>,
    pub variables: Variables,
    pub form: Option<&'a dyn FormSource>,
    pub options: ResolveOptions,
    /// Form values already read while decoding; resolvers see these instead
    /// of asking the form again.
    pub(crate) form_values: HashMap<String, Option<String>>,
}

impl<'a> Request<'a> {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: Variables::default(),
            form: None,
            options: ResolveOptions::default(),
            form_values: HashMap::new(),
        }
    }

    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    pub fn variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn form(mut self, form: &'a dyn FormSource) -> Self {
        self.form = Some(form);
        self
    }

    pub fn options(mut self, options: ResolveOptions) -> Self {
        self.options = options;
        self
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TRANSPORT
// ————————————————————————————————————————————————————————————————————————————

/// The parts of an HTTP request the adapter reads.
pub struct HttpRequest<'a> {
    pub method: &'a str,
    pub content_type: Option<&'a str>,
    pub query_param: &'a dyn Fn(&str) -> Option<String>,
    pub body: &'a [u8],
    pub form: Option<&'a dyn FormSource>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonBody {
    query: Option<String>,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Variables,
}

fn media_type(content_type: Option<&str>) -> String {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default()
}

fn parse_variables(text: Option<String>) -> Result<Variables, RequestError> {
    match text.filter(|t| !t.trim().is_empty()) {
        None => Ok(Variables::default()),
        Some(text) => path_de::from_str_with_path(&text).map_err(RequestError::InvalidVariables),
    }
}

/// Decodes the request without executing it.
pub fn decode<'a>(http: &HttpRequest<'a>) -> Result<Request<'a>, RequestError> {
    let method = http.method.to_ascii_uppercase();
    let mut request = match method.as_str() {
        "GET" => {
            let query = (http.query_param)("query").ok_or(RequestError::MissingQuery)?;
            let variables = parse_variables((http.query_param)("variables"))?;
            let mut request = Request::new(query).variables(variables);
            request.operation_name = (http.query_param)("operationName");
            request
        }
        "POST" => match media_type(http.content_type).as_str() {
            "application/json" => {
                let body: JsonBody = serde_json::from_slice(http.body)?;
                let mut request =
                    Request::new(body.query.ok_or(RequestError::MissingQuery)?).variables(body.variables);
                request.operation_name = body.operation_name;
                request
            }
            "application/graphql" => {
                let query = String::from_utf8(http.body.to_vec())
                    .map_err(|e| RequestError::Form(format!("body is not UTF-8: {e}")))?;
                Request::new(query)
            }
            "multipart/form-data" => {
                let form = http.form.ok_or_else(|| RequestError::Form("no form accessor".to_string()))?;
                let mut form_values = HashMap::new();
                let mut read = |key: &str| -> Result<Option<String>, RequestError> {
                    let value = form.value(key).map_err(RequestError::Form)?;
                    form_values.insert(key.to_string(), value.clone());
                    Ok(value)
                };
                let query = read("query")?.ok_or(RequestError::MissingQuery)?;
                let variables = parse_variables(read("variables")?)?;
                let operation_name = read("operationName")?;
                let mut request = Request::new(query).variables(variables).form(form);
                request.operation_name = operation_name;
                request.form_values = form_values;
                request
            }
            other => return Err(RequestError::UnsupportedContentType(other.to_string())),
        },
        other => return Err(RequestError::UnsupportedMethod(other.to_string())),
    };
    if request.operation_name.as_deref() == Some("") {
        request.operation_name = None;
    }
    Ok(request)
}

impl Schema {
    /// Decodes, executes and serializes one request. Decoding failures still
    /// produce a response envelope.
    pub fn handle_http<Q, M>(&self, query_root: &Q, mutation_root: &M, http: &HttpRequest<'_>, options: ResolveOptions) -> Vec<u8>
    where
        Q: std::any::Any + Send + Sync,
        M: std::any::Any + Send + Sync,
    {
        let response = match decode(http) {
            Ok(request) => self.execute(query_root, mutation_root, request.options(options)),
            Err(err) => {
                tracing::debug!(error = %err, "rejected request");
                Response::from_request_error(&err)
            }
        };
        response.to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConstValue;

    fn no_params(_: &str) -> Option<String> {
        None
    }

    fn http<'a>(method: &'a str, content_type: Option<&'a str>, body: &'a [u8]) -> HttpRequest<'a> {
        HttpRequest { method, content_type, query_param: &no_params, body, form: None }
    }

    #[test]
    fn get_reads_query_parameters() {
        let params = |key: &str| match key {
            "query" => Some("{ hello }".to_string()),
            "variables" => Some(r#"{"n": 1}"#.to_string()),
            "operationName" => Some(String::new()),
            _ => None,
        };
        let request = decode(&HttpRequest { method: "get", content_type: None, query_param: &params, body: b"", form: None })
            .unwrap();
        assert_eq!(request.query, "{ hello }");
        assert_eq!(request.variables.get("n"), Some(&ConstValue::Int(1)));
        assert_eq!(request.operation_name, None);
    }

    #[test]
    fn post_bodies() {
        let body = br#"{"query": "{ a }", "operationName": "A", "variables": null}"#;
        let request = decode(&http("POST", Some("application/json; charset=utf-8"), body)).unwrap();
        assert_eq!(request.query, "{ a }");
        assert_eq!(request.operation_name.as_deref(), Some("A"));
        assert!(request.variables.is_empty());

        let request = decode(&http("POST", Some("application/graphql"), b"{ b }")).unwrap();
        assert_eq!(request.query, "{ b }");
    }

    #[test]
    fn multipart_uses_the_form() {
        let form = FormCallbacks {
            value: |key: &str| -> Result<Option<String>, String> {
                Ok((key == "query").then(|| "{ c }".to_string()))
            },
            file: |_: &str| -> Result<Option<UploadedFile>, String> { Ok(None) },
        };
        let mut raw = http("POST", Some("multipart/form-data; boundary=x"), b"");
        raw.form = Some(&form);
        let request = decode(&raw).unwrap();
        assert_eq!(request.query, "{ c }");
        assert!(request.form.is_some());
        assert_eq!(request.form_values.get("query"), Some(&Some("{ c }".to_string())));
        assert_eq!(request.form_values.get("operationName"), Some(&None));
    }

    #[test]
    fn decoding_failures() {
        assert!(matches!(decode(&http("PUT", None, b"")), Err(RequestError::UnsupportedMethod(_))));
        assert!(matches!(
            decode(&http("POST", Some("text/plain"), b"")),
            Err(RequestError::UnsupportedContentType(_))
        ));
        assert!(matches!(decode(&http("POST", Some("application/json"), b"{")), Err(RequestError::InvalidBody(_))));
        assert!(matches!(decode(&http("POST", Some("application/json"), b"{}")), Err(RequestError::MissingQuery)));
        assert!(matches!(decode(&http("GET", None, b"")), Err(RequestError::MissingQuery)));
    }
}
