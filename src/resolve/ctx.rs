use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::timing::Timing;
use crate::error::{FieldError, PathSegment, Pos};
use crate::reflect::{Upload, UploadedFile};
use crate::request::{CancelToken, FormSource, ResolveOptions};
use crate::response::ResponseError;
use crate::schema::Schema;

/// Per-request state handed to every resolver. Not shared across requests.
pub struct Ctx<'r> {
    schema: &'r Schema,
    path: RefCell<Vec<PathSegment>>,
    errors: RefCell<Vec<ResponseError>>,
    form: Option<&'r dyn FormSource>,
    form_values: RefCell<HashMap<String, Result<Option<String>, String>>>,
    uploads: RefCell<HashMap<String, Result<Arc<UploadedFile>, String>>>,
    cancel: Option<CancelToken>,
    deadline: Option<Instant>,
    pub(crate) timing: Option<RefCell<Timing>>,
}

impl<'r> Ctx<'r> {
    pub(crate) fn new(
        schema: &'r Schema,
        form: Option<&'r dyn FormSource>,
        form_values: HashMap<String, Option<String>>,
        options: &ResolveOptions,
        timing: Option<Timing>,
    ) -> Self {
        Self {
            schema,
            path: RefCell::new(Vec::new()),
            errors: RefCell::new(Vec::new()),
            form,
            form_values: RefCell::new(form_values.into_iter().map(|(key, value)| (key, Ok(value))).collect()),
            uploads: RefCell::new(HashMap::new()),
            cancel: options.cancel.clone(),
            deadline: options.deadline,
            timing: timing.map(RefCell::new),
        }
    }

    pub fn schema(&self) -> &'r Schema {
        self.schema
    }

    /// Response path of the field being resolved.
    pub fn path(&self) -> Vec<PathSegment> {
        self.path.borrow().clone()
    }

    /// A plain (non-file) part of the multipart form.
    pub fn form_value(&self, key: &str) -> Result<Option<String>, FieldError> {
        if let Some(cached) = self.form_values.borrow().get(key) {
            return cached.clone().map_err(FieldError::new);
        }
        let value = match self.form {
            Some(form) => form.value(key),
            None => Ok(None),
        };
        self.form_values.borrow_mut().insert(key.to_string(), value.clone());
        value.map_err(FieldError::new)
    }

    /// The file behind an `Upload` argument.
    pub fn upload(&self, upload: &Upload) -> Result<Arc<UploadedFile>, FieldError> {
        self.fetch_upload(&upload.0).map_err(FieldError::new)
    }

    pub fn is_cancelled(&self) -> bool {
        self.interruption().is_some()
    }

    pub(crate) fn interruption(&self) -> Option<&'static str> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Some("request cancelled");
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some("deadline exceeded");
        }
        None
    }

    pub(crate) fn fetch_upload(&self, key: &str) -> Result<Arc<UploadedFile>, String> {
        if let Some(cached) = self.uploads.borrow().get(key) {
            return cached.clone();
        }
        let fetched = match self.form {
            None => Err("this request carries no multipart form".to_string()),
            Some(form) => match form.file(key) {
                Ok(Some(file)) => Ok(Arc::new(file)),
                Ok(None) => Err(format!("no file was uploaded under \"{key}\"")),
                Err(err) => Err(err),
            },
        };
        tracing::trace!(key, ok = fetched.is_ok(), "fetched upload");
        self.uploads.borrow_mut().insert(key.to_string(), fetched.clone());
        fetched
    }

    pub(crate) fn push(&self, segment: PathSegment) {
        self.path.borrow_mut().push(segment);
    }

    pub(crate) fn pop(&self) {
        self.path.borrow_mut().pop();
    }

    pub(crate) fn record(&self, error: FieldError, pos: Pos) {
        tracing::trace!(path = ?self.path.borrow(), message = %error.message, "field error");
        self.errors.borrow_mut().push(ResponseError {
            message: error.message,
            locations: vec![pos],
            path: self.path(),
            extensions: error.extensions,
        });
    }

    pub(crate) fn finish(self) -> (Vec<ResponseError>, Option<Timing>) {
        (self.errors.into_inner(), self.timing.map(RefCell::into_inner))
    }
}
