use std::sync::atomic::{AtomicUsize, Ordering};

use reflectql::introspection::INTROSPECTION_QUERY;
use reflectql::{
    Enum, FieldError, FormCallbacks, HttpRequest, ObjDescriptor, OutputType, Reflector, Request, Resolved, Schema,
    SchemaError, UploadedFile, Variables, demo,
};
use serde_json::{Value as Json, json};

struct Query {
    calls: AtomicUsize,
}

impl Query {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

struct Outer;
struct Middle;

impl OutputType for Query {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Query", |b| {
            b.method("hello", |root, _, ()| {
                root.calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FieldError>("world".to_string())
            })?;
            b.method("outer", |_, _, ()| Ok::<_, FieldError>(Some(Outer)))?;
            b.method("strict_outer", |_, _, ()| Ok::<_, FieldError>(Outer))?;
            b.computed("color", |_| Color::Green)?;
            Ok(())
        })
    }
}

impl OutputType for Outer {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Outer", |b| {
            b.computed("middle", |_| Middle)?;
            Ok(())
        })
    }
}

impl OutputType for Middle {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Middle", |b| {
            b.computed("ok", |_| true)?;
            b.method("leaf", |_, _, ()| Err::<i32, _>("leaf failed"))?;
            Ok(())
        })
    }
}

#[allow(dead_code)]
enum Color {
    Red,
    Green,
    Blue,
}

impl Enum for Color {
    const NAME: &'static str = "Color";

    fn symbols() -> &'static [&'static str] {
        &["RED", "GREEN", "BLUE"]
    }

    fn symbol(&self) -> &'static str {
        match self {
            Self::Red => "RED",
            Self::Green => "GREEN",
            Self::Blue => "BLUE",
        }
    }
}

impl OutputType for Color {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.enum_type::<Self>()
    }

    fn resolve(&self) -> Resolved<'_> {
        Resolved::Enum(self.symbol())
    }

    fn resolve_owned<'a>(self) -> Resolved<'a> {
        Resolved::Enum(self.symbol())
    }
}

fn schema() -> Schema {
    Schema::builder().register_enum::<Color>().unwrap().build::<Query, Query>().unwrap()
}

fn run(schema: &Schema, root: &Query, query: &str) -> Json {
    schema.execute(root, root, Request::new(query)).to_json()
}

#[test]
fn hello_world_envelope() {
    let schema = schema();
    let root = Query::new();
    let response = schema.execute(&root, &root, Request::new("{ hello }"));
    assert_eq!(String::from_utf8(response.to_bytes()).unwrap(), r#"{"data":{"hello":"world"},"errors":[]}"#);
}

#[test]
fn unknown_field_stops_before_any_resolver_runs() {
    let schema = schema();
    let root = Query::new();
    let response = run(&schema, &root, "{ hello bogus }");
    assert_eq!(response["data"], Json::Null);
    assert_eq!(
        response["errors"],
        json!([{"message": "Cannot query field \"bogus\" on type \"Query\".", "locations": [{"line": 1, "column": 9}]}])
    );
    assert_eq!(root.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn deep_failure_nulls_the_nearest_nullable_ancestor_once() {
    let schema = schema();
    let root = Query::new();
    let response = run(&schema, &root, "{ outer { middle { ok leaf } } hello }");
    assert_eq!(response["data"], json!({"outer": null, "hello": "world"}));
    let errors = response["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "leaf failed");
    assert_eq!(errors[0]["path"], json!(["outer", "middle", "leaf"]));
}

#[test]
fn non_null_top_level_field_keeps_data_an_object() {
    let schema = schema();
    let root = Query::new();
    let response = run(&schema, &root, "{ strictOuter { middle { leaf } } hello }");
    assert_eq!(response["data"], json!({"strictOuter": null, "hello": "world"}));
    assert_eq!(response["errors"].as_array().unwrap().len(), 1);
}

#[test]
fn enum_values_are_sorted_and_serialized_by_symbol() {
    let schema = schema();
    let root = Query::new();
    let response = run(&schema, &root, r#"{ color __type(name: "Color") { kind enumValues { name } } }"#);
    assert_eq!(
        response["data"],
        json!({
            "color": "GREEN",
            "__type": {"kind": "ENUM", "enumValues": [{"name": "BLUE"}, {"name": "GREEN"}, {"name": "RED"}]}
        })
    );
}

#[test]
fn introspection_is_idempotent() {
    let schema = schema();
    let root = Query::new();
    let first = schema.execute(&root, &root, Request::new(INTROSPECTION_QUERY));
    let second = schema.execute(&root, &root, Request::new(INTROSPECTION_QUERY));
    assert!(first.is_ok(), "{:?}", first.errors);
    assert_eq!(first.to_bytes(), second.to_bytes());

    let types = first.data["__schema"]["types"].as_array().unwrap();
    let names: Vec<&str> = types.iter().filter_map(|t| t["name"].as_str()).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);
    assert_eq!(first.data["__schema"]["subscriptionType"], Json::Null);
    assert_eq!(first.data["__schema"]["directives"], json!([]));
}

struct Greeter {
    greeting: String,
}

impl OutputType for Greeter {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Greeter", |b| {
            b.field("greeting", |g| &g.greeting)?;
            b.computed("shout", |g| g.greeting.to_uppercase())?;
            Ok(())
        })
    }
}

#[test]
fn concurrent_executions_match_sequential_ones() {
    let schema = Schema::new::<Greeter, Greeter>().unwrap();
    let roots = [Greeter { greeting: "hello".into() }, Greeter { greeting: "bonjour".into() }];
    let query = "{ greeting shout }";
    let sequential: Vec<Vec<u8>> =
        roots.iter().map(|root| schema.execute(root, root, Request::new(query)).to_bytes()).collect();

    let concurrent: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = roots
            .iter()
            .map(|root| {
                let schema = &schema;
                scope.spawn(move || {
                    (0..50)
                        .map(|_| schema.execute(root, root, Request::new(query)).to_bytes())
                        .reduce(|a, b| {
                            assert_eq!(a, b);
                            b
                        })
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert_eq!(sequential, concurrent);
}

struct Node {
    label: String,
    children: Vec<Node>,
}

impl OutputType for Node {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("Node", |b| {
            b.field("label", |n| &n.label)?;
            b.field("children", |n| &n.children)?;
            Ok(())
        })
    }
}

#[test]
fn self_referential_types_terminate() {
    let schema = Schema::new::<Node, Node>().unwrap();
    let tree = Node {
        label: "root".into(),
        children: vec![Node { label: "leaf".into(), children: Vec::new() }],
    };
    let response = schema.execute(
        &tree,
        &tree,
        Request::new(
            r#"{ label children { label children { label } }
                 __type(name: "Node") { fields { name type { kind ofType { kind ofType { kind ofType { name } } } } } } }"#,
        ),
    );
    assert!(response.is_ok(), "{:?}", response.errors);
    assert_eq!(response.data["children"], json!([{"label": "leaf", "children": []}]));
    assert_eq!(
        response.data["__type"]["fields"][0],
        json!({
            "name": "children",
            "type": {"kind": "NON_NULL", "ofType": {"kind": "LIST", "ofType": {"kind": "NON_NULL", "ofType": {"name": "Node"}}}}
        })
    );
}

#[test]
fn duplicate_enum_registration_fails() {
    let result = Schema::builder().register_enum::<Color>().and_then(|b| b.register_enum::<Color>());
    assert!(result.is_err());
}

// ————————————————————————————————————————————————————————————————————————————
// BOOKSHELF
// ————————————————————————————————————————————————————————————————————————————

fn no_params(_: &str) -> Option<String> {
    None
}

#[test]
fn variables_reach_enum_arguments() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let variables = Variables::from_json(json!({"g": "SCIENCE_FICTION"}));
    let response = schema.execute(
        &query,
        &mutation,
        Request::new("query Shelf($g: Genre) { books(genre: $g) { title genre } }").variables(variables),
    );
    assert_eq!(
        response.to_json(),
        json!({"data": {"books": [
            {"title": "The Left Hand of Darkness", "genre": "SCIENCE_FICTION"},
            {"title": "Foundation", "genre": "SCIENCE_FICTION"}
        ]}, "errors": []})
    );
}

#[test]
fn validation_reports_every_problem_in_document_order() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let response = schema.execute(&query, &mutation, Request::new("{ bogus books { nope } book { title } }"));
    assert_eq!(response.data, Json::Null);
    let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
    assert_eq!(messages.len(), 3, "{messages:?}");
    assert!(messages[0].contains("\"bogus\""));
    assert!(messages[1].contains("\"nope\""));
    assert!(messages[2].contains("\"id\""));
}

#[test]
fn resolver_errors_keep_their_extensions() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let response = schema.execute(&query, &mutation, Request::new(r#"mutation { rateBook(id: "1", stars: 9) { rating } }"#));
    assert_eq!(response.data, json!({"rateBook": null}));
    assert_eq!(response.errors[0].path.len(), 1);
    assert_eq!(response.to_json()["errors"][0]["extensions"], json!({"code": "BAD_RATING"}));
}

#[test]
fn http_get_runs_a_query() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let params = |key: &str| (key == "query").then(|| "{ books(genre: MYSTERY) { title rating } }".to_string());
    let http = HttpRequest { method: "GET", content_type: None, query_param: &params, body: b"", form: None };
    let body = schema.handle_http(&query, &mutation, &http, Default::default());
    let response: Json = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        response,
        json!({"data": {"books": [{"title": "Murder on the Orient Express", "rating": 4.0}]}, "errors": []})
    );
}

#[test]
fn http_rejects_unsupported_methods_with_an_envelope() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let http = HttpRequest { method: "DELETE", content_type: None, query_param: &no_params, body: b"", form: None };
    let response: Json = serde_json::from_slice(&schema.handle_http(&query, &mutation, &http, Default::default())).unwrap();
    assert_eq!(response["data"], Json::Null);
    assert_eq!(response["errors"].as_array().unwrap().len(), 1);
}

#[test]
fn multipart_upload_reads_each_file_once() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let file_reads = AtomicUsize::new(0);
    let form = FormCallbacks {
        value: |key: &str| -> Result<Option<String>, String> {
            Ok(match key {
                "query" => Some(
                    "mutation Cover($f: Upload!) { uploadCover(bookId: 1, file: $f) { title cover { fileName contentType size } } }"
                        .to_string(),
                ),
                "variables" => Some(r#"{"f": "cover"}"#.to_string()),
                _ => None,
            })
        },
        file: |key: &str| -> Result<Option<UploadedFile>, String> {
            file_reads.fetch_add(1, Ordering::SeqCst);
            Ok((key == "cover").then(|| UploadedFile {
                file_name: "cover.png".into(),
                content_type: Some("image/png".into()),
                data: vec![0x89, b'P', b'N', b'G'],
            }))
        },
    };
    let http = HttpRequest {
        method: "POST",
        content_type: Some("multipart/form-data; boundary=----x"),
        query_param: &no_params,
        body: b"",
        form: Some(&form),
    };
    let response: Json = serde_json::from_slice(&schema.handle_http(&query, &mutation, &http, Default::default())).unwrap();
    assert_eq!(
        response,
        json!({"data": {"uploadCover": {
            "title": "A Wizard of Earthsea",
            "cover": {"fileName": "cover.png", "contentType": "image/png", "size": 4}
        }}, "errors": []})
    );
    assert_eq!(file_reads.load(Ordering::SeqCst), 1);
}

struct FormEcho;

impl OutputType for FormEcho {
    fn describe(r: &mut Reflector) -> Result<ObjDescriptor, SchemaError> {
        r.object::<Self, _>("FormEcho", |b| {
            b.method("submitted", |_, ctx, ()| ctx.form_value("query"))?;
            b.method("note", |_, ctx, ()| ctx.form_value("note"))?;
            Ok(())
        })
    }
}

#[test]
fn multipart_form_values_are_read_once_per_request() {
    let schema = Schema::new::<FormEcho, FormEcho>().unwrap();
    let document = "{ submitted note again: note }";
    let reads = [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)];
    let form = FormCallbacks {
        value: |key: &str| -> Result<Option<String>, String> {
            match key {
                "query" => {
                    reads[0].fetch_add(1, Ordering::SeqCst);
                    Ok(Some(document.to_string()))
                }
                "note" => {
                    reads[1].fetch_add(1, Ordering::SeqCst);
                    Ok(Some("hi".to_string()))
                }
                _ => {
                    reads[2].fetch_add(1, Ordering::SeqCst);
                    Ok(None)
                }
            }
        },
        file: |_: &str| -> Result<Option<UploadedFile>, String> { Ok(None) },
    };
    let http = HttpRequest {
        method: "POST",
        content_type: Some("multipart/form-data; boundary=----x"),
        query_param: &no_params,
        body: b"",
        form: Some(&form),
    };
    let response: Json =
        serde_json::from_slice(&schema.handle_http(&FormEcho, &FormEcho, &http, Default::default())).unwrap();
    assert_eq!(
        response,
        json!({"data": {"submitted": document, "note": "hi", "again": "hi"}, "errors": []})
    );
    // `variables` and `operationName` are each read once while decoding.
    let counts: Vec<usize> = reads.iter().map(|r| r.load(Ordering::SeqCst)).collect();
    assert_eq!(counts, [1, 1, 2]);
}

#[test]
fn missing_upload_fails_the_field() {
    let schema = demo::schema().unwrap();
    let (query, mutation) = demo::roots();
    let form = FormCallbacks {
        value: |_: &str| -> Result<Option<String>, String> { Ok(None) },
        file: |_: &str| -> Result<Option<UploadedFile>, String> { Ok(None) },
    };
    let response = schema.execute(
        &query,
        &mutation,
        Request::new(r#"mutation { uploadCover(bookId: 2, file: "absent") { title } }"#).form(&form),
    );
    assert_eq!(response.data, json!({"uploadCover": null}));
    assert_eq!(response.errors.len(), 1);
    assert!(response.errors[0].message.contains("absent"), "{}", response.errors[0].message);
}
