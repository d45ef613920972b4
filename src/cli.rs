//! CLI: query | schema | parse against the bundled bookshelf schema.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value as Json;
use tracing_subscriber::EnvFilter;

use reflectql::introspection::INTROSPECTION_QUERY;
use reflectql::parser::{self, DEFAULT_MAX_DEPTH};
use reflectql::{Request, ResolveOptions, Response, Schema, Variables, demo, path_de, validation};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// run, introspect and check query documents against the bookshelf schema
#[derive(Parser, Debug)]
#[command(name = "reflectql", version)]
pub struct CommandLineInterface {
    /// log engine events at info level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// execute query documents and print their responses
    Query(QueryOut),
    /// print the introspection result of the schema
    Schema(SchemaOut),
    /// parse query documents, optionally validating them
    Parse(ParseOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more query files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,

    /// maximum selection nesting accepted by the parser
    #[arg(long, env = "REFLECTQL_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

#[derive(Args, Debug, Clone)]
struct RequestSettings {
    /// JSON file holding the variables object
    #[arg(long)]
    variables: Option<PathBuf>,

    /// operation to run when a document holds several
    #[arg(long)]
    operation_name: Option<String>,
}

#[derive(clap::Parser, Debug)]
struct QueryOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    request_settings: RequestSettings,

    /// attach the Apollo tracing extension
    #[arg(long)]
    tracing: bool,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct SchemaOut {
    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct ParseOut {
    #[command(flatten)]
    input_settings: InputSettings,

    #[command(flatten)]
    request_settings: RequestSettings,

    /// also validate against the schema
    #[arg(long)]
    validate: bool,

    /// print the syntax tree as JSON
    #[arg(long)]
    ast: bool,
}

struct Source {
    path: PathBuf,
    text: String,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load(&self) -> Result<Vec<Source>> {
        let paths = resolve_file_path_patterns(&self.input)?;
        paths
            .into_iter()
            .map(|path| {
                let text = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read query file {}", path.display()))?;
                Ok(Source { path, text })
            })
            .collect()
    }
}

impl RequestSettings {
    fn load_variables(&self) -> Result<Variables> {
        let Some(path) = self.variables.as_ref() else {
            return Ok(Variables::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read variables file {}", path.display()))?;
        path_de::from_str_with_path(&text)
            .map_err(anyhow::Error::msg)
            .with_context(|| format!("invalid variables in {}", path.display()))
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    /// Logs go to stderr so stdout stays valid JSON.
    pub fn init_logging(&self) {
        let fallback = if self.verbose { "info" } else { "warn" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    }

    pub fn run(&self) -> Result<ExitCode> {
        let schema = demo::schema().context("failed to build the bookshelf schema")?;
        match &self.cmd {
            Command::Query(target) => run_queries(&schema, target),
            Command::Schema(target) => {
                let (query, mutation) = demo::roots();
                let response = schema.execute(&query, &mutation, Request::new(INTROSPECTION_QUERY));
                if !response.is_ok() {
                    bail!("introspection failed: {}", response.errors[0].message);
                }
                emit(target.out.as_deref(), &response.data)?;
                Ok(ExitCode::SUCCESS)
            }
            Command::Parse(target) => run_parse(&schema, target),
        }
    }
}

/// Each file runs against its own freshly seeded shelf, so mutations in one
/// file never show up in another. Results keep input order.
fn run_queries(schema: &Schema, target: &QueryOut) -> Result<ExitCode> {
    let sources = target.input_settings.load()?;
    let variables = target.request_settings.load_variables()?;
    let options = ResolveOptions {
        tracing: target.tracing,
        max_depth: target.input_settings.max_depth,
        ..ResolveOptions::default()
    };

    let responses: Vec<(&Source, Response)> = sources
        .par_iter()
        .map(|source| {
            let (query, mutation) = demo::roots();
            let mut request = Request::new(source.text.clone())
                .variables(variables.clone())
                .options(options.clone());
            request.operation_name = target.request_settings.operation_name.clone();
            (source, schema.execute(&query, &mutation, request))
        })
        .collect();

    let mut failed = 0;
    for (source, response) in &responses {
        if response.is_ok() {
            tracing::info!(path = %source.path.display(), "query succeeded");
            continue;
        }
        failed += 1;
        for error in &response.errors {
            eprintln!("{} {}: {}", "error".red().bold(), source.path.display(), error.message);
        }
    }

    let output = match responses.as_slice() {
        [(_, response)] => response.to_json(),
        many => Json::Object(
            many.iter()
                .map(|(source, response)| (source.path.display().to_string(), response.to_json()))
                .collect(),
        ),
    };
    emit(target.out.as_deref(), &output)?;
    Ok(if failed == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run_parse(schema: &Schema, target: &ParseOut) -> Result<ExitCode> {
    let sources = target.input_settings.load()?;
    let variables = target.request_settings.load_variables()?;
    let operation_name = target.request_settings.operation_name.as_deref();
    let mut failed = false;
    for source in &sources {
        let path = source.path.display();
        let document = match parser::parse_query_with_depth(&source.text, target.input_settings.max_depth) {
            Ok(document) => document,
            Err(error) => {
                failed = true;
                eprintln!("{} {path}:{}: {}", "syntax".red().bold(), error.pos, error.message);
                continue;
            }
        };
        if target.validate {
            if let Err(errors) = validation::validate(schema, &document, operation_name, &variables) {
                failed = true;
                for error in errors {
                    match error.locations.first() {
                        Some(pos) => eprintln!("{} {path}:{pos}: {}", "invalid".yellow().bold(), error.message),
                        None => eprintln!("{} {path}: {}", "invalid".yellow().bold(), error.message),
                    }
                }
                continue;
            }
        }
        if target.ast {
            let ast = serde_json::to_string_pretty(&document).context("failed to serialize the syntax tree")?;
            println!("{ast}");
        } else {
            println!("{} {path}", "ok".green().bold());
        }
    }
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn emit(out: Option<&Path>, value: &Json) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to serialize output")?;
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(out, &text).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'['))
    }

    let mut out = Vec::<PathBuf>::new();
    for raw in patterns {
        let pattern = raw.as_ref();
        if !has_glob_chars(pattern) {
            out.push(PathBuf::from(pattern));
            continue;
        }
        let before = out.len();
        for entry in glob::glob(pattern).with_context(|| format!("bad glob pattern {pattern}"))? {
            out.push(entry?);
        }
        if out.len() == before {
            bail!("glob pattern matched no files: {pattern}");
        }
    }
    Ok(out)
}
