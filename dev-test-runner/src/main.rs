//! Replays `cases/*.json` against the bookshelf schema.
//!
//! ```text
//! cargo run -p dev-test-runner -- [--filter REGEX] [CASE_DIR]
//! ```
//!
//! Each file holds an array of cases. Every case runs on a freshly seeded
//! shelf, and the whole response envelope must equal `expected`.
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use glob::glob;
use once_cell::sync::{Lazy, OnceCell};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as Json;

use reflectql::{Request, ResolveOptions, Schema, Variables, demo};

static SCHEMA: OnceCell<Schema> = OnceCell::new();

/// Case names double as filter targets, so keep them greppable.
static CASE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9_]+$").unwrap());

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Case {
    name: String,
    query: String,
    #[serde(default)]
    operation_name: Option<String>,
    #[serde(default)]
    variables: Variables,
    #[serde(default)]
    max_depth: Option<usize>,
    expected: Json,
}

/// replay JSON case files against the bookshelf schema
#[derive(Parser, Debug)]
#[command(name = "dev-test-runner")]
struct Settings {
    /// only run cases whose name matches this regex
    #[arg(long)]
    filter: Option<Regex>,

    /// directory holding the *.json case files
    #[arg(default_value = concat!(env!("CARGO_MANIFEST_DIR"), "/cases"))]
    dir: PathBuf,
}

fn load_cases(path: &Path) -> Result<Vec<Case>, String> {
    let source = std::fs::read_to_string(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let cases: Vec<Case> =
        reflectql::path_de::from_str_with_path(&source).map_err(|e| format!("{}: {e}", path.display()))?;
    if let Some(bad) = cases.iter().find(|case| !CASE_NAME.is_match(&case.name)) {
        return Err(format!("{}: case name {:?} must be snake_case", path.display(), bad.name));
    }
    Ok(cases)
}

fn run_case(schema: &Schema, case: &Case) -> Result<(), String> {
    let (query, mutation) = demo::roots();
    let mut options = ResolveOptions::default();
    if let Some(max_depth) = case.max_depth {
        options.max_depth = max_depth;
    }
    let mut request = Request::new(case.query.as_str()).variables(case.variables.clone()).options(options);
    request.operation_name = case.operation_name.clone();
    let actual = schema.execute(&query, &mutation, request).to_json();
    if actual == case.expected {
        return Ok(());
    }
    let render = |value: &Json| serde_json::to_string_pretty(value).unwrap_or_else(|e| e.to_string());
    Err(format!("expected:\n{}\nactual:\n{}", render(&case.expected), render(&actual)))
}

fn run() -> Result<bool, String> {
    let settings = Settings::parse();
    let schema = SCHEMA.get_or_try_init(demo::schema).map_err(|e| e.to_string())?;

    let mut files = case_files(&settings.dir)?;
    files.sort();
    if files.is_empty() {
        return Err(format!("no *.json case files in {}", settings.dir.display()));
    }

    let (mut passed, mut failed) = (0usize, 0usize);
    for file in &files {
        for case in load_cases(file)? {
            if settings.filter.as_ref().is_some_and(|filter| !filter.is_match(&case.name)) {
                continue;
            }
            match run_case(schema, &case) {
                Ok(()) => {
                    passed += 1;
                    println!("✅ {}", case.name);
                }
                Err(diff) => {
                    failed += 1;
                    println!("❌ {} ({})\n{diff}", case.name, file.display());
                }
            }
        }
    }
    println!("—— {passed} passed, {failed} failed ——");
    Ok(failed == 0)
}

fn case_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let pattern = format!("{}/*.json", dir.display());
    let entries = glob(&pattern).map_err(|e| format!("bad case pattern {pattern}: {e}"))?;
    entries.map(|entry| entry.map_err(|e| e.to_string())).collect()
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("dev-test-runner: {error}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_default_to_the_bundled_cases() {
        let settings = Settings::try_parse_from(["dev-test-runner"]).unwrap();
        assert!(settings.filter.is_none());
        assert_eq!(settings.dir, PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/cases")));

        let settings = Settings::try_parse_from(["dev-test-runner", "--filter", "^search", "/tmp/cases"]).unwrap();
        assert!(settings.filter.unwrap().is_match("search_with_limit"));
        assert_eq!(settings.dir, PathBuf::from("/tmp/cases"));

        assert!(Settings::try_parse_from(["dev-test-runner", "--filter", "("]).is_err());
    }

    #[test]
    fn case_files_are_the_json_files_of_the_dir() {
        let dir = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/cases"));
        let mut names: Vec<_> = case_files(dir)
            .unwrap()
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["errors.json", "mutations.json", "queries.json"]);
    }

    #[test]
    fn bundled_cases_pass() {
        let schema = demo::schema().unwrap();
        let dir = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/cases"));
        for file in case_files(dir).unwrap() {
            for case in load_cases(&file).unwrap() {
                assert_eq!(run_case(&schema, &case), Ok(()), "{}", case.name);
            }
        }
    }
}
