use serde::de::DeserializeOwned;

fn with_path<'de, D, T>(de: D) -> Result<T, String>
where
    D: serde::Deserializer<'de>,
    T: DeserializeOwned,
{
    serde_path_to_error::deserialize::<_, T>(de).map_err(|err| {
        let path = err.path().to_string();
        format!("at JSON path {path} → {}", err.into_inner())
    })
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, String> {
    with_path(&mut serde_json::Deserializer::from_str(src))
}

/// Coerced arguments into a host argument struct. The path names the Rust field.
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, String> {
    with_path(value)
}
