//! Converters from raw configuration sources to flat `key`/`value` pairs.
//!
//! Keys use `:` as the section separator, so `{"Logging": {"LogLevel":
//! {"Default": "Debug"}}}`, the environment variable
//! `Logging__LogLevel__Default=Debug` and the argument
//! `--Logging:LogLevel:Default=Debug` all produce the same entry.

use serde_json::Value;

/// Separator between a key's sections.
pub const KEY_DELIMITER: &str = ":";

/// Flattens a JSON value into `(key, value)` pairs.
///
/// Objects contribute one section per member, arrays one section per index.
/// Empty objects and arrays, and `null`, become an empty value.
pub fn flatten_json(value: &Value, prefix: &str, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (name, child) in map {
                flatten_json(child, &join(prefix, name), out);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_json(child, &join(prefix, &index.to_string()), out);
            }
        }
        _ if prefix.is_empty() => {}
        Value::Object(_) | Value::Array(_) | Value::Null => {
            out.push((prefix.to_owned(), String::new()));
        }
        Value::String(s) => out.push((prefix.to_owned(), s.clone())),
        Value::Bool(b) => out.push((prefix.to_owned(), b.to_string())),
        Value::Number(n) => out.push((prefix.to_owned(), n.to_string())),
    }
}

/// Maps an environment variable name to a configuration key.
pub fn env_key(name: &str) -> String {
    name.replace("__", KEY_DELIMITER)
}

/// Parses command-line arguments.
///
/// Accepted forms: `--key=value`, `--key value`, `/key=value`, `/key value`
/// and `key=value`. Anything else is skipped.
pub fn parse_command_line<I>(args: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = String>,
{
    let mut pairs = Vec::new();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (body, prefixed) = if let Some(rest) = arg.strip_prefix("--") {
            (rest, true)
        } else if let Some(rest) = arg.strip_prefix('/') {
            (rest, true)
        } else {
            (arg.as_str(), false)
        };

        if let Some((key, value)) = body.split_once('=') {
            if !key.is_empty() {
                pairs.push((key.to_owned(), value.to_owned()));
            }
        } else if prefixed && !body.is_empty() {
            match args.next() {
                Some(value) => pairs.push((body.to_owned(), value)),
                None => break,
            }
        }
    }

    pairs
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}{KEY_DELIMITER}{name}")
    }
}
