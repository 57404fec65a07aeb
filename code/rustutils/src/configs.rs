/// Read run configuration data for utplot from a json file.
///
/// The file format is a single object { ... } with the following named fields and value types, all
/// of them optional:
///
///   socket - string, the socket to focus on; no automatic selection is performed
///   all-sockets - bool, include the records for every socket (cannot be combined with `socket`)
///   quantization - number, the bucket width for the delay histogram, must be positive
///   output-dir - string, the directory the artifacts are written to
///   prefix - string, the prefix of the artifact file names
///   cross-socket-window - bool, sum the max_window column across all sockets even when a single
///                         socket is selected
///   indicator-rows-only - bool, emit rows only for samples that carry the delay sample metric
///
/// Any field name starting with '#' is reserved for arbitrary comments.  Any other field name is an
/// error, so that misspellings are caught.
///
/// Values given on the command line override values in the file.
use anyhow::{bail, Result};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path;

const KNOWN_FIELDS: [&str; 7] = [
    "socket",
    "all-sockets",
    "quantization",
    "output-dir",
    "prefix",
    "cross-socket-window",
    "indicator-rows-only",
];

// See above comment block for field documentation.

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunConfig {
    pub socket: Option<String>,
    pub all_sockets: Option<bool>,
    pub quantization: Option<f64>,
    pub output_dir: Option<String>,
    pub prefix: Option<String>,
    pub cross_socket_window: Option<bool>,
    pub indicator_rows_only: Option<bool>,
}

/// The input is human-generated and every field is optional, so the generic JSON parser is followed
/// by explicit decoding of the fields rather than a (derived) strongly-typed parser.  That gives us
/// the error messages we want.

pub fn read_run_config(filename: &str) -> Result<RunConfig> {
    let file = File::open(path::Path::new(filename))?;
    let reader = BufReader::new(file);
    let v = serde_json::from_reader(reader)?;
    run_config_from_value(&v)
}

pub fn run_config_from_value(v: &Value) -> Result<RunConfig> {
    let Value::Object(fields) = v else {
        bail!("Expected an object value")
    };
    for name in fields.keys() {
        if !name.starts_with('#') && !KNOWN_FIELDS.contains(&name.as_str()) {
            bail!("Unknown field '{name}'")
        }
    }
    let cfg = RunConfig {
        socket: grab_string_opt(fields, "socket")?,
        all_sockets: grab_bool_opt(fields, "all-sockets")?,
        quantization: grab_f64_opt(fields, "quantization")?,
        output_dir: grab_string_opt(fields, "output-dir")?,
        prefix: grab_string_opt(fields, "prefix")?,
        cross_socket_window: grab_bool_opt(fields, "cross-socket-window")?,
        indicator_rows_only: grab_bool_opt(fields, "indicator-rows-only")?,
    };
    if cfg.socket.is_some() && cfg.all_sockets == Some(true) {
        bail!("Fields 'socket' and 'all-sockets' are mutually exclusive")
    }
    if let Some(q) = cfg.quantization {
        if !(q.is_finite() && q > 0.0) {
            bail!("Field 'quantization' must be a positive number")
        }
    }
    Ok(cfg)
}

fn grab_string_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<String>> {
    if let Some(val) = fields.get(name) {
        if let Value::String(s) = val {
            Ok(Some(s.to_string()))
        } else {
            bail!("Field '{name}' must have a string value");
        }
    } else {
        Ok(None)
    }
}

fn grab_f64_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<f64>> {
    if let Some(val) = fields.get(name) {
        if let Some(n) = val.as_f64() {
            Ok(Some(n))
        } else {
            bail!("Field '{name}' must have a numeric value")
        }
    } else {
        Ok(None)
    }
}

fn grab_bool_opt(fields: &serde_json::Map<String, Value>, name: &str) -> Result<Option<bool>> {
    if let Some(d) = fields.get(name) {
        if let Value::Bool(b) = d {
            Ok(Some(*b))
        } else {
            bail!("Field '{name}' must have a boolean value");
        }
    } else {
        Ok(None)
    }
}

#[test]
fn test_run_config() {
    let v = serde_json::json!({
        "#": "focus on the busy socket",
        "socket": "0x00ec1190",
        "quantization": 5,
        "prefix": "run1.",
        "indicator-rows-only": true
    });
    let cfg = run_config_from_value(&v).unwrap();
    assert!(cfg.socket.as_deref() == Some("0x00ec1190"));
    assert!(cfg.quantization == Some(5.0));
    assert!(cfg.prefix.as_deref() == Some("run1."));
    assert!(cfg.indicator_rows_only == Some(true));
    assert!(cfg.all_sockets.is_none());
    assert!(cfg.output_dir.is_none());
    assert!(cfg.cross_socket_window.is_none());
}

#[test]
fn test_run_config_errors() {
    assert!(run_config_from_value(&serde_json::json!([1, 2])).is_err());
    assert!(run_config_from_value(&serde_json::json!({"sokcet": "a"})).is_err());
    assert!(run_config_from_value(&serde_json::json!({"socket": 7})).is_err());
    assert!(run_config_from_value(&serde_json::json!({"quantization": 0})).is_err());
    assert!(run_config_from_value(&serde_json::json!({"quantization": -2.5})).is_err());
    assert!(run_config_from_value(&serde_json::json!({"all-sockets": "yes"})).is_err());
    assert!(
        run_config_from_value(&serde_json::json!({"socket": "a", "all-sockets": true})).is_err()
    );
    assert!(run_config_from_value(&serde_json::json!({})).unwrap() == RunConfig::default());
}
