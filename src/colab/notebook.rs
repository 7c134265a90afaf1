//! Notebook document helpers.
//!
//! Notebooks are handled as `serde_json::Value` so that every key the
//! converter doesn't touch survives unchanged and in its original order.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::Path;

/// Cell kinds the converter cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Code,
    Markdown,
    Other,
}

pub fn cell_kind(cell: &Value) -> CellKind {
    match cell.get("cell_type").and_then(Value::as_str) {
        Some("code") => CellKind::Code,
        Some("markdown") => CellKind::Markdown,
        _ => CellKind::Other,
    }
}

/// Cell source as one string, whether stored as a list of lines or a string.
pub fn source_as_str(cell: &Value) -> String {
    match cell.get("source") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(lines)) => lines.iter().filter_map(Value::as_str).collect(),
        _ => String::new(),
    }
}

/// Split text into the list-of-lines form notebooks use on disk.
///
/// Every line but the last keeps its trailing `\n`; the last is kept as is,
/// even when empty.
pub fn str_to_source(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut lines: Vec<String> = text.split('\n').map(|l| format!("{l}\n")).collect();
    if let Some(last) = lines.last_mut() {
        last.pop();
    }
    lines
}

pub fn set_source(cell: &mut Value, text: &str) {
    if let Some(obj) = cell.as_object_mut() {
        obj.insert("source".to_string(), json!(str_to_source(text)));
    }
}

/// Drop outputs and execution counts from a code cell.
pub fn clear_outputs(cell: &mut Value) {
    if let Some(obj) = cell.as_object_mut() {
        obj.insert("outputs".to_string(), Value::Array(Vec::new()));
        obj.insert("execution_count".to_string(), Value::Null);
    }
}

pub fn make_code_cell(cell_id: &str, source: &str) -> Value {
    let mut cell = Map::new();
    cell.insert("cell_type".to_string(), json!("code"));
    cell.insert("id".to_string(), json!(cell_id));
    cell.insert("metadata".to_string(), json!({}));
    cell.insert("source".to_string(), json!(str_to_source(source)));
    cell.insert("outputs".to_string(), json!([]));
    cell.insert("execution_count".to_string(), Value::Null);
    Value::Object(cell)
}

pub fn read_notebook(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let notebook = serde_json::from_str(&content)
        .with_context(|| format!("Invalid notebook JSON in {}", path.display()))?;
    Ok(notebook)
}

/// Write with one-space indentation and a trailing newline, the layout
/// Jupyter itself produces.
pub fn write_notebook(notebook: &Value, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    notebook.serialize(&mut ser)?;
    buf.push(b'\n');

    std::fs::write(path, buf).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_str_to_source() {
        assert!(str_to_source("").is_empty());
        assert_eq!(str_to_source("a"), vec!["a"]);
        assert_eq!(str_to_source("a\nb"), vec!["a\n", "b"]);
        assert_eq!(str_to_source("a\n"), vec!["a\n", ""]);
    }

    #[test]
    fn test_source_as_str() {
        let list = json!({"source": ["x = 1\n", "y = 2"]});
        assert_eq!(source_as_str(&list), "x = 1\ny = 2");

        let string = json!({"source": "print(1)"});
        assert_eq!(source_as_str(&string), "print(1)");

        assert_eq!(source_as_str(&json!({})), "");
    }

    #[test]
    fn test_make_code_cell_layout() {
        let cell = make_code_cell("colab-x", "a\nb");
        let keys: Vec<&str> = cell.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["cell_type", "id", "metadata", "source", "outputs", "execution_count"]
        );
        assert_eq!(cell["source"], json!(["a\n", "b"]));
        assert!(cell["execution_count"].is_null());
    }

    #[test]
    fn test_write_notebook_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("nb.ipynb");
        let nb = json!({"cells": [], "metadata": {"title": "Göteborg"}});

        write_notebook(&nb, &path).unwrap();
        let written = std::fs::read_to_string(&path).unwrap();

        assert_eq!(
            written,
            "{\n \"cells\": [],\n \"metadata\": {\n  \"title\": \"Göteborg\"\n }\n}\n"
        );
    }
}
