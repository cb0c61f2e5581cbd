use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;

use crate::{Map, Value, ValueError, MISSING};

/// A loaded configuration document together with its front-matter header and
/// the source that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
  pub value: Value,
  pub header: IndexMap<String, String>,
  pub source_provider: String,
  pub source_uri: String,
  pub path_in_source: String,
}

impl Document {
  pub fn new(value: Value, header: IndexMap<String, String>) -> Self {
    Self {
      value,
      header,
      source_provider: String::new(),
      source_uri: String::new(),
      path_in_source: String::new(),
    }
  }

  /// The `package` header entry, if the document declares one.
  pub fn package_header(&self) -> Option<&str> {
    self.header.get("package").map(String::as_str)
  }
}

static HEADER_LINE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^#\s*@(\w[\w.\-]*)\s*:?\s+(.*?)\s*$").unwrap());

/// Collects `# @key value` front-matter lines from the top of a document.
///
/// Scanning stops at the first line that is neither blank nor a comment;
/// plain comments are skipped without ending the header block.
pub fn extract_header(text: &str) -> IndexMap<String, String> {
  let mut header = IndexMap::new();

  for line in text.lines() {
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    if !trimmed.starts_with('#') {
      break;
    }
    if let Some(caps) = HEADER_LINE.captures(trimmed) {
      header.insert(caps[1].to_string(), caps[2].to_string());
    }
  }

  header
}

/// Parses a document body: front-matter header plus YAML content.
/// An empty body yields an empty mapping.
pub fn parse_document(text: &str) -> Result<Document, ValueError> {
  let header = extract_header(text);
  let value = from_yaml_str(text)?;
  Ok(Document::new(value, header))
}

/// Parses YAML text into a [`Value`] tree. `???` becomes [`Value::Missing`]
/// and interpolation strings are preserved verbatim. A document with no
/// content (empty, or comments and headers only) yields an empty mapping.
pub fn from_yaml_str(text: &str) -> Result<Value, ValueError> {
  let has_content = text.lines().any(|line| {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
  });
  if !has_content {
    return Ok(Value::Map(Map::new()));
  }

  let raw: serde_yaml_ng::Value = serde_yaml_ng::from_str(text)?;
  match convert(raw) {
    Value::Null => Ok(Value::Map(Map::new())),
    value => Ok(value),
  }
}

/// Emits a document as YAML, re-attaching its front-matter header lines.
pub fn to_yaml_string(value: &Value, header: &IndexMap<String, String>) -> Result<String, ValueError> {
  let body = serde_yaml_ng::to_string(value).map_err(|e| ValueError::YamlEmit {
    message: e.to_string(),
  })?;

  if header.is_empty() {
    return Ok(body);
  }

  let mut out = String::new();
  for (key, val) in header {
    out.push_str(&format!("# @{key} {val}\n"));
  }
  out.push_str(&body);
  Ok(out)
}

fn convert(raw: serde_yaml_ng::Value) -> Value {
  match raw {
    serde_yaml_ng::Value::Null => Value::Null,
    serde_yaml_ng::Value::Bool(b) => Value::Bool(b),
    serde_yaml_ng::Value::Number(n) => {
      if let Some(i) = n.as_i64() {
        Value::Int(i)
      } else {
        Value::Float(n.as_f64().unwrap_or(f64::NAN))
      }
    }
    serde_yaml_ng::Value::String(s) => {
      if s == MISSING {
        Value::Missing
      } else {
        Value::String(s)
      }
    }
    serde_yaml_ng::Value::Sequence(items) => Value::Seq(items.into_iter().map(convert).collect()),
    serde_yaml_ng::Value::Mapping(mapping) => {
      let mut map = Map::new();
      for (k, v) in mapping {
        map.insert(key_to_string(k), convert(v));
      }
      Value::Map(map)
    }
    serde_yaml_ng::Value::Tagged(tagged) => convert(tagged.value),
  }
}

/// Non-string mapping keys normalize to their canonical string spelling.
fn key_to_string(key: serde_yaml_ng::Value) -> String {
  match key {
    serde_yaml_ng::Value::String(s) => s,
    serde_yaml_ng::Value::Bool(b) => b.to_string(),
    serde_yaml_ng::Value::Number(n) => n.to_string(),
    serde_yaml_ng::Value::Null => "null".to_string(),
    other => serde_yaml_ng::to_string(&other).unwrap_or_default().trim_end().to_string(),
  }
}
