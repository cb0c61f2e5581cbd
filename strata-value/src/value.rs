use std::fmt::{self, Display};

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// An ordered mapping of string keys to values. Insertion order is preserved
/// and is significant for composition.
pub type Map = IndexMap<String, Value>;

/// The quote style a string was written with. Preserved so that re-emission
/// produces the same spelling that was parsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quote {
  Single,
  Double,
}

/// The sentinel spelling of [`Value::Missing`].
pub const MISSING: &str = "???";

/// A configuration tree node.
///
/// Interpolation placeholders (`${...}`) are kept verbatim inside
/// [`Value::String`] until resolution.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  String(String),
  /// A string that was explicitly quoted, with its quote kind.
  Quoted(String, Quote),
  /// A mandatory value that has not been provided yet (`???`).
  Missing,
  Seq(Vec<Value>),
  Map(Map),
}

impl Value {
  pub fn as_map(&self) -> Option<&Map> {
    match self {
      Self::Map(m) => Some(m),
      _ => None,
    }
  }

  pub fn as_map_mut(&mut self) -> Option<&mut Map> {
    match self {
      Self::Map(m) => Some(m),
      _ => None,
    }
  }

  pub fn as_seq(&self) -> Option<&Vec<Value>> {
    match self {
      Self::Seq(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_seq_mut(&mut self) -> Option<&mut Vec<Value>> {
    match self {
      Self::Seq(s) => Some(s),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Self::String(s) | Self::Quoted(s, _) => Some(s),
      _ => None,
    }
  }

  pub fn is_missing(&self) -> bool {
    matches!(self, Self::Missing)
  }

  pub fn is_scalar(&self) -> bool {
    !matches!(self, Self::Seq(_) | Self::Map(_))
  }

  /// The name used when reporting this node's type in errors.
  pub fn type_name(&self) -> &'static str {
    match self {
      Self::Null => "null",
      Self::Bool(_) => "bool",
      Self::Int(_) => "int",
      Self::Float(_) => "float",
      Self::String(_) | Self::Quoted(..) => "str",
      Self::Missing => "missing",
      Self::Seq(_) => "list",
      Self::Map(_) => "dict",
    }
  }

  /// True for strings that still contain an unresolved `${...}` placeholder.
  pub fn has_interpolation(&self) -> bool {
    matches!(self, Self::String(s) if s.contains("${"))
  }

  /// Drops the quote marker, turning a [`Value::Quoted`] into a plain string.
  /// Quoting only matters for re-emission of override lines; composed trees
  /// hold plain strings.
  pub fn unquoted(self) -> Self {
    match self {
      Self::Quoted(s, _) => Self::String(s),
      Self::Seq(items) => Self::Seq(items.into_iter().map(Self::unquoted).collect()),
      Self::Map(map) => Self::Map(map.into_iter().map(|(k, v)| (k, v.unquoted())).collect()),
      other => other,
    }
  }
}

/// Renders a float so that it re-parses as a float (`4.0`, not `4`).
pub fn format_float(f: f64) -> String {
  if f.is_nan() {
    "nan".to_string()
  } else if f.is_infinite() {
    if f > 0.0 { "inf".to_string() } else { "-inf".to_string() }
  } else if f.fract() == 0.0 && f.abs() < 1e16 {
    format!("{f:.1}")
  } else {
    format!("{f}")
  }
}

impl Display for Value {
  /// Flow-style rendering: scalars plain, containers in `[..]`/`{..}` form.
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Null => f.write_str("null"),
      Self::Bool(b) => write!(f, "{b}"),
      Self::Int(i) => write!(f, "{i}"),
      Self::Float(fl) => f.write_str(&format_float(*fl)),
      Self::String(s) => f.write_str(s),
      Self::Quoted(s, Quote::Single) => write!(f, "'{s}'"),
      Self::Quoted(s, Quote::Double) => write!(f, "\"{s}\""),
      Self::Missing => f.write_str(MISSING),
      Self::Seq(items) => {
        f.write_str("[")?;
        for (i, item) in items.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{item}")?;
        }
        f.write_str("]")
      }
      Self::Map(map) => {
        f.write_str("{")?;
        for (i, (k, v)) in map.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{k}: {v}")?;
        }
        f.write_str("}")
      }
    }
  }
}

impl Serialize for Value {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    match self {
      Self::Null => serializer.serialize_unit(),
      Self::Bool(b) => serializer.serialize_bool(*b),
      Self::Int(i) => serializer.serialize_i64(*i),
      Self::Float(f) => serializer.serialize_f64(*f),
      Self::String(s) | Self::Quoted(s, _) => serializer.serialize_str(s),
      Self::Missing => serializer.serialize_str(MISSING),
      Self::Seq(items) => {
        let mut seq = serializer.serialize_seq(Some(items.len()))?;
        for item in items {
          seq.serialize_element(item)?;
        }
        seq.end()
      }
      Self::Map(map) => {
        let mut ser = serializer.serialize_map(Some(map.len()))?;
        for (k, v) in map {
          ser.serialize_entry(k, v)?;
        }
        ser.end()
      }
    }
  }
}

impl From<&str> for Value {
  fn from(s: &str) -> Self {
    Self::String(s.to_string())
  }
}

impl From<String> for Value {
  fn from(s: String) -> Self {
    Self::String(s)
  }
}

impl From<i64> for Value {
  fn from(i: i64) -> Self {
    Self::Int(i)
  }
}

impl From<f64> for Value {
  fn from(f: f64) -> Self {
    Self::Float(f)
  }
}

impl From<bool> for Value {
  fn from(b: bool) -> Self {
    Self::Bool(b)
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;

  use super::*;

  #[test]
  fn float_display_keeps_fraction_marker() {
    assert_eq!(Value::Float(4.0).to_string(), "4.0");
    assert_eq!(Value::Float(4.5).to_string(), "4.5");
    assert_eq!(Value::Float(f64::INFINITY).to_string(), "inf");
  }

  #[test]
  fn flow_rendering() {
    let mut map = Map::new();
    map.insert("a".to_string(), Value::Int(1));
    map.insert("b".to_string(), Value::Seq(vec![Value::Bool(true), Value::Null]));
    assert_eq!(Value::Map(map).to_string(), "{a: 1, b: [true, null]}");
  }

  #[test]
  fn unquoted_recurses_into_containers() {
    let v = Value::Seq(vec![Value::Quoted("x".to_string(), Quote::Single)]);
    assert_eq!(v.unquoted(), Value::Seq(vec![Value::String("x".to_string())]));
  }
}
