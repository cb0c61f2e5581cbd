use std::collections::BTreeSet;
use std::fmt::Write as _;

use strata_value::Value;

/// How an override line modifies the composition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverrideType {
  /// `key=value`
  Change,
  /// `+key=value`
  Add,
  /// `++key=value`
  ForceAdd,
  /// `~key` or `~key=value`
  Del,
}

/// The shape of the parsed value, mirroring the grammar alternatives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
  Element,
  ChoiceSweep,
  SimpleChoiceSweep,
  GlobChoiceSweep,
  RangeSweep,
  IntervalSweep,
  ListMutation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListOperation {
  Append,
  Prepend,
  Insert,
  RemoveAt,
  RemoveValue,
  Clear,
}

/// A discrete set of alternatives. `simple_form` marks the bare `a,b,c`
/// spelling so re-emission can reproduce it.
#[derive(Clone, Debug, PartialEq)]
pub struct ChoiceSweep {
  pub items: Vec<Value>,
  pub tags: BTreeSet<String>,
  pub simple_form: bool,
  pub shuffle: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RangeSweep {
  pub start: f64,
  pub stop: f64,
  pub step: f64,
  pub is_int: bool,
  pub tags: BTreeSet<String>,
  pub shuffle: bool,
}

/// A continuous interval. Never materialized by the expander; forwarded to
/// the sweeper untouched.
#[derive(Clone, Debug, PartialEq)]
pub struct IntervalSweep {
  pub start: f64,
  pub end: f64,
  pub tags: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobSweep {
  pub include: Vec<String>,
  pub exclude: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Sweep {
  Choice(ChoiceSweep),
  Range(RangeSweep),
  Interval(IntervalSweep),
  Glob(GlobSweep),
}

impl Sweep {
  pub fn is_discrete(&self) -> bool {
    !matches!(self, Self::Interval(_))
  }

  pub fn tags_mut(&mut self) -> Option<&mut BTreeSet<String>> {
    match self {
      Self::Choice(c) => Some(&mut c.tags),
      Self::Range(r) => Some(&mut r.tags),
      Self::Interval(i) => Some(&mut i.tags),
      Self::Glob(_) => None,
    }
  }
}

/// A list mutation such as `append(a,b)` or `remove_at(2)`.
#[derive(Clone, Debug, PartialEq)]
pub struct ListMutation {
  pub operation: ListOperation,
  pub index: Option<i64>,
  pub values: Vec<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverrideValue {
  /// No value was given (`~key`).
  Absent,
  Element(Value),
  Sweep(Sweep),
  ListMutation(ListMutation),
}

/// One parsed override line.
#[derive(Clone, Debug, PartialEq)]
pub struct Override {
  pub override_type: OverrideType,
  pub key_or_group: String,
  pub package: Option<String>,
  pub value: OverrideValue,
  pub input_line: String,
}

impl Override {
  pub fn value_type(&self) -> Option<ValueType> {
    match &self.value {
      OverrideValue::Absent => None,
      OverrideValue::Element(_) => Some(ValueType::Element),
      OverrideValue::ListMutation(_) => Some(ValueType::ListMutation),
      OverrideValue::Sweep(sweep) => Some(match sweep {
        Sweep::Choice(c) if c.simple_form => ValueType::SimpleChoiceSweep,
        Sweep::Choice(_) => ValueType::ChoiceSweep,
        Sweep::Range(_) => ValueType::RangeSweep,
        Sweep::Interval(_) => ValueType::IntervalSweep,
        Sweep::Glob(_) => ValueType::GlobChoiceSweep,
      }),
    }
  }

  pub fn is_sweep(&self) -> bool {
    matches!(self.value, OverrideValue::Sweep(_))
  }

  pub fn is_discrete_sweep(&self) -> bool {
    matches!(&self.value, OverrideValue::Sweep(s) if s.is_discrete())
  }

  pub fn is_list_mutation(&self) -> bool {
    matches!(self.value, OverrideValue::ListMutation(_))
  }

  pub fn is_delete(&self) -> bool {
    self.override_type == OverrideType::Del
  }

  pub fn is_add(&self) -> bool {
    self.override_type == OverrideType::Add
  }

  pub fn is_force_add(&self) -> bool {
    self.override_type == OverrideType::ForceAdd
  }

  /// The concrete element of a non-sweep override. `None` means the value
  /// was the `null` keyword or absent.
  pub fn element(&self) -> Option<&Value> {
    match &self.value {
      OverrideValue::Element(v) => Some(v),
      _ => None,
    }
  }

  /// `key` or `key@package`, with the `+`/`++`/`~` prefix re-attached.
  pub fn key_element(&self) -> String {
    let prefix = match self.override_type {
      OverrideType::Change => "",
      OverrideType::Add => "+",
      OverrideType::ForceAdd => "++",
      OverrideType::Del => "~",
    };
    match &self.package {
      Some(pkg) => format!("{prefix}{}@{pkg}", self.key_or_group),
      None => format!("{prefix}{}", self.key_or_group),
    }
  }

  /// Re-emits the override as a line that parses back to an equivalent
  /// record.
  pub fn to_override_string(&self) -> String {
    let mut out = self.key_element();
    match &self.value {
      OverrideValue::Absent => {}
      other => {
        out.push('=');
        out.push_str(&render_override_value(other));
      }
    }
    out
  }
}

fn render_override_value(value: &OverrideValue) -> String {
  match value {
    OverrideValue::Absent => String::new(),
    OverrideValue::Element(v) => v.to_string(),
    OverrideValue::ListMutation(m) => render_list_mutation(m),
    OverrideValue::Sweep(sweep) => render_sweep(sweep),
  }
}

fn render_list_mutation(m: &ListMutation) -> String {
  let values = join_values(&m.values);
  match m.operation {
    ListOperation::Append => format!("append({values})"),
    ListOperation::Prepend => format!("prepend({values})"),
    ListOperation::Insert => format!("insert({},{values})", m.index.unwrap_or(0)),
    ListOperation::RemoveAt => format!("remove_at({})", m.index.unwrap_or(0)),
    ListOperation::RemoveValue => format!("remove_value({values})"),
    ListOperation::Clear => "list_clear()".to_string(),
  }
}

fn render_sweep(sweep: &Sweep) -> String {
  let mut out = match sweep {
    Sweep::Choice(c) if c.simple_form => join_values(&c.items),
    Sweep::Choice(c) => format!("choice({})", join_values(&c.items)),
    Sweep::Range(r) => {
      let fmt = |f: f64| {
        if r.is_int {
          format!("{}", f as i64)
        } else {
          strata_value::format_float(f)
        }
      };
      format!("range({},{},{})", fmt(r.start), fmt(r.stop), fmt(r.step))
    }
    Sweep::Interval(i) => format!(
      "interval({},{})",
      strata_value::format_float(i.start),
      strata_value::format_float(i.end)
    ),
    Sweep::Glob(g) => {
      let mut inner = format!("glob(include=[{}]", g.include.join(","));
      if !g.exclude.is_empty() {
        let _ = write!(inner, ",exclude=[{}]", g.exclude.join(","));
      }
      inner.push(')');
      inner
    }
  };

  let (tags, shuffle) = match sweep {
    Sweep::Choice(c) => (&c.tags, c.shuffle),
    Sweep::Range(r) => (&r.tags, r.shuffle),
    Sweep::Interval(i) => (&i.tags, false),
    Sweep::Glob(_) => return out,
  };
  if shuffle {
    out = format!("shuffle({out})");
  }
  if !tags.is_empty() {
    let tag_list = tags.iter().cloned().collect::<Vec<_>>().join(",");
    out = format!("tag({tag_list},{out})");
  }
  out
}

fn join_values(values: &[Value]) -> String {
  values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}
