use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::sync::Arc;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use strata_value::{format_float, Value};

use crate::{
  overrides::types::{ChoiceSweep, GlobSweep, IntervalSweep, ListMutation, ListOperation, RangeSweep, Sweep},
  ComposeError,
};

/// The result of evaluating one grammar item or function call.
#[derive(Clone, Debug, PartialEq)]
pub enum CallResult {
  Element(Value),
  Sweep(Sweep),
  ListMutation(ListMutation),
}

impl CallResult {
  fn kind_name(&self) -> &'static str {
    match self {
      Self::Element(v) => v.type_name(),
      Self::Sweep(_) => "sweep",
      Self::ListMutation(_) => "list mutation",
    }
  }
}

#[derive(Clone, Debug)]
pub struct CallArg {
  pub name: Option<String>,
  pub value: CallResult,
}

#[derive(Clone, Debug)]
pub struct FunctionCall {
  pub name: String,
  pub args: Vec<CallArg>,
}

/// The type algebra for function parameters.
#[derive(Clone, Debug)]
pub enum ParamType {
  Any,
  Int,
  Number,
  Bool,
  Str,
  Sweep,
  List(Box<ParamType>),
  Optional(Box<ParamType>),
  Union(Vec<ParamType>),
}

impl Display for ParamType {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    match self {
      Self::Any => f.write_str("any"),
      Self::Int => f.write_str("int"),
      Self::Number => f.write_str("number"),
      Self::Bool => f.write_str("bool"),
      Self::Str => f.write_str("str"),
      Self::Sweep => f.write_str("sweep"),
      Self::List(t) => write!(f, "List[{t}]"),
      Self::Optional(t) => write!(f, "Optional[{t}]"),
      Self::Union(ts) => {
        f.write_str("Union[")?;
        for (i, t) in ts.iter().enumerate() {
          if i > 0 {
            f.write_str(", ")?;
          }
          write!(f, "{t}")?;
        }
        f.write_str("]")
      }
    }
  }
}

impl ParamType {
  fn matches(&self, value: &CallResult) -> bool {
    match self {
      Self::Any => true,
      Self::Sweep => matches!(value, CallResult::Sweep(_)),
      Self::Optional(t) => matches!(value, CallResult::Element(Value::Null)) || t.matches(value),
      Self::Union(ts) => ts.iter().any(|t| t.matches(value)),
      Self::List(t) => match value {
        CallResult::Element(Value::Seq(items)) => {
          items.iter().all(|item| t.matches(&CallResult::Element(item.clone())))
        }
        _ => false,
      },
      Self::Int => matches!(value, CallResult::Element(Value::Int(_))),
      Self::Number => matches!(value, CallResult::Element(Value::Int(_) | Value::Float(_))),
      Self::Bool => matches!(value, CallResult::Element(Value::Bool(_))),
      Self::Str => matches!(value, CallResult::Element(Value::String(_) | Value::Quoted(..))),
    }
  }
}

#[derive(Clone, Debug)]
pub struct Param {
  pub name: &'static str,
  pub ty: ParamType,
  pub required: bool,
  pub variadic: bool,
}

impl Param {
  fn new(name: &'static str, ty: ParamType) -> Self {
    Self {
      name,
      ty,
      required: true,
      variadic: false,
    }
  }

  fn optional(name: &'static str, ty: ParamType) -> Self {
    Self {
      name,
      ty,
      required: false,
      variadic: false,
    }
  }

  fn variadic(name: &'static str, ty: ParamType) -> Self {
    Self {
      name,
      ty,
      required: false,
      variadic: true,
    }
  }
}

enum BoundArg {
  Single(CallResult),
  Variadic(Vec<CallResult>),
  Missing,
}

/// Arguments after binding against a signature.
pub struct Bound {
  args: IndexMap<&'static str, BoundArg>,
}

impl Bound {
  fn single(&self, name: &str) -> Option<&CallResult> {
    match self.args.get(name) {
      Some(BoundArg::Single(v)) => Some(v),
      _ => None,
    }
  }

  fn many(&self, name: &str) -> &[CallResult] {
    match self.args.get(name) {
      Some(BoundArg::Variadic(vs)) => vs,
      _ => &[],
    }
  }

  fn element(&self, name: &str) -> Option<&Value> {
    match self.single(name) {
      Some(CallResult::Element(v)) => Some(v),
      _ => None,
    }
  }

  fn number(&self, name: &str) -> Option<f64> {
    match self.element(name) {
      Some(Value::Int(i)) => Some(*i as f64),
      Some(Value::Float(f)) => Some(*f),
      _ => None,
    }
  }

  fn is_int(&self, name: &str) -> bool {
    matches!(self.element(name), Some(Value::Int(_)))
  }
}

type FnBody = Arc<dyn Fn(&Bound, u64) -> Result<CallResult, ComposeError> + Send + Sync>;

#[derive(Clone)]
struct FunctionDef {
  params: Vec<Param>,
  body: FnBody,
}

/// A user-defined function body. Receives the positional arguments as plain
/// values and returns an element.
pub type UserFn = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// The registry of grammar functions: built-in casts, sweeps, list
/// mutations and sweep decorations, plus user registrations (which shadow
/// built-ins of the same name).
#[derive(Clone)]
pub struct Functions {
  defs: IndexMap<String, FunctionDef>,
  seed: u64,
}

impl Default for Functions {
  fn default() -> Self {
    Self::with_seed(0)
  }
}

impl Functions {
  pub fn with_seed(seed: u64) -> Self {
    let mut functions = Self {
      defs: IndexMap::new(),
      seed,
    };
    functions.install_builtins();
    functions
  }

  /// Registers a user function. A registration under a built-in name
  /// replaces the built-in.
  pub fn register(&mut self, name: &str, f: UserFn) {
    let def = FunctionDef {
      params: vec![Param::variadic("args", ParamType::Any)],
      body: Arc::new(move |bound, _seed| {
        let mut values = Vec::new();
        for arg in bound.many("args") {
          match arg {
            CallResult::Element(v) => values.push(v.clone()),
            other => {
              return Err(ComposeError::validation(format!(
                "mismatch type argument args: {} is incompatible with any",
                other.kind_name()
              )));
            }
          }
        }
        f(&values)
          .map(CallResult::Element)
          .map_err(ComposeError::validation)
      }),
    };
    self.defs.insert(name.to_string(), def);
  }

  pub fn eval(&self, call: FunctionCall) -> Result<CallResult, ComposeError> {
    let def = self.defs.get(&call.name).ok_or_else(|| {
      let available = self.defs.keys().cloned().collect::<Vec<_>>().join(", ");
      ComposeError::validation(format!("Unknown function '{}'. Available: {available}", call.name))
    })?;

    let bound = bind(&call, &def.params)?;
    (def.body)(&bound, self.seed)
  }

  fn add(&mut self, name: &str, params: Vec<Param>, body: FnBody) {
    self.defs.insert(name.to_string(), FunctionDef { params, body });
  }

  fn install_builtins(&mut self) {
    for (name, kind) in [
      ("int", CastKind::Int),
      ("float", CastKind::Float),
      ("bool", CastKind::Bool),
      ("str", CastKind::Str),
      ("json_str", CastKind::JsonStr),
    ] {
      self.add(
        name,
        vec![Param::new("value", ParamType::Any)],
        Arc::new(move |bound, _| cast_result(kind, bound.single("value").unwrap())),
      );
    }

    self.add(
      "choice",
      vec![Param::variadic("args", ParamType::Any)],
      Arc::new(|bound, _| choice_fn(bound)),
    );
    self.add(
      "range",
      vec![
        Param::new("start", ParamType::Number),
        Param::optional("stop", ParamType::Number),
        Param::optional("step", ParamType::Number),
      ],
      Arc::new(|bound, _| range_fn(bound)),
    );
    self.add(
      "interval",
      vec![
        Param::new("start", ParamType::Number),
        Param::new("end", ParamType::Number),
      ],
      Arc::new(|bound, _| {
        Ok(CallResult::Sweep(Sweep::Interval(IntervalSweep {
          start: bound.number("start").unwrap(),
          end: bound.number("end").unwrap(),
          tags: BTreeSet::new(),
        })))
      }),
    );
    self.add(
      "glob",
      vec![
        Param::new(
          "include",
          ParamType::Union(vec![ParamType::List(Box::new(ParamType::Str)), ParamType::Str]),
        ),
        Param::optional(
          "exclude",
          ParamType::Union(vec![ParamType::List(Box::new(ParamType::Str)), ParamType::Str]),
        ),
      ],
      Arc::new(|bound, _| glob_fn(bound)),
    );

    self.add(
      "sort",
      vec![
        Param::variadic("args", ParamType::Any),
        Param::optional("sweep", ParamType::Sweep),
        Param::optional("reverse", ParamType::Bool),
      ],
      Arc::new(|bound, _| sort_fn(bound)),
    );
    self.add(
      "shuffle",
      vec![
        Param::variadic("args", ParamType::Any),
        Param::optional("sweep", ParamType::Sweep),
      ],
      Arc::new(|bound, seed| shuffle_fn(bound, seed)),
    );
    self.add(
      "tag",
      vec![
        Param::variadic("args", ParamType::Union(vec![ParamType::Str, ParamType::Sweep])),
        Param::optional("sweep", ParamType::Sweep),
      ],
      Arc::new(|bound, _| tag_fn(bound)),
    );

    for (name, op) in [
      ("append", ListOperation::Append),
      ("extend_list", ListOperation::Append),
      ("prepend", ListOperation::Prepend),
      ("remove_value", ListOperation::RemoveValue),
    ] {
      self.add(
        name,
        vec![Param::variadic("args", ParamType::Any)],
        Arc::new(move |bound, _| {
          Ok(CallResult::ListMutation(ListMutation {
            operation: op,
            index: None,
            values: elements_of(bound.many("args"), "args")?,
          }))
        }),
      );
    }
    self.add(
      "insert",
      vec![
        Param::new("index", ParamType::Int),
        Param::variadic("args", ParamType::Any),
      ],
      Arc::new(|bound, _| {
        let index = match bound.element("index") {
          Some(Value::Int(i)) => *i,
          _ => unreachable!("checked by signature"),
        };
        Ok(CallResult::ListMutation(ListMutation {
          operation: ListOperation::Insert,
          index: Some(index),
          values: elements_of(bound.many("args"), "args")?,
        }))
      }),
    );
    self.add(
      "remove_at",
      vec![Param::new("index", ParamType::Int)],
      Arc::new(|bound, _| {
        let index = match bound.element("index") {
          Some(Value::Int(i)) => *i,
          _ => unreachable!("checked by signature"),
        };
        Ok(CallResult::ListMutation(ListMutation {
          operation: ListOperation::RemoveAt,
          index: Some(index),
          values: Vec::new(),
        }))
      }),
    );
    self.add(
      "list_clear",
      vec![],
      Arc::new(|_, _| {
        Ok(CallResult::ListMutation(ListMutation {
          operation: ListOperation::Clear,
          index: None,
          values: Vec::new(),
        }))
      }),
    );
  }
}

/// Binds positional then named arguments against the declared parameters
/// and type-checks every bound value.
fn bind(call: &FunctionCall, params: &[Param]) -> Result<Bound, ComposeError> {
  let mut args = IndexMap::new();
  for param in params {
    args.insert(
      param.name,
      if param.variadic {
        BoundArg::Variadic(Vec::new())
      } else {
        BoundArg::Missing
      },
    );
  }

  let mut positional = call.args.iter().filter(|a| a.name.is_none()).map(|a| &a.value);
  'params: for param in params {
    if param.variadic {
      for value in positional.by_ref() {
        match args.get_mut(param.name) {
          Some(BoundArg::Variadic(vs)) => vs.push(value.clone()),
          _ => unreachable!(),
        }
      }
      break 'params;
    }
    if let Some(value) = positional.next() {
      args.insert(param.name, BoundArg::Single(value.clone()));
    }
  }
  if positional.next().is_some() {
    return Err(ComposeError::validation(format!(
      "too many positional arguments for '{}'",
      call.name
    )));
  }

  for arg in call.args.iter().filter(|a| a.name.is_some()) {
    let name = arg.name.as_deref().unwrap();
    let param = params.iter().find(|p| p.name == name).ok_or_else(|| {
      ComposeError::validation(format!("unexpected keyword argument '{name}' for '{}'", call.name))
    })?;
    match args.get_mut(param.name) {
      Some(slot @ BoundArg::Missing) => *slot = BoundArg::Single(arg.value.clone()),
      Some(BoundArg::Single(_)) => {
        return Err(ComposeError::validation(format!(
          "multiple values for argument '{name}' of '{}'",
          call.name
        )));
      }
      Some(BoundArg::Variadic(vs)) => vs.push(arg.value.clone()),
      None => unreachable!(),
    }
  }

  for param in params {
    match args.get(param.name) {
      Some(BoundArg::Missing) if param.required => {
        return Err(ComposeError::validation(format!(
          "missing required argument '{}' for '{}'",
          param.name, call.name
        )));
      }
      Some(BoundArg::Single(value)) => {
        if !param.ty.matches(value) {
          return Err(ComposeError::validation(format!(
            "mismatch type argument {}: {} is incompatible with {}",
            param.name,
            value.kind_name(),
            param.ty
          )));
        }
      }
      Some(BoundArg::Variadic(values)) => {
        for (idx, value) in values.iter().enumerate() {
          if !param.ty.matches(value) {
            return Err(ComposeError::validation(format!(
              "mismatch type argument {}[{idx}]: {} is incompatible with {}",
              param.name,
              value.kind_name(),
              param.ty
            )));
          }
        }
      }
      _ => {}
    }
  }

  Ok(Bound { args })
}

fn elements_of(results: &[CallResult], arg_name: &str) -> Result<Vec<Value>, ComposeError> {
  results
    .iter()
    .map(|r| match r {
      CallResult::Element(v) => Ok(v.clone()),
      other => Err(ComposeError::validation(format!(
        "a {} cannot be used where an element is required (argument {arg_name})",
        other.kind_name()
      ))),
    })
    .collect()
}

fn choice_fn(bound: &Bound) -> Result<CallResult, ComposeError> {
  let args = bound.many("args");
  if args.is_empty() {
    return Err(ComposeError::validation("empty choice is not legal"));
  }
  if args.len() == 1 {
    if let CallResult::Sweep(sweep @ Sweep::Choice(_)) = &args[0] {
      return Ok(CallResult::Sweep(sweep.clone()));
    }
  }
  Ok(CallResult::Sweep(Sweep::Choice(ChoiceSweep {
    items: elements_of(args, "args")?,
    tags: BTreeSet::new(),
    simple_form: false,
    shuffle: false,
  })))
}

fn range_fn(bound: &Bound) -> Result<CallResult, ComposeError> {
  let start = bound.number("start").unwrap();
  let (start, stop, stop_was_int) = match bound.number("stop") {
    Some(stop) => (start, stop, bound.is_int("stop")),
    None => (0.0, start, true),
  };
  let step = bound.number("step").unwrap_or(1.0);
  if step == 0.0 {
    return Err(ComposeError::validation("range() step must not be zero"));
  }
  let is_int =
    bound.is_int("start") && stop_was_int && (bound.single("step").is_none() || bound.is_int("step"));

  Ok(CallResult::Sweep(Sweep::Range(RangeSweep {
    start,
    stop,
    step,
    is_int,
    tags: BTreeSet::new(),
    shuffle: false,
  })))
}

fn glob_fn(bound: &Bound) -> Result<CallResult, ComposeError> {
  fn patterns(value: Option<&CallResult>) -> Vec<String> {
    match value {
      Some(CallResult::Element(Value::Seq(items))) => items
        .iter()
        .filter_map(|i| i.as_str().map(str::to_string))
        .collect(),
      Some(CallResult::Element(v)) => v.as_str().map(str::to_string).into_iter().collect(),
      _ => Vec::new(),
    }
  }

  let include = patterns(bound.single("include"));
  if include.is_empty() {
    return Err(ComposeError::validation("glob() requires at least one include pattern"));
  }
  Ok(CallResult::Sweep(Sweep::Glob(GlobSweep {
    include,
    exclude: patterns(bound.single("exclude")),
  })))
}

fn sort_fn(bound: &Bound) -> Result<CallResult, ComposeError> {
  let reverse = matches!(bound.element("reverse"), Some(Value::Bool(true)));
  let args = bound.many("args");

  if let Some(CallResult::Sweep(sweep)) = bound.single("sweep") {
    if !args.is_empty() {
      return Err(ComposeError::validation("sort() accepts a sweep or items, not both"));
    }
    return sort_sweep(sweep.clone(), reverse);
  }

  match args {
    [] => Err(ComposeError::validation("empty sort input")),
    [CallResult::Sweep(sweep)] => sort_sweep(sweep.clone(), reverse),
    [CallResult::Element(Value::Seq(items))] => {
      let sorted = sort_values(items.clone(), reverse)?;
      Ok(CallResult::Element(Value::Seq(sorted)))
    }
    _ => {
      let items = sort_values(elements_of(args, "args")?, reverse)?;
      Ok(CallResult::Sweep(Sweep::Choice(ChoiceSweep {
        items,
        tags: BTreeSet::new(),
        simple_form: true,
        shuffle: false,
      })))
    }
  }
}

fn sort_sweep(sweep: Sweep, reverse: bool) -> Result<CallResult, ComposeError> {
  match sweep {
    Sweep::Choice(mut c) => {
      if c.items.is_empty() {
        return Err(ComposeError::validation("empty sort input"));
      }
      c.items = sort_values(c.items, reverse)?;
      Ok(CallResult::Sweep(Sweep::Choice(c)))
    }
    Sweep::Range(mut r) => {
      let (lo, hi) = (r.start.min(r.stop), r.start.max(r.stop));
      if reverse {
        r.start = hi;
        r.stop = lo;
        r.step = -r.step.abs();
      } else {
        r.start = lo;
        r.stop = hi;
        r.step = r.step.abs();
      }
      Ok(CallResult::Sweep(Sweep::Range(r)))
    }
    other => Err(ComposeError::validation(format!(
      "cannot sort a {} sweep",
      sweep_kind(&other)
    ))),
  }
}

fn shuffle_fn(bound: &Bound, seed: u64) -> Result<CallResult, ComposeError> {
  let args = bound.many("args");

  let target = if let Some(CallResult::Sweep(sweep)) = bound.single("sweep") {
    Some(sweep.clone())
  } else if let [CallResult::Sweep(sweep)] = args {
    Some(sweep.clone())
  } else {
    None
  };

  if let Some(sweep) = target {
    return match sweep {
      Sweep::Choice(mut c) => {
        c.shuffle = true;
        Ok(CallResult::Sweep(Sweep::Choice(c)))
      }
      Sweep::Range(mut r) => {
        r.shuffle = true;
        Ok(CallResult::Sweep(Sweep::Range(r)))
      }
      other => Err(ComposeError::validation(format!(
        "cannot shuffle a {} sweep",
        sweep_kind(&other)
      ))),
    };
  }

  if let [CallResult::Element(Value::Seq(items))] = args {
    let mut items = items.clone();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    return Ok(CallResult::Element(Value::Seq(items)));
  }

  if args.is_empty() {
    return Err(ComposeError::validation("shuffle() requires a sweep, a list or items"));
  }
  Ok(CallResult::Sweep(Sweep::Choice(ChoiceSweep {
    items: elements_of(args, "args")?,
    tags: BTreeSet::new(),
    simple_form: false,
    shuffle: true,
  })))
}

fn tag_fn(bound: &Bound) -> Result<CallResult, ComposeError> {
  let mut tags = BTreeSet::new();
  let mut target: Option<Sweep> = None;

  for arg in bound.many("args") {
    match arg {
      CallResult::Element(v) => {
        tags.insert(v.clone().unquoted().to_string());
      }
      CallResult::Sweep(sweep) => {
        if target.is_some() {
          return Err(ComposeError::validation("tag() accepts a single sweep"));
        }
        target = Some(sweep.clone());
      }
      CallResult::ListMutation(_) => {
        return Err(ComposeError::validation("tag() cannot decorate a list mutation"));
      }
    }
  }
  if let Some(CallResult::Sweep(sweep)) = bound.single("sweep") {
    if target.is_some() {
      return Err(ComposeError::validation("tag() accepts a single sweep"));
    }
    target = Some(sweep.clone());
  }

  let mut sweep = target.ok_or_else(|| ComposeError::validation("tag() must be used with a sweep"))?;
  match sweep.tags_mut() {
    Some(slot) => *slot = tags,
    None => {
      return Err(ComposeError::validation("glob sweeps do not accept tags"));
    }
  }
  Ok(CallResult::Sweep(sweep))
}

fn sweep_kind(sweep: &Sweep) -> &'static str {
  match sweep {
    Sweep::Choice(_) => "choice",
    Sweep::Range(_) => "range",
    Sweep::Interval(_) => "interval",
    Sweep::Glob(_) => "glob",
  }
}

fn sort_values(mut items: Vec<Value>, reverse: bool) -> Result<Vec<Value>, ComposeError> {
  let mut failure = None;
  items.sort_by(|a, b| match compare_values(a, b) {
    Some(ord) => ord,
    None => {
      failure = Some((a.type_name(), b.type_name()));
      std::cmp::Ordering::Equal
    }
  });
  if let Some((a, b)) = failure {
    return Err(ComposeError::validation(format!(
      "cannot compare {a} with {b} while sorting"
    )));
  }
  if reverse {
    items.reverse();
  }
  Ok(items)
}

fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
  match (a, b) {
    (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
    (Value::Int(x), Value::Float(y)) => (*x as f64).partial_cmp(y),
    (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(*y as f64)),
    (Value::Float(x), Value::Float(y)) => x.partial_cmp(y),
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    (Value::String(x) | Value::Quoted(x, _), Value::String(y) | Value::Quoted(y, _)) => Some(x.cmp(y)),
    _ => None,
  }
}

#[derive(Clone, Copy, Debug)]
enum CastKind {
  Int,
  Float,
  Bool,
  Str,
  JsonStr,
}

impl CastKind {
  fn name(self) -> &'static str {
    match self {
      Self::Int => "int",
      Self::Float => "float",
      Self::Bool => "bool",
      Self::Str => "str",
      Self::JsonStr => "json_str",
    }
  }
}

fn cast_result(kind: CastKind, value: &CallResult) -> Result<CallResult, ComposeError> {
  let wrap = |msg: String| {
    ComposeError::validation(format!("Error while evaluating `{}(...)`: {msg}", kind.name()))
  };

  match value {
    CallResult::Element(v) => Ok(CallResult::Element(cast_value(kind, v).map_err(wrap)?)),
    CallResult::Sweep(Sweep::Choice(c)) => {
      let mut out = c.clone();
      out.items = c
        .items
        .iter()
        .map(|i| cast_value(kind, i))
        .collect::<Result<_, _>>()
        .map_err(wrap)?;
      Ok(CallResult::Sweep(Sweep::Choice(out)))
    }
    CallResult::Sweep(Sweep::Range(r)) => match kind {
      CastKind::Int => {
        let mut out = r.clone();
        out.start = out.start.trunc();
        out.stop = out.stop.trunc();
        out.step = out.step.trunc();
        out.is_int = true;
        Ok(CallResult::Sweep(Sweep::Range(out)))
      }
      CastKind::Float => {
        let mut out = r.clone();
        out.is_int = false;
        Ok(CallResult::Sweep(Sweep::Range(out)))
      }
      _ => Err(wrap("range sweeps can only be cast to int or float".to_string())),
    },
    CallResult::Sweep(_) => Err(wrap("this sweep kind cannot be cast".to_string())),
    CallResult::ListMutation(_) => Err(wrap("a list mutation cannot be cast".to_string())),
  }
}

fn cast_value(kind: CastKind, value: &Value) -> Result<Value, String> {
  if matches!(kind, CastKind::JsonStr) {
    let json = serde_json::to_string(&value).map_err(|e| e.to_string())?;
    return Ok(Value::String(json));
  }

  match value {
    Value::Seq(items) => {
      let cast: Result<Vec<_>, _> = items.iter().map(|i| cast_value(kind, i)).collect();
      return Ok(Value::Seq(cast?));
    }
    Value::Map(map) => {
      let mut out = strata_value::Map::new();
      for (k, v) in map {
        out.insert(k.clone(), cast_value(kind, v)?);
      }
      return Ok(Value::Map(out));
    }
    Value::Null => return Err("cannot cast null".to_string()),
    Value::Missing => return Err(format!("cannot cast {}", strata_value::MISSING)),
    _ => {}
  }

  match kind {
    CastKind::Int => match value {
      Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
      Value::Int(i) => Ok(Value::Int(*i)),
      Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
      Value::Float(f) => Err(format!("cannot cast {} to int", format_float(*f))),
      Value::String(s) | Value::Quoted(s, _) => s
        .replace('_', "")
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| format!("cannot cast '{s}' to int")),
      _ => unreachable!(),
    },
    CastKind::Float => match value {
      Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
      Value::Int(i) => Ok(Value::Float(*i as f64)),
      Value::Float(f) => Ok(Value::Float(*f)),
      Value::String(s) | Value::Quoted(s, _) => s
        .replace('_', "")
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| format!("cannot cast '{s}' to float")),
      _ => unreachable!(),
    },
    CastKind::Bool => match value {
      Value::Bool(b) => Ok(Value::Bool(*b)),
      Value::Int(i) => Ok(Value::Bool(*i != 0)),
      Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
      Value::String(s) | Value::Quoted(s, _) => {
        if s.eq_ignore_ascii_case("true") {
          Ok(Value::Bool(true))
        } else if s.eq_ignore_ascii_case("false") {
          Ok(Value::Bool(false))
        } else {
          Err(format!("cannot cast '{s}' to bool"))
        }
      }
      _ => unreachable!(),
    },
    CastKind::Str => match value {
      Value::Bool(b) => Ok(Value::String(b.to_string())),
      Value::Int(i) => Ok(Value::String(i.to_string())),
      Value::Float(f) => Ok(Value::String(format_float(*f))),
      Value::String(s) => Ok(Value::String(s.clone())),
      Value::Quoted(s, q) => Ok(Value::Quoted(s.clone(), *q)),
      _ => unreachable!(),
    },
    CastKind::JsonStr => unreachable!(),
  }
}
