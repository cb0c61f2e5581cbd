use strata_value::{Quote, Value};

use crate::{
  overrides::functions::{CallArg, CallResult, FunctionCall, Functions},
  overrides::types::{Override, OverrideType, OverrideValue, Sweep},
  ComposeError,
};

/// Parses a list of CLI override lines. The reported argument index is
/// 1-based, matching the position on the command line.
pub fn parse_overrides(lines: &[String], functions: &Functions) -> Result<Vec<Override>, ComposeError> {
  lines
    .iter()
    .enumerate()
    .map(|(idx, line)| parse_override_at(line, idx + 1, functions))
    .collect()
}

pub fn parse_override(line: &str, functions: &Functions) -> Result<Override, ComposeError> {
  parse_override_at(line, 0, functions)
}

fn parse_override_at(line: &str, index: usize, functions: &Functions) -> Result<Override, ComposeError> {
  parse_inner(line, functions).map_err(|fail| match fail {
    Fail::Grammar { pos, message } => ComposeError::OverrideParse {
      input_line: line.to_string(),
      index,
      message: format!("{message} (column {})", pos + 1),
    },
    Fail::Eval(ComposeError::OverrideParse { input_line, message, .. }) => {
      ComposeError::OverrideParse {
        input_line,
        index,
        message,
      }
    }
    Fail::Eval(err) => err,
  })
}

enum Fail {
  Grammar { pos: usize, message: String },
  Eval(ComposeError),
}

impl From<ComposeError> for Fail {
  fn from(err: ComposeError) -> Self {
    Self::Eval(err)
  }
}

fn parse_inner(line: &str, functions: &Functions) -> Result<Override, Fail> {
  let mut cur = Cursor::new(line);

  let override_type = if cur.eat_str("++") {
    OverrideType::ForceAdd
  } else if cur.eat('+') {
    OverrideType::Add
  } else if cur.eat('~') {
    OverrideType::Del
  } else {
    OverrideType::Change
  };

  let key_or_group = cur.take_while(is_key_char);
  if key_or_group.is_empty() {
    return Err(cur.fail("expected a key or group name"));
  }

  let package = if cur.eat('@') {
    Some(cur.take_while(is_package_char))
  } else {
    None
  };

  if cur.at_end() {
    if override_type == OverrideType::Del {
      return Ok(Override {
        override_type,
        key_or_group,
        package,
        value: OverrideValue::Absent,
        input_line: line.to_string(),
      });
    }
    return Err(cur.fail("expected '=' followed by a value"));
  }

  if !cur.eat('=') {
    return Err(cur.fail("expected '='"));
  }

  let value = parse_value(&mut cur, functions)?;
  cur.skip_ws();
  if !cur.at_end() {
    return Err(cur.fail("unexpected trailing characters"));
  }

  let value = match value {
    CallResult::Element(v) => OverrideValue::Element(v),
    CallResult::Sweep(s) => OverrideValue::Sweep(s),
    CallResult::ListMutation(m) => {
      if matches!(override_type, OverrideType::Add | OverrideType::ForceAdd) {
        return Err(Fail::Eval(ComposeError::OverrideParse {
          input_line: line.to_string(),
          index: 0,
          message: "Trying to use override symbols when extending a list".to_string(),
        }));
      }
      OverrideValue::ListMutation(m)
    }
  };

  Ok(Override {
    override_type,
    key_or_group,
    package,
    value,
    input_line: line.to_string(),
  })
}

fn is_key_char(c: char) -> bool {
  c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | '\\')
}

fn is_package_char(c: char) -> bool {
  c.is_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_ident_char(c: char) -> bool {
  c.is_ascii_alphanumeric() || c == '_'
}

/// The full value production: a single item, or a comma-separated simple
/// choice sweep.
fn parse_value(cur: &mut Cursor, functions: &Functions) -> Result<CallResult, Fail> {
  cur.skip_ws();
  if cur.at_end() {
    // `key=` assigns the empty string.
    return Ok(CallResult::Element(Value::String(String::new())));
  }

  let first = parse_item(cur, functions)?;
  cur.skip_ws();
  if !cur.peek_is(',') {
    return Ok(first);
  }

  let mut items = vec![element_of(cur, first)?];
  while cur.eat(',') {
    cur.skip_ws();
    let item = parse_item(cur, functions)?;
    items.push(element_of(cur, item)?);
    cur.skip_ws();
  }

  Ok(CallResult::Sweep(Sweep::Choice(crate::overrides::types::ChoiceSweep {
    items,
    tags: Default::default(),
    simple_form: true,
    shuffle: false,
  })))
}

fn element_of(cur: &Cursor, result: CallResult) -> Result<Value, Fail> {
  match result {
    CallResult::Element(v) => Ok(v),
    _ => Err(cur.fail("only elements are allowed in a simple choice sweep")),
  }
}

/// One item: an element, or a function call evaluating to an element, a
/// sweep, or a list mutation.
fn parse_item(cur: &mut Cursor, functions: &Functions) -> Result<CallResult, Fail> {
  cur.skip_ws();
  match cur.peek() {
    Some('[') => Ok(CallResult::Element(parse_list(cur)?)),
    Some('{') => Ok(CallResult::Element(parse_dict(cur)?)),
    Some('\'' | '"') => Ok(CallResult::Element(parse_quoted(cur)?)),
    _ => {
      let saved = cur.pos;
      let ident = cur.take_while(is_ident_char);
      if !ident.is_empty() && cur.peek_is('(') {
        let args = parse_args(cur, functions)?;
        return functions
          .eval(FunctionCall { name: ident, args })
          .map_err(Fail::Eval);
      }
      cur.pos = saved;
      Ok(CallResult::Element(parse_primitive(cur)?))
    }
  }
}

fn parse_args(cur: &mut Cursor, functions: &Functions) -> Result<Vec<CallArg>, Fail> {
  debug_assert!(cur.peek_is('('));
  cur.bump();
  cur.skip_ws();

  let mut args = Vec::new();
  if cur.eat(')') {
    return Ok(args);
  }

  loop {
    args.push(parse_arg(cur, functions)?);
    cur.skip_ws();
    if cur.eat(',') {
      continue;
    }
    if cur.eat(')') {
      return Ok(args);
    }
    return Err(cur.fail("expected ',' or ')' in argument list"));
  }
}

fn parse_arg(cur: &mut Cursor, functions: &Functions) -> Result<CallArg, Fail> {
  cur.skip_ws();

  // A named argument is an identifier directly followed by '='.
  let saved = cur.pos;
  let ident = cur.take_while(is_ident_char);
  if !ident.is_empty() && cur.peek_is('=') {
    cur.bump();
    let value = parse_item(cur, functions)?;
    return Ok(CallArg {
      name: Some(ident),
      value,
    });
  }
  cur.pos = saved;

  let value = parse_item(cur, functions)?;
  Ok(CallArg { name: None, value })
}

/// `[a, b, [c]]` — elements only, no function calls inside containers.
fn parse_element(cur: &mut Cursor) -> Result<Value, Fail> {
  cur.skip_ws();
  match cur.peek() {
    Some('[') => parse_list(cur),
    Some('{') => parse_dict(cur),
    Some('\'' | '"') => parse_quoted(cur),
    _ => parse_primitive(cur),
  }
}

fn parse_list(cur: &mut Cursor) -> Result<Value, Fail> {
  cur.bump();
  cur.skip_ws();

  let mut items = Vec::new();
  if cur.eat(']') {
    return Ok(Value::Seq(items));
  }

  loop {
    items.push(parse_element(cur)?);
    cur.skip_ws();
    if cur.eat(',') {
      cur.skip_ws();
      continue;
    }
    if cur.eat(']') {
      return Ok(Value::Seq(items));
    }
    return Err(cur.fail("expected ',' or ']' in list"));
  }
}

fn parse_dict(cur: &mut Cursor) -> Result<Value, Fail> {
  cur.bump();
  cur.skip_ws();

  let mut map = strata_value::Map::new();
  if cur.eat('}') {
    return Ok(Value::Map(map));
  }

  loop {
    cur.skip_ws();
    let key_word = cur.take_while(|c| is_key_char(c) || c == '+');
    if key_word.is_empty() {
      return Err(cur.fail("expected a dict key"));
    }
    cur.skip_ws();
    if !cur.eat(':') {
      return Err(cur.fail("expected ':' after dict key"));
    }
    let value = parse_element(cur)?;
    // Keys written as other primitives normalize to their canonical string
    // spelling.
    map.insert(word_to_value(key_word.trim()).to_string(), value);
    cur.skip_ws();
    if cur.eat(',') {
      continue;
    }
    if cur.eat('}') {
      return Ok(Value::Map(map));
    }
    return Err(cur.fail("expected ',' or '}' in dict"));
  }
}

fn parse_quoted(cur: &mut Cursor) -> Result<Value, Fail> {
  let delim = cur.peek().unwrap();
  let quote = if delim == '\'' { Quote::Single } else { Quote::Double };
  cur.bump();

  let mut text = String::new();
  loop {
    match cur.peek() {
      None => return Err(cur.fail("unterminated quoted string")),
      Some('\\') => {
        let next = cur.peek_second();
        if next == Some(delim) || next == Some('\\') {
          cur.bump();
          text.push(cur.peek().unwrap());
          cur.bump();
        } else {
          text.push('\\');
          cur.bump();
        }
      }
      Some(c) if c == delim => {
        cur.bump();
        return Ok(Value::Quoted(text, quote));
      }
      Some(c) => {
        text.push(c);
        cur.bump();
      }
    }
  }
}

/// A bare word: everything up to a structural character, with `${...}`
/// placeholders consumed atomically so their braces do not terminate the
/// word.
fn parse_primitive(cur: &mut Cursor) -> Result<Value, Fail> {
  let start = cur.pos;
  loop {
    if cur.rest().starts_with("${") {
      consume_interpolation(cur)?;
      continue;
    }
    match cur.peek() {
      None => break,
      Some(c) if matches!(c, ',' | '(' | ')' | '[' | ']' | '{' | '}' | ':' | '=') => break,
      Some(_) => cur.bump(),
    }
  }

  let word = cur.input[start..cur.pos].trim();
  if word.is_empty() {
    return Err(cur.fail("expected a value"));
  }
  Ok(word_to_value(word))
}

fn consume_interpolation(cur: &mut Cursor) -> Result<(), Fail> {
  cur.bump();
  cur.bump();
  let mut depth = 1;
  while depth > 0 {
    if cur.rest().starts_with("${") {
      depth += 1;
      cur.bump();
      cur.bump();
    } else {
      match cur.peek() {
        None => return Err(cur.fail("unterminated interpolation")),
        Some('}') => {
          depth -= 1;
          cur.bump();
        }
        Some(_) => cur.bump(),
      }
    }
  }
  Ok(())
}

pub(crate) fn word_to_value(word: &str) -> Value {
  if word == strata_value::MISSING {
    return Value::Missing;
  }
  if word.eq_ignore_ascii_case("null") {
    return Value::Null;
  }
  if word.eq_ignore_ascii_case("true") {
    return Value::Bool(true);
  }
  if word.eq_ignore_ascii_case("false") {
    return Value::Bool(false);
  }
  if is_int_word(word) {
    if let Ok(i) = word.replace('_', "").parse::<i64>() {
      return Value::Int(i);
    }
  }
  if let Some(f) = parse_float_word(word) {
    return Value::Float(f);
  }
  Value::String(word.to_string())
}

fn is_int_word(word: &str) -> bool {
  let digits = word.strip_prefix(['+', '-']).unwrap_or(word);
  !digits.is_empty()
    && digits.starts_with(|c: char| c.is_ascii_digit())
    && digits.chars().all(|c| c.is_ascii_digit() || c == '_')
    && !digits.ends_with('_')
}

fn parse_float_word(word: &str) -> Option<f64> {
  let body = word.strip_prefix(['+', '-']).unwrap_or(word);
  let negative = word.starts_with('-');

  if body.eq_ignore_ascii_case("inf") {
    return Some(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
  }
  if body.eq_ignore_ascii_case("nan") {
    return Some(f64::NAN);
  }
  if !body.contains(['.', 'e', 'E']) || body.starts_with(['e', 'E']) {
    return None;
  }
  if !body.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-' | '_')) {
    return None;
  }
  word.replace('_', "").parse::<f64>().ok()
}

struct Cursor<'s> {
  input: &'s str,
  pos: usize,
}

impl<'s> Cursor<'s> {
  fn new(input: &'s str) -> Self {
    Self { input, pos: 0 }
  }

  fn rest(&self) -> &'s str {
    &self.input[self.pos..]
  }

  fn at_end(&self) -> bool {
    self.pos >= self.input.len()
  }

  fn peek(&self) -> Option<char> {
    self.rest().chars().next()
  }

  fn peek_second(&self) -> Option<char> {
    let mut chars = self.rest().chars();
    chars.next();
    chars.next()
  }

  fn peek_is(&self, c: char) -> bool {
    self.peek() == Some(c)
  }

  fn bump(&mut self) {
    if let Some(c) = self.peek() {
      self.pos += c.len_utf8();
    }
  }

  fn eat(&mut self, c: char) -> bool {
    if self.peek_is(c) {
      self.bump();
      true
    } else {
      false
    }
  }

  fn eat_str(&mut self, s: &str) -> bool {
    if self.rest().starts_with(s) {
      self.pos += s.len();
      true
    } else {
      false
    }
  }

  fn skip_ws(&mut self) {
    while matches!(self.peek(), Some(c) if c.is_whitespace()) {
      self.bump();
    }
  }

  fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
    let start = self.pos;
    while matches!(self.peek(), Some(c) if pred(c)) {
      self.bump();
    }
    self.input[start..self.pos].to_string()
  }

  fn fail(&self, message: &str) -> Fail {
    Fail::Grammar {
      pos: self.pos,
      message: message.to_string(),
    }
  }
}

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use strata_value::Quote;

  use super::*;
  use crate::overrides::types::{ListOperation, ValueType};

  fn parse(line: &str) -> Override {
    parse_override(line, &Functions::default()).unwrap()
  }

  fn parse_err(line: &str) -> ComposeError {
    parse_override(line, &Functions::default()).unwrap_err()
  }

  #[test]
  fn change_with_primitive() {
    let o = parse("db.port=5432");
    assert_eq!(o.override_type, OverrideType::Change);
    assert_eq!(o.key_or_group, "db.port");
    assert_eq!(o.package, None);
    assert_eq!(o.element(), Some(&Value::Int(5432)));
  }

  #[test]
  fn prefixes() {
    assert_eq!(parse("+db=mysql").override_type, OverrideType::Add);
    assert_eq!(parse("++db=mysql").override_type, OverrideType::ForceAdd);
    assert_eq!(parse("~db").override_type, OverrideType::Del);
    assert_eq!(parse("~db").value, OverrideValue::Absent);
    assert_eq!(parse("~db=mysql").element(), Some(&Value::String("mysql".to_string())));
  }

  #[test]
  fn key_with_package() {
    let o = parse("+db@db_2=postgresql");
    assert_eq!(o.key_or_group, "db");
    assert_eq!(o.package.as_deref(), Some("db_2"));
  }

  #[test]
  fn group_path_key() {
    let o = parse("server/db=mysql");
    assert_eq!(o.key_or_group, "server/db");
  }

  #[test]
  fn empty_value_is_empty_string() {
    assert_eq!(parse("key=").element(), Some(&Value::String(String::new())));
  }

  #[test]
  fn primitives() {
    assert_eq!(parse("k=true").element(), Some(&Value::Bool(true)));
    assert_eq!(parse("k=False").element(), Some(&Value::Bool(false)));
    assert_eq!(parse("k=null").element(), Some(&Value::Null));
    assert_eq!(parse("k=???").element(), Some(&Value::Missing));
    assert_eq!(parse("k=1_000").element(), Some(&Value::Int(1000)));
    assert_eq!(parse("k=-3.5e2").element(), Some(&Value::Float(-350.0)));
    assert_eq!(parse("k=inf").element(), Some(&Value::Float(f64::INFINITY)));
    assert_eq!(parse("k=bare_word").element(), Some(&Value::String("bare_word".to_string())));
    assert_eq!(parse("k=hello world").element(), Some(&Value::String("hello world".to_string())));
  }

  #[test]
  fn interpolation_is_preserved() {
    assert_eq!(
      parse("k=${db.host}").element(),
      Some(&Value::String("${db.host}".to_string()))
    );
    assert_eq!(
      parse("k=${a.${b}}").element(),
      Some(&Value::String("${a.${b}}".to_string()))
    );
  }

  #[test]
  fn quoted_strings_preserve_quote_kind() {
    assert_eq!(
      parse("k='single'").element(),
      Some(&Value::Quoted("single".to_string(), Quote::Single))
    );
    assert_eq!(
      parse("k=\"double\"").element(),
      Some(&Value::Quoted("double".to_string(), Quote::Double))
    );
    assert_eq!(
      parse(r"k='it\'s'").element(),
      Some(&Value::Quoted("it's".to_string(), Quote::Single))
    );
  }

  #[test]
  fn quoted_comma_is_not_a_sweep() {
    let o = parse("k='a,b'");
    assert_eq!(o.value_type(), Some(ValueType::Element));
  }

  #[test]
  fn lists_and_dicts() {
    assert_eq!(
      parse("k=[1, two, [3]]").element(),
      Some(&Value::Seq(vec![
        Value::Int(1),
        Value::String("two".to_string()),
        Value::Seq(vec![Value::Int(3)]),
      ]))
    );
    let o = parse("k={a: 1, true: x}");
    let map = o.element().unwrap().as_map().unwrap();
    assert_eq!(map["a"], Value::Int(1));
    assert_eq!(map["true"], Value::String("x".to_string()));
  }

  #[test]
  fn simple_choice_sweep() {
    let o = parse("db=mysql,postgresql");
    assert_eq!(o.value_type(), Some(ValueType::SimpleChoiceSweep));
    match &o.value {
      OverrideValue::Sweep(Sweep::Choice(c)) => {
        assert!(c.simple_form);
        assert_eq!(c.items.len(), 2);
      }
      other => panic!("unexpected value: {other:?}"),
    }
  }

  #[test]
  fn choice_function() {
    let o = parse("db=choice(mysql,postgresql)");
    assert_eq!(o.value_type(), Some(ValueType::ChoiceSweep));
  }

  #[test]
  fn range_and_interval() {
    assert_eq!(parse("n=range(1,10)").value_type(), Some(ValueType::RangeSweep));
    assert_eq!(parse("n=range(1,10,2)").value_type(), Some(ValueType::RangeSweep));
    assert_eq!(parse("lr=interval(0.0,1.0)").value_type(), Some(ValueType::IntervalSweep));
  }

  #[test]
  fn list_mutations() {
    let o = parse("tags=append(a,b)");
    assert_eq!(o.value_type(), Some(ValueType::ListMutation));
    match &o.value {
      OverrideValue::ListMutation(m) => {
        assert_eq!(m.operation, ListOperation::Append);
        assert_eq!(m.values.len(), 2);
      }
      other => panic!("unexpected value: {other:?}"),
    }

    match &parse("tags=insert(2,middle)").value {
      OverrideValue::ListMutation(m) => {
        assert_eq!(m.operation, ListOperation::Insert);
        assert_eq!(m.index, Some(2));
      }
      other => panic!("unexpected value: {other:?}"),
    }

    match &parse("tags=remove_at(-1)").value {
      OverrideValue::ListMutation(m) => {
        assert_eq!(m.operation, ListOperation::RemoveAt);
        assert_eq!(m.index, Some(-1));
        assert!(m.values.is_empty());
      }
      other => panic!("unexpected value: {other:?}"),
    }

    match &parse("tags=list_clear()").value {
      OverrideValue::ListMutation(m) => assert_eq!(m.operation, ListOperation::Clear),
      other => panic!("unexpected value: {other:?}"),
    }
  }

  #[test]
  fn extend_list_with_add_prefix_fails() {
    let err = parse_err("+tags=append(a)");
    assert!(err.to_string().contains("override symbols"));
    let err = parse_err("++tags=extend_list(a)");
    assert!(err.to_string().contains("override symbols"));
  }

  #[test]
  fn casts() {
    assert_eq!(parse("k=int(10.5)").element(), Some(&Value::Int(10)));
    assert_eq!(parse("k=float(10)").element(), Some(&Value::Float(10.0)));
    assert_eq!(parse("k=str(10)").element(), Some(&Value::String("10".to_string())));
    assert_eq!(parse("k=bool(1)").element(), Some(&Value::Bool(true)));
  }

  #[test]
  fn unknown_function() {
    let err = parse_err("k=nosuch(1)");
    assert!(err.to_string().contains("Unknown function"), "{err}");
  }

  #[test]
  fn grammar_errors_carry_position() {
    let err = parse_err("=value");
    assert!(matches!(err, ComposeError::OverrideParse { .. }));
    assert!(err.to_string().contains("column"));

    assert!(matches!(parse_err("k=[1,2"), ComposeError::OverrideParse { .. }));
    assert!(matches!(parse_err("k='unterminated"), ComposeError::OverrideParse { .. }));
    assert!(matches!(parse_err("+key"), ComposeError::OverrideParse { .. }));
  }

  #[test]
  fn parse_overrides_reports_one_based_index() {
    let err = parse_overrides(
      &["ok=1".to_string(), "=bad".to_string()],
      &Functions::default(),
    )
    .unwrap_err();
    match err {
      ComposeError::OverrideParse { index, .. } => assert_eq!(index, 2),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn round_trip_equivalence() {
    let functions = Functions::default();
    for line in [
      "db.port=5432",
      "+db@db_2=postgresql",
      "++force=added",
      "~deleted",
      "k='quoted,string'",
      "k=[1, 2, three]",
      "k={a: 1, b: [x]}",
      "db=mysql,postgresql",
      "n=range(1,10,2)",
      "lr=interval(0.0,1.0)",
      "tags=append(a,b)",
      "tags=remove_at(0)",
    ] {
      let first = parse_override(line, &functions).unwrap();
      let emitted = first.to_override_string();
      let second = parse_override(&emitted, &functions).unwrap();
      assert_eq!(first.override_type, second.override_type, "{line}");
      assert_eq!(first.key_or_group, second.key_or_group, "{line}");
      assert_eq!(first.package, second.package, "{line}");
      assert_eq!(first.value, second.value, "{line}");
    }
  }
}
