macro_rules! composition_error {
  ($($arg:tt)*) => {
    ComposeError::Composition(format!($($arg)*))
  };
}
