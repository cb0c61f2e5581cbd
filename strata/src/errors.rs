use strata_value::ValueError;
use thiserror::Error;

/// The kinds of errors that can occur while composing a configuration.
#[derive(Debug, Error)]
pub enum ComposeError {
  /// A named config could not be located in any source.
  #[error("Could not load `{path}`: {message}")]
  ConfigLoad { path: String, message: String },

  /// The defaults list or the final tree is inconsistent.
  #[error("{0}")]
  Composition(String),

  /// An override line failed to parse. `index` is the 1-based position of
  /// the line within the CLI argument list (0 when parsed standalone).
  #[error("Error parsing override '{input_line}' (argument {index}): {message}")]
  OverrideParse {
    input_line: String,
    index: usize,
    message: String,
  },

  /// A function-call argument did not match the declared signature, or a
  /// value failed a conversion.
  #[error("{message}")]
  Validation { message: String },

  /// Interpolation, merge or codec failure in the value layer.
  #[error(transparent)]
  Value(#[from] ValueError),

  /// Plugin discovery or instantiation failure.
  #[error("Error with plugin `{name}`: {message}")]
  Plugin { name: String, message: String },
}

impl ComposeError {
  pub(crate) fn validation(message: impl Into<String>) -> Self {
    Self::Validation {
      message: message.into(),
    }
  }
}
