use thiserror::Error;

/// The kinds of errors the value layer can produce.
#[derive(Debug, Error)]
pub enum ValueError {
  #[error("Could not parse yaml: {message}")]
  YamlParse { message: String },

  #[error("Cannot serialize config: {message}")]
  YamlEmit { message: String },

  #[error("Type error at `{path}`: expected {expected}, found {found}")]
  TypeMismatch {
    path: String,
    expected: &'static str,
    found: &'static str,
  },

  #[error("Key `{key}` is not present in the target struct node")]
  StrictMode { key: String },

  #[error("Interpolation error at `{full_key}` ({object_type}): {message}")]
  Interpolation {
    full_key: String,
    object_type: &'static str,
    message: String,
  },

  #[error("Interpolation cycle detected: {chain}")]
  InterpolationCycle { chain: String },

  #[error("Missing mandatory value: {full_key}")]
  MissingMandatoryValue { full_key: String },
}

impl From<serde_yaml_ng::Error> for ValueError {
  fn from(e: serde_yaml_ng::Error) -> Self {
    Self::YamlParse {
      message: e.to_string(),
    }
  }
}
