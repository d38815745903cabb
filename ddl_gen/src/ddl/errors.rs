/* Errors raised while turning declarations into the resolved model */

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorClass {
  Structural,
  Reference,
  Identity,
  Inheritance,
}

/* Every variant carries the dotted path of the offending declaration */
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SchemaError {
  #[error("{path}: missing required field '{field}'")]
  MissingField { path: String, field: String },

  #[error("{path}: unresolved reference '{name}'")]
  UnresolvedReference { path: String, name: String },

  #[error("{path}: constructor destination '{dest}' is not an attribute or bitfield of the type")]
  UnknownDestination { path: String, dest: String },

  #[error("type id {type_id} version {version} is declared by both {first} and {second}")]
  DuplicateIdentity { type_id: u32, version: u32, first: String, second: String },

  #[error("{path}: schema '{name}' version {version} declared more than once")]
  DuplicateSchema { path: String, name: String, version: u32 },

  #[error("{path}: name '{name}' already declared in this scope")]
  DuplicateName { path: String, name: String },

  #[error("{path}: bitfield ends at bit {end} but storage holds {width} bits")]
  BitfieldOverflow { path: String, end: u32, width: u32 },

  #[error("{path}: bitfields '{first}' and '{second}' overlap")]
  BitfieldOverlap { path: String, first: String, second: String },

  #[error("{path}: bitfield storage must be a scalar integer, found '{storage}'")]
  BitfieldStorage { path: String, storage: String },

  #[error("{path}: inheritance cycle {}", chain.join(" -> "))]
  InheritanceCycle { path: String, chain: Vec<String> },

  #[error("{path}: base '{base}' is not a declared type")]
  UnknownBase { path: String, base: String },

  #[error("{path}: expression '{expr}' needs a config object but the type declares no config types")]
  MissingConfig { path: String, expr: String },

  #[error("{path}: layout dependency cycle between {}", cycle.join(", "))]
  LayoutCycle { path: String, cycle: Vec<String> },

  #[error("{path}: invalid shape: {reason}")]
  InvalidShape { path: String, reason: String },

  #[error("{path}: invalid expression: {reason}")]
  InvalidExpression { path: String, reason: String },
}

impl SchemaError {
  pub fn path(&self) -> &str {
    match self {
      SchemaError::MissingField { path, .. }
      | SchemaError::UnresolvedReference { path, .. }
      | SchemaError::UnknownDestination { path, .. }
      | SchemaError::DuplicateSchema { path, .. }
      | SchemaError::DuplicateName { path, .. }
      | SchemaError::BitfieldOverflow { path, .. }
      | SchemaError::BitfieldOverlap { path, .. }
      | SchemaError::BitfieldStorage { path, .. }
      | SchemaError::InheritanceCycle { path, .. }
      | SchemaError::UnknownBase { path, .. }
      | SchemaError::MissingConfig { path, .. }
      | SchemaError::LayoutCycle { path, .. }
      | SchemaError::InvalidShape { path, .. }
      | SchemaError::InvalidExpression { path, .. } => path,
      SchemaError::DuplicateIdentity { second, .. } => second,
    }
  }

  pub fn class(&self) -> ErrorClass {
    match self {
      SchemaError::MissingField { .. }
      | SchemaError::DuplicateName { .. }
      | SchemaError::DuplicateSchema { .. }
      | SchemaError::BitfieldOverflow { .. }
      | SchemaError::BitfieldOverlap { .. }
      | SchemaError::BitfieldStorage { .. }
      | SchemaError::LayoutCycle { .. }
      | SchemaError::InvalidShape { .. }
      | SchemaError::InvalidExpression { .. } => ErrorClass::Structural,
      SchemaError::UnresolvedReference { .. }
      | SchemaError::UnknownDestination { .. }
      | SchemaError::MissingConfig { .. } => ErrorClass::Reference,
      SchemaError::DuplicateIdentity { .. } => ErrorClass::Identity,
      SchemaError::InheritanceCycle { .. } | SchemaError::UnknownBase { .. } => {
        ErrorClass::Inheritance
      }
    }
  }
}
