pub mod builder;
pub mod errors;
pub mod expr;
pub mod file;
pub mod layout_graph;
pub mod model;

pub use builder::build;
pub use errors::SchemaError;
pub use file::{ImportResolver, LoadError, Unit};
pub use model::Model;
