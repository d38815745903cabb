//! DDL Declaration Types
//!
//! This crate contains the raw declaration records produced by reading a DDL
//! schema document. They are plain data: names, type names, raw expression
//! text and raw tag strings. Name resolution, layout and code generation live
//! in `ddl_gen`.

pub mod decl;
pub mod tag;

// Re-export commonly used types at the crate root
pub use decl::*;
pub use tag::*;
