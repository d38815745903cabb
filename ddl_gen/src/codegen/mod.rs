pub mod binding;
pub mod dispatch;
pub mod dump;
pub mod engine;
pub mod hash;
pub mod helpers;
pub mod native;
pub mod schema;

pub use binding::{BindingBackend, BindingOptions};
pub use dispatch::{DispatchBackend, DispatchOptions};
pub use engine::{Backend, CodegenError, Engine, Generated};
pub use hash::HashFunction;
pub use native::{NativeBackend, NativeOptions};
pub use schema::{SchemaBackend, SchemaOptions};
