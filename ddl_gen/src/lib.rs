pub mod codegen;
pub mod ddl;
