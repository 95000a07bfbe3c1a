pub mod client;
pub mod query;

pub use client::GraphqlClient;
pub use query::{build_operation, to_camel_case, to_global_id, BuiltOperation};
