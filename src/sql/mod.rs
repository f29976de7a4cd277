//! SQL text generation: identifiers quoted, values carried as parameters until rendering.

mod builder;
pub mod dialect;
pub use builder::*;
pub use dialect::{qualified_table, quote_ident};
