//! Filter compilation and SQL fragments.

mod compiler;
mod fragment;

pub use compiler::{CompiledFilter, FilterCompiler, select_sql, target_rows_sql};
pub use fragment::{SqlFragment, SqlParam, quote_ident, quote_literal};
