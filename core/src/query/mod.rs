//! Filters, assignments and the set-based statements built from them.

mod filter;
mod statements;

pub use filter::{Condition, Filter, FilterError, Predicate, WhereFragment};
pub use statements::{
    build_delete_where, build_select_where, build_update_where, Assignments, FilteredStatement,
};
