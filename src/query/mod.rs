pub mod error;
pub mod features;
pub mod sql;
pub mod types;

pub use features::QueryFeatures;
pub use sql::SqlRenderer;
pub use types::{CompareOp, Condition, ListQuery, SortDirection, SortKey};
