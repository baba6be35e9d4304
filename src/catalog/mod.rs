//! Mix catalog: data model, validation, query construction, the SQLite
//! store, and the smart selector.

pub mod models;
pub mod query;
pub mod schema;
pub mod selector;
pub mod store;
pub mod validation;

pub use models::{EntryState, MixEntry, SelectionCounts, SelectionCriteria};
pub use query::{OrderBy, QueryBuilder};
pub use selector::{SelectorConfig, SmartSelector};
pub use store::MixStore;
pub use validation::{validate_entry, ValidationError, UNKNOWN_ARTIST};
