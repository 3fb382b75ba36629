//! Data access: relational reference data and the pending-order document
//! collection, plus the SQL statement registry.

pub mod documents;
pub mod reference;
pub mod sql;

pub use documents::{MockOrderSource, OrderDocumentSource, PgDocumentStore};
pub use reference::{PgReferenceRepository, ReferenceDataSource};
