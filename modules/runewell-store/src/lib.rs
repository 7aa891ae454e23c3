//! Postgres persistence for progression aggregates and the rank catalog.
//!
//! Stores one versioned row per user. The typed aggregate is converted to
//! JSONB columns here and nowhere else.

pub mod store;
pub mod types;

pub use store::PgProgressionStore;
pub use types::{StoredProgression, StoredRank, Versioned};
