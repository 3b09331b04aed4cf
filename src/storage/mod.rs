// Storage module
// Durable state lives in two places that must stay consistent: the SQLite
// metadata store and the on-disk vector index pair

pub mod metadata;
pub mod vector;

pub use metadata::Database;
pub use vector::{SearchMatch, SharedVectorIndex, VectorIndex};
