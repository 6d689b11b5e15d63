//! Database-compatible domain types.
//!
//! IDs and datetimes are serialised in MongoDB's own format; the API layer
//! converts to plain strings at the edge.

pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod election;
pub mod embedding;
pub mod identity;
pub mod mongodb;
