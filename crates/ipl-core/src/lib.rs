// Shared foundation for the IPL analytics workspace: configuration, the
// SQLite match record store, and CSV ingestion of the raw exports.

pub mod config;
pub mod db;
pub mod ingest;
pub mod records;
