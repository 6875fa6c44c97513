//! Lead Directory API Library
//!
//! Admin service over prospective-student leads and the conversation sessions
//! they were captured in: filtered and paginated listings, JSON export,
//! dashboard statistics and lead status updates.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `db`: Database connection and schema bootstrap.
//! - `directory`: Filtering, ordering, pagination and aggregation.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `repository`: Lead storage backends (in-memory, Postgres).
//! - `routes`: Router assembly and middleware.
//! - `seed`: Demo dataset, seed files and phone normalization.

pub mod config;
pub mod db;
pub mod directory;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod routes;
pub mod seed;
