//! Command handlers for the Platter CLI.

pub mod config;
pub mod fetch;
pub mod ingest;
pub mod serve;
