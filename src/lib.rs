//! Diagnostic service that checks a workload's managed identity can reach and
//! authenticate against PostgreSQL, reporting each stage of the attempt.

pub mod config;
pub mod http;
pub mod identity;
pub mod pg_probe;
