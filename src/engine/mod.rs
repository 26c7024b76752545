//! Scoring rules: schemes, score records, grading, aggregation and the write
//! gate. Storage is reached only through the traits in [`repositories`].

pub mod aggregate;
pub mod authz;
pub mod import;
pub mod record;
pub mod report;
pub mod repositories;
pub mod rubric;
pub mod save;
pub mod scheme;
