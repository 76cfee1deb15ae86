//! BigQuery estate sweeps: metadata export, job inventory sync, slot usage
//! analysis, and load generation across Google Cloud projects.

pub mod config;
pub mod discovery;
pub mod gcp;
pub mod ops;
pub mod report;
pub mod sweep;
