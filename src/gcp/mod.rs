//! Google Cloud API access: credentials, HTTP plumbing, and the typed
//! BigQuery / Resource Manager surfaces.

pub mod auth;
pub mod bigquery;
pub mod client;
pub mod http;
pub mod projects;

pub use auth::Credentials;
pub use client::BqClient;
pub use http::ApiError;
