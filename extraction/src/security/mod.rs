//! Credential handling. SSRF/URL validation lives alongside the crawler
//! trait it guards, in [`crate::traits::crawler`].

pub mod credentials;

pub use credentials::{AICredentials, SecretString};
