/// Authentication & token lifecycle core for the storefront platform.
///
/// Verifies user credentials, issues and validates signed session tokens,
/// and manages the revocable refresh-token lifecycle behind "stay logged in"
/// and forced logout.

pub mod accounts;
pub mod auth;
pub mod configuration;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod startup;
pub mod telemetry;
