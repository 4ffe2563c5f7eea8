pub mod app;
pub mod authz_client;
pub mod domain_client;
pub mod error;
pub mod runner;
pub mod types;

pub use app::{build_router, AppConfig, AppState};
pub use authz_client::AuthzClient;
pub use domain_client::DomainClient;
pub use error::ApiError;
pub use runner::Runner;
