use apigw_proxy::{HttpRequest, Router, RouterError};
use log::info;
use thiserror::Error;

use std::sync::Arc;

/// Health check endpoint.
pub mod health_handler;

/// Endpoints that echo the gateway request context.
pub mod context_handler;

/// Environment variable holding the build identifier (e.g., the git commit SHA).
pub const SHA_ENV: &str = "sha";

/// Environment variable set by Lambda to the version of the function being invoked.
pub const FUNCTION_VERSION_ENV: &str = "AWS_LAMBDA_FUNCTION_VERSION";

/// Build and deployment identifiers, read once when the process starts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildInfo {
  /// Build identifier.
  pub sha: String,
  /// Deployed function version (e.g., `$LATEST` or `7`).
  pub version: String,
}

impl BuildInfo {
  pub fn from_env() -> Self {
    let build_info = Self {
      sha: std::env::var(SHA_ENV).unwrap_or_default(),
      version: std::env::var(FUNCTION_VERSION_ENV).unwrap_or_default(),
    };
    info!("Build info: {build_info:?}");
    build_info
  }
}

/// Example handler error type.
#[derive(Debug, Error)]
pub enum HandlerError {
  #[error("request is missing the API Gateway request context")]
  MissingRequestContext,
}

/// Register every route served by this function.
///
/// Registration order matters: the first matching route wins.
pub fn build_router(build_info: Arc<BuildInfo>) -> Result<Router, RouterError> {
  Router::builder()
    .get("/api/ping", health_handler::ping)
    .get("/api/meta", move |request: HttpRequest| {
      context_handler::meta(request, build_info.clone())
    })
    .get("/api/me", context_handler::me)
    .build()
}
