//! Serve a routed HTTP application from a single AWS Lambda function behind an Amazon API Gateway
//! REST API proxy integration.
//!
//! Each invocation flows through the same pipeline:
//!
//!  1. [`Adapter`] builds the [`Router`] once per process (the cold start).
//!  2. [`translate_request`] turns the [`GatewayRequestEvent`] into an [`HttpRequest`], attaching
//!     the gateway [`RequestContext`] so handlers can read it through [`RequestExt`].
//!  3. [`Router::route`] dispatches the request to the first matching handler.
//!  4. [`translate_response`] turns the [`HttpResponse`] into a [`GatewayResponseEvent`].
//!
//! Failures at any step become well-formed error responses (400 for malformed events, 404 for
//! unknown routes, 500 for handler and initialization failures), so no error ever escapes to the
//! Lambda runtime.

// These are documented public exports since handlers and the router depend on them.
pub use async_trait;
pub use aws_lambda_events::encodings::Body;
pub use http::{HeaderMap, HeaderName, Method, Request, Response, StatusCode};
pub use lambda_runtime::{Context as LambdaContext, LambdaEvent};

/// Adapter configuration.
pub mod config;

pub use config::AdapterConfig;

/// Error handling.
pub mod error;

pub use error::EventError;

/// API Gateway event wire format.
pub mod event;

pub use event::{GatewayRequestEvent, GatewayResponseEvent, Identity, RequestContext};

mod lifecycle;

pub use lifecycle::Adapter;

/// Gateway event to HTTP request translation.
pub mod request;

pub use request::{translate_request, QueryParameters, RequestExt, StageVariables};

/// HTTP response to gateway event translation.
pub mod response;

pub use response::{bytes_response, json_response, translate_response};

/// Route table and handler dispatch.
pub mod router;

pub use router::{Handler, PathParameters, RoutePattern, Router, RouterBuilder, RouterError};

mod runtime;

pub use runtime::run_lambda;

/// HTTP request passed to route handlers.
pub type HttpRequest = Request<Vec<u8>>;

/// HTTP response produced by route handlers.
pub type HttpResponse = Response<Body>;
