use crate::error::{format_error, EventError};
use crate::{HttpRequest, HttpResponse, Method, StatusCode};

use async_trait::async_trait;
use aws_lambda_events::encodings::Body;
use backtrace::Backtrace;
use futures::FutureExt;
use headers::{ContentType, Header};
use indexmap::IndexMap;
use itertools::Itertools;
use log::{debug, error};
use thiserror::Error;

use std::any::Any;
use std::borrow::Cow;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

/// Error registering a route.
#[derive(Debug, Error)]
pub enum RouterError {
  /// Registered route shadows an earlier route with the same method and pattern shape.
  #[error("route {method} {pattern} conflicts with an earlier route")]
  Conflict {
    /// HTTP method of the conflicting route.
    method: Method,
    /// Path pattern of the conflicting route.
    pattern: String,
  },
  /// Path pattern could not be parsed.
  #[error("invalid route pattern `{pattern}`: {reason}")]
  InvalidPattern {
    /// Offending path pattern.
    pattern: String,
    /// Description of the problem.
    reason: &'static str,
  },
}

/// Request handler bound to a route.
///
/// Implemented for any `Fn(HttpRequest) -> impl Future<Output = anyhow::Result<HttpResponse>>`,
/// so plain `async fn` items can be registered directly.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
  /// Handle a request that matched this handler's route.
  async fn call(&self, request: HttpRequest) -> anyhow::Result<HttpResponse>;
}

#[async_trait]
impl<F, Fut> Handler for F
where
  F: Fn(HttpRequest) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = anyhow::Result<HttpResponse>> + Send + 'static,
{
  async fn call(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
    (self)(request).await
  }
}

/// Values captured by a route's named and wildcard segments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathParameters(pub IndexMap<String, String>);

impl PathParameters {
  /// Return the value captured for `name`, if any.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
  Literal(String),
  Param(String),
  Wildcard(String),
}

impl Segment {
  fn parse(pattern: &str, segment: &str) -> Result<Self, RouterError> {
    let invalid = |reason| RouterError::InvalidPattern {
      pattern: pattern.to_string(),
      reason,
    };

    let (name, wildcard) = if let Some(inner) = segment
      .strip_prefix('{')
      .and_then(|rest| rest.strip_suffix('}'))
    {
      match inner.strip_suffix('+') {
        Some(name) => (name, true),
        None => (inner, false),
      }
    } else if let Some(name) = segment.strip_prefix(':') {
      (name, false)
    } else if let Some(name) = segment.strip_prefix('*') {
      (name, true)
    } else if segment.contains(['{', '}']) {
      return Err(invalid("unbalanced braces in segment"));
    } else {
      return Ok(Segment::Literal(segment.to_string()));
    };

    if name.is_empty() {
      Err(invalid("parameter name must not be empty"))
    } else if wildcard {
      Ok(Segment::Wildcard(name.to_string()))
    } else {
      Ok(Segment::Param(name.to_string()))
    }
  }

  fn name(&self) -> Option<&str> {
    match self {
      Segment::Literal(_) => None,
      Segment::Param(name) | Segment::Wildcard(name) => Some(name),
    }
  }

  // Two patterns with the same shape match exactly the same paths.
  fn same_shape(&self, other: &Segment) -> bool {
    match (self, other) {
      (Segment::Literal(a), Segment::Literal(b)) => a == b,
      (Segment::Param(_), Segment::Param(_)) | (Segment::Wildcard(_), Segment::Wildcard(_)) => true,
      _ => false,
    }
  }
}

/// Parsed route path template (e.g., `/api/users/{id}` or `/static/{path+}`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutePattern {
  raw: String,
  segments: Vec<Segment>,
}

impl RoutePattern {
  /// Parse a path template.
  ///
  /// `{name}` and `:name` capture a single segment. `{name+}` and `*name` capture the rest of the
  /// path (at least one segment) and may only appear last. Empty segments are ignored.
  pub fn parse(pattern: &str) -> Result<Self, RouterError> {
    if !pattern.starts_with('/') {
      return Err(RouterError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: "pattern must start with `/`",
      });
    }

    let segments = pattern
      .split('/')
      .filter(|segment| !segment.is_empty())
      .map(|segment| Segment::parse(pattern, segment))
      .collect::<Result<Vec<_>, _>>()?;

    if let Some(pos) = segments
      .iter()
      .position(|segment| matches!(segment, Segment::Wildcard(_)))
    {
      if pos + 1 != segments.len() {
        return Err(RouterError::InvalidPattern {
          pattern: pattern.to_string(),
          reason: "wildcard segment must be last",
        });
      }
    }

    if !segments
      .iter()
      .filter_map(Segment::name)
      .all_unique()
    {
      return Err(RouterError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: "duplicate parameter name",
      });
    }

    Ok(Self {
      raw: pattern.to_string(),
      segments,
    })
  }

  /// Pattern as registered.
  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Match `path` against this pattern, returning the captured parameters on success.
  ///
  /// Path segments are percent-decoded before comparison.
  pub fn matches(&self, path: &str) -> Option<PathParameters> {
    let path_segments = path
      .split('/')
      .filter(|segment| !segment.is_empty())
      .map(|segment| urlencoding::decode(segment).unwrap_or(Cow::Borrowed(segment)))
      .collect::<Vec<_>>();

    let wildcard = matches!(self.segments.last(), Some(Segment::Wildcard(_)));
    if wildcard {
      if path_segments.len() < self.segments.len() {
        return None;
      }
    } else if path_segments.len() != self.segments.len() {
      return None;
    }

    // Reject on literal mismatches before capturing anything.
    let literals_match = self
      .segments
      .iter()
      .zip(&path_segments)
      .all(|(segment, value)| match segment {
        Segment::Literal(literal) => literal == value,
        Segment::Param(_) | Segment::Wildcard(_) => true,
      });
    if !literals_match {
      return None;
    }

    let mut params = IndexMap::new();
    for (idx, segment) in self.segments.iter().enumerate() {
      match segment {
        Segment::Literal(_) => {}
        Segment::Param(name) => {
          params.insert(name.clone(), path_segments[idx].to_string());
        }
        Segment::Wildcard(name) => {
          params.insert(name.clone(), path_segments[idx..].join("/"));
        }
      }
    }

    Some(PathParameters(params))
  }

  fn same_shape(&self, other: &RoutePattern) -> bool {
    self.segments.len() == other.segments.len()
      && self
        .segments
        .iter()
        .zip(&other.segments)
        .all(|(a, b)| a.same_shape(b))
  }
}

struct Route {
  method: Method,
  pattern: RoutePattern,
  handler: Arc<dyn Handler>,
}

impl Debug for Route {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.pattern.as_str())
  }
}

/// Builder that collects routes in registration order.
///
/// Registration errors are deferred until [`build`](RouterBuilder::build) so that routes can be
/// chained.
#[derive(Default)]
pub struct RouterBuilder {
  routes: Vec<Route>,
  errors: Vec<RouterError>,
}

impl RouterBuilder {
  /// Register `handler` for requests with the given method and path pattern.
  pub fn route<H>(mut self, method: Method, pattern: &str, handler: H) -> Self
  where
    H: Handler,
  {
    let parsed = match RoutePattern::parse(pattern) {
      Ok(parsed) => parsed,
      Err(err) => {
        self.errors.push(err);
        return self;
      }
    };

    if self
      .routes
      .iter()
      .any(|route| route.method == method && route.pattern.same_shape(&parsed))
    {
      self.errors.push(RouterError::Conflict {
        method,
        pattern: pattern.to_string(),
      });
      return self;
    }

    self.routes.push(Route {
      method,
      pattern: parsed,
      handler: Arc::new(handler),
    });
    self
  }

  /// Register a `GET` route.
  pub fn get<H>(self, pattern: &str, handler: H) -> Self
  where
    H: Handler,
  {
    self.route(Method::GET, pattern, handler)
  }

  /// Register a `POST` route.
  pub fn post<H>(self, pattern: &str, handler: H) -> Self
  where
    H: Handler,
  {
    self.route(Method::POST, pattern, handler)
  }

  /// Finish registration, failing with the first registration error (if any).
  pub fn build(self) -> Result<Router, RouterError> {
    if let Some(err) = self.errors.into_iter().next() {
      return Err(err);
    }
    Ok(Router {
      routes: self.routes,
    })
  }
}

/// Immutable, ordered route table.
///
/// Once built, a router cannot gain or lose routes, so it may be shared across concurrent
/// invocations without locking.
#[derive(Debug)]
pub struct Router {
  routes: Vec<Route>,
}

impl Router {
  /// Start registering routes.
  pub fn builder() -> RouterBuilder {
    RouterBuilder::default()
  }

  /// Number of registered routes.
  pub fn len(&self) -> usize {
    self.routes.len()
  }

  /// Whether the router has no routes.
  pub fn is_empty(&self) -> bool {
    self.routes.is_empty()
  }

  fn find(&self, method: &Method, path: &str) -> Option<(&Route, PathParameters)> {
    self
      .routes
      .iter()
      .filter(|route| route.method == *method)
      .find_map(|route| route.pattern.matches(path).map(|params| (route, params)))
  }

  /// Dispatch `request` to the first matching route.
  ///
  /// Returns 404 if no route matches. Handler errors and panics are logged and converted to a
  /// 500 response with an empty body.
  pub async fn route(&self, mut request: HttpRequest) -> HttpResponse {
    let Some((route, params)) = self.find(request.method(), request.uri().path()) else {
      debug!(
        "No route for {} {}",
        request.method(),
        request.uri().path()
      );
      return not_found();
    };
    debug!("Matched route {route:?}");

    request.extensions_mut().insert(params);

    let err = match std::panic::AssertUnwindSafe(route.handler.call(request))
      .catch_unwind()
      .await
    {
      Ok(Ok(response)) => return response,
      Ok(Err(err)) => EventError::HandlerFault(err, Backtrace::new()),
      // Unfortunately, the panic doesn't give us a stack trace unless we set a panic hook, which
      // might interfere with the user's own error handling. Instead, we just capture a backtrace
      // indicating where we caught the panic.
      Err(panic) => EventError::Panic(panic_string(panic), Backtrace::new()),
    };

    error!(
      "Handler for route {route:?} failed: {}",
      format_error(&err, Some(&format!("EventError::{}", err.name())), err.backtrace())
    );
    err.into()
  }
}

fn not_found() -> HttpResponse {
  let mut response = HttpResponse::new(Body::Text("Not Found".to_string()));
  *response.status_mut() = StatusCode::NOT_FOUND;
  response.headers_mut().insert(
    ContentType::name().to_owned(),
    http::HeaderValue::from_static("text/plain"),
  );
  response
}

/// Extract the panic message after catching a panic.
fn panic_string(panic: Box<dyn Any + Send>) -> String {
  panic
    .downcast::<String>()
    .map(|panic| *panic)
    .or_else(|panic| panic.downcast::<&str>().map(|msg| msg.to_string()))
    .unwrap_or_else(|_| "non-string panic payload".to_string())
}
