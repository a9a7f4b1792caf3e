use crate::router::RouterError;
use crate::{HeaderName, HttpResponse, StatusCode};

use aws_lambda_events::encodings::Body;
// Until std::error::Backtrace is fully stabilized, we can't embed a type named `Backtrace` within
// a thiserror::Error (see https://github.com/dtolnay/thiserror/issues/204).
use backtrace::Backtrace as _Backtrace;
use headers::{ContentType, Header};
use itertools::Itertools;
use log::error;
use thiserror::Error;

use std::borrow::Cow;

/// Error that occurred while processing an API Gateway event.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EventError {
  /// Matched request handler returned an error.
  #[error("request handler failed")]
  HandlerFault(#[source] anyhow::Error, _Backtrace),
  /// Failed to assemble the internal HTTP request.
  #[error("failed to prepare HTTP request")]
  HttpRequest(#[source] Box<http::Error>, _Backtrace),
  /// Router initialization failed during cold start.
  #[error("failed to initialize router")]
  Initialization(#[source] RouterError, _Backtrace),
  /// Invalid base64 encoding for request body.
  #[error("invalid base64 encoding for request body")]
  InvalidBodyBase64(#[source] Box<base64::DecodeError>, _Backtrace),
  /// Request header name or value cannot be represented as an HTTP header.
  #[error("invalid request header `{0}`")]
  InvalidHeader(
    String,
    #[source] Box<dyn std::error::Error + Send + Sync + 'static>,
    _Backtrace,
  ),
  /// Request path or query string cannot be represented as a URI.
  #[error("invalid request URI `{0}`")]
  InvalidRequestUri(
    String,
    #[source] Box<dyn std::error::Error + Send + Sync + 'static>,
    _Backtrace,
  ),
  /// Event does not deserialize as an API Gateway proxy request.
  #[error("invalid event")]
  InvalidEvent(
    #[source] Box<serde_path_to_error::Error<serde_json::Error>>,
    _Backtrace,
  ),
  /// Response header value is not valid UTF-8.
  #[error("invalid UTF-8 encoding for response header `{0}`")]
  InvalidResponseHeader(
    HeaderName,
    #[source] Box<dyn std::error::Error + Send + Sync + 'static>,
    _Backtrace,
  ),
  /// Response status code outside the 100-599 range.
  #[error("invalid response status code {0}")]
  InvalidStatusCode(u16, _Backtrace),
  /// Event is missing a required field.
  #[error("malformed event: missing `{0}`")]
  MalformedEvent(&'static str, _Backtrace),
  /// Request handler panicked.
  #[error("request handler panicked: {0}")]
  Panic(String, _Backtrace),
  /// Failed to serialize response body to JSON.
  #[error("failed to serialize {type_name} response to JSON")]
  ToJsonResponse {
    /// Name of the response body type that failed to serialize.
    type_name: Cow<'static, str>,
    /// Underlying error that occurred while serializing the response body.
    #[source]
    source: Box<serde_path_to_error::Error<serde_json::Error>>,
    /// Stack trace indicating where the error occurred.
    backtrace: _Backtrace,
  },
}

impl EventError {
  /// Return the backtrace associated with the error, if known.
  pub fn backtrace(&self) -> Option<&_Backtrace> {
    match self {
      EventError::HandlerFault(_, backtrace)
      | EventError::HttpRequest(_, backtrace)
      | EventError::Initialization(_, backtrace)
      | EventError::InvalidBodyBase64(_, backtrace)
      | EventError::InvalidEvent(_, backtrace)
      | EventError::InvalidHeader(_, _, backtrace)
      | EventError::InvalidRequestUri(_, _, backtrace)
      | EventError::InvalidResponseHeader(_, _, backtrace)
      | EventError::InvalidStatusCode(_, backtrace)
      | EventError::MalformedEvent(_, backtrace)
      | EventError::Panic(_, backtrace)
      | EventError::ToJsonResponse { backtrace, .. } => Some(backtrace),
    }
  }

  /// Return the name of the error variant (e.g., `InvalidBodyBase64`).
  pub fn name(&self) -> &str {
    match self {
      EventError::HandlerFault(_, _) => "HandlerFault",
      EventError::HttpRequest(_, _) => "HttpRequest",
      EventError::Initialization(_, _) => "Initialization",
      EventError::InvalidBodyBase64(_, _) => "InvalidBodyBase64",
      EventError::InvalidEvent(_, _) => "InvalidEvent",
      EventError::InvalidHeader(_, _, _) => "InvalidHeader",
      EventError::InvalidRequestUri(_, _, _) => "InvalidRequestUri",
      EventError::InvalidResponseHeader(_, _, _) => "InvalidResponseHeader",
      EventError::InvalidStatusCode(_, _) => "InvalidStatusCode",
      EventError::MalformedEvent(_, _) => "MalformedEvent",
      EventError::Panic(_, _) => "Panic",
      EventError::ToJsonResponse { .. } => "ToJsonResponse",
    }
  }

  /// Log the error along with its cause chain and backtrace.
  pub fn log(&self) {
    error!(
      "{}",
      format_error(self, Some(&format!("EventError::{}", self.name())), self.backtrace()),
    );
  }
}

impl From<EventError> for HttpResponse {
  /// Build a client-facing [`HttpResponse`] appropriate for the error that occurred.
  ///
  /// Errors caused by the event itself produce a 400 Bad Request with a `text/plain` description
  /// of the problem. Every other error produces a 500 Internal Server Error with no response body
  /// so that no internal detail reaches the client.
  fn from(err: EventError) -> HttpResponse {
    let (status_code, body) = match err {
      // 400
      EventError::InvalidBodyBase64(_, _) => (
        StatusCode::BAD_REQUEST,
        Some("Request body is not valid base64".to_string()),
      ),
      EventError::InvalidEvent(err, _) => (
        StatusCode::BAD_REQUEST,
        Some(format!("Malformed request: invalid `{}`", err.path())),
      ),
      EventError::InvalidHeader(header_name, _, _) => (
        StatusCode::BAD_REQUEST,
        Some(format!("Invalid request header `{header_name}`")),
      ),
      EventError::InvalidRequestUri(_, _, _) => (
        StatusCode::BAD_REQUEST,
        Some("Invalid request path or query string".to_string()),
      ),
      EventError::MalformedEvent(field, _) => (
        StatusCode::BAD_REQUEST,
        Some(format!("Malformed request: missing `{field}`")),
      ),
      // 500
      EventError::HandlerFault(_, _)
      | EventError::HttpRequest(_, _)
      | EventError::Initialization(_, _)
      | EventError::InvalidResponseHeader(_, _, _)
      | EventError::InvalidStatusCode(_, _)
      | EventError::Panic(_, _)
      | EventError::ToJsonResponse { .. } => (StatusCode::INTERNAL_SERVER_ERROR, None),
    };

    let mut response = if let Some(body_str) = body {
      error!("Responding with error status {status_code}: {body_str}");

      let mut response = HttpResponse::new(Body::Text(body_str));
      response.headers_mut().insert(
        ContentType::name().to_owned(),
        http::HeaderValue::from_static("text/plain"),
      );

      response
    } else {
      error!("Responding with error status {status_code}");

      HttpResponse::new(Body::Empty)
    };

    *response.status_mut() = status_code;

    response
  }
}

/// Helper function for formatting an error as a string containing a human-readable chain of causes.
///
/// This function will walk over the chain of causes returned by
/// [`Error::source`](std::error::Error::source) and append each underlying error (using the
/// [`Display`](std::fmt::Display) trait).
///
/// # Arguments
///
/// * `err` - Error to format.
/// * `name` - Optional name of the error type/variant (e.g., `EventError::MalformedEvent`).
/// * `backtrace` - Optional [`Backtrace`](backtrace::Backtrace) indicating where the top-level
///   error occurred.
pub fn format_error(
  err: &dyn std::error::Error,
  name: Option<&str>,
  backtrace: Option<&_Backtrace>,
) -> String {
  let err_line = name
    .map(|n| format!("{}: {}", n, err))
    .unwrap_or_else(|| err.to_string());

  let top_error = if let Some(bt) = backtrace {
    format!("{err_line}\n  stack trace:\n{}", format_backtrace(bt, 4))
  } else {
    err_line
  };

  let cause_str = ErrorCauseIterator(err.source())
    .map(|cause| format!("  caused by: {cause}"))
    .join("\n");

  if !cause_str.is_empty() {
    format!("{top_error}\n{cause_str}")
  } else {
    top_error
  }
}

struct ErrorCauseIterator<'a>(Option<&'a (dyn std::error::Error + 'static)>);

impl<'a> Iterator for ErrorCauseIterator<'a> {
  type Item = &'a (dyn std::error::Error + 'static);

  fn next(&mut self) -> Option<Self::Item> {
    let current = self.0;
    self.0 = current.and_then(|err| err.source());
    current
  }
}

fn format_backtrace(backtrace: &_Backtrace, indent: usize) -> String {
  let indent_str = " ".repeat(indent);
  format!("{backtrace:?}")
    .lines()
    .map(|line| format!("{indent_str}{line}"))
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::{format_error, EventError};
  use crate::router::RouterError;
  use crate::{HttpResponse, StatusCode};

  use aws_lambda_events::encodings::Body;
  use backtrace::Backtrace;
  use http::Method;
  use pretty_assertions::assert_eq;

  #[test]
  fn test_client_errors_are_400_with_text_body() {
    let response: HttpResponse = EventError::MalformedEvent("httpMethod", Backtrace::new()).into();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
      response.headers().get("content-type").unwrap(),
      "text/plain"
    );
    match response.body() {
      Body::Text(text) => assert_eq!(text, "Malformed request: missing `httpMethod`"),
      other => panic!("unexpected body {other:?}"),
    }
  }

  #[test]
  fn test_internal_errors_hide_detail() {
    let response: HttpResponse = EventError::HandlerFault(
      anyhow::anyhow!("database password is hunter2"),
      Backtrace::new(),
    )
    .into();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(matches!(response.body(), Body::Empty));
    assert!(response.headers().is_empty());
  }

  #[test]
  fn test_format_error_includes_causes() {
    let err = EventError::Initialization(
      RouterError::Conflict {
        method: Method::GET,
        pattern: "/api/ping".to_string(),
      },
      Backtrace::new(),
    );
    let formatted = format_error(&err, Some("EventError::Initialization"), None);
    assert_eq!(
      formatted,
      "EventError::Initialization: failed to initialize router\n  \
       caused by: route GET /api/ping conflicts with an earlier route"
    );
  }
}
