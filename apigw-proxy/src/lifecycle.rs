use crate::config::AdapterConfig;
use crate::error::EventError;
use crate::event::{GatewayRequestEvent, GatewayResponseEvent};
use crate::request::translate_request;
use crate::response::translate_response;
use crate::router::{Router, RouterError};
use crate::{HttpResponse, LambdaContext, LambdaEvent};

use backtrace::Backtrace;
use log::{debug, info, trace};
use tokio::sync::OnceCell;

use std::time::Instant;

/// Process-wide adapter state: configuration plus the lazily built router.
///
/// Create one `Adapter` when the process starts and pass it by reference to every invocation.
/// The router is built by `init` on the first invocation (the cold start). Concurrent first
/// invocations wait for a single initialization to finish rather than running `init` twice. If
/// `init` fails, the triggering invocation receives a 500 response and the next invocation tries
/// again.
pub struct Adapter<I> {
  config: AdapterConfig,
  init: I,
  router: OnceCell<Router>,
}

impl<I> Adapter<I>
where
  I: Fn() -> Result<Router, RouterError> + Send + Sync,
{
  /// Create an adapter whose router is built by `init` on first use.
  pub fn new(config: AdapterConfig, init: I) -> Self {
    Self {
      config,
      init,
      router: OnceCell::new(),
    }
  }

  /// Adapter configuration.
  pub fn config(&self) -> &AdapterConfig {
    &self.config
  }

  /// Whether the router has been built.
  pub fn is_ready(&self) -> bool {
    self.router.initialized()
  }

  /// Return the router, building it first if this is the cold start.
  pub async fn router(&self) -> Result<&Router, EventError> {
    self
      .router
      .get_or_try_init(|| async {
        let start = Instant::now();
        info!("Cold start: initializing router");
        let router = (self.init)()
          .map_err(|err| EventError::Initialization(err, Backtrace::new()))?;
        info!(
          "Router initialized with {} routes in {:?}",
          router.len(),
          start.elapsed()
        );
        Ok::<_, EventError>(router)
      })
      .await
  }

  /// Handle one Lambda invocation.
  ///
  /// The payload is deserialized here rather than by the runtime so that a payload of the wrong
  /// shape still produces a 400 response event instead of a failed invocation.
  pub async fn dispatch_event(
    &self,
    event: LambdaEvent<serde_json::Value>,
  ) -> GatewayResponseEvent {
    let LambdaEvent { payload, context } = event;
    match GatewayRequestEvent::from_value(payload) {
      Ok(event) => self.dispatch(event, context).await,
      Err(err) => match self.router().await {
        Ok(_) => respond_to_event_error(err),
        Err(init_err) => respond_to_event_error(init_err),
      },
    }
  }

  /// Handle one gateway event.
  ///
  /// Every failure is converted into a well-formed response event: malformed events become 400,
  /// initialization and handler failures become 500.
  pub async fn dispatch(
    &self,
    event: GatewayRequestEvent,
    lambda_context: LambdaContext,
  ) -> GatewayResponseEvent {
    trace!("Request: {event:#?}");
    trace!("Lambda context: {lambda_context:#?}");

    let router = match self.router().await {
      Ok(router) => router,
      Err(err) => return respond_to_event_error(err),
    };

    let mut request = match translate_request(event, &self.config) {
      Ok(request) => request,
      Err(err) => return respond_to_event_error(err),
    };
    request.extensions_mut().insert(lambda_context);

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = router.route(request).await;
    debug!("{method} {path} -> {}", response.status());

    match translate_response(response) {
      Ok(event) => event,
      Err(err) => respond_to_event_error(err),
    }
  }
}

fn respond_to_event_error(err: EventError) -> GatewayResponseEvent {
  err.log();

  let response: HttpResponse = err.into();
  let status = response.status().as_u16();
  translate_response(response).unwrap_or_else(|_| GatewayResponseEvent::empty(status))
}

#[cfg(test)]
mod tests {
  use super::Adapter;
  use crate::config::AdapterConfig;
  use crate::event::GatewayRequestEvent;
  use crate::router::{Router, RouterError};
  use crate::{HttpRequest, HttpResponse, LambdaContext, LambdaEvent};

  use aws_lambda_events::encodings::Body;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use std::sync::atomic::{AtomicUsize, Ordering};

  fn ping_router() -> Result<Router, RouterError> {
    Router::builder()
      .get("/api/ping", |_: HttpRequest| async {
        Ok::<_, anyhow::Error>(HttpResponse::new(Body::Empty))
      })
      .build()
  }

  fn event(value: serde_json::Value) -> GatewayRequestEvent {
    serde_json::from_value(value).unwrap()
  }

  #[tokio::test]
  async fn test_initializes_once_sequentially() {
    let calls = AtomicUsize::new(0);
    let adapter = Adapter::new(AdapterConfig::default(), || {
      calls.fetch_add(1, Ordering::SeqCst);
      ping_router()
    });
    assert!(!adapter.is_ready());

    for _ in 0..3 {
      let response = adapter
        .dispatch(
          event(json!({"httpMethod": "GET", "path": "/api/ping"})),
          LambdaContext::default(),
        )
        .await;
      assert_eq!(response.status_code, 200);
    }
    assert!(adapter.is_ready());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_failed_initialization_is_retried() {
    let calls = AtomicUsize::new(0);
    let adapter = Adapter::new(AdapterConfig::default(), || {
      if calls.fetch_add(1, Ordering::SeqCst) == 0 {
        Router::builder()
          .get("/api/{rest+}/tail", |_: HttpRequest| async {
            Ok::<_, anyhow::Error>(HttpResponse::new(Body::Empty))
          })
          .build()
      } else {
        ping_router()
      }
    });

    let response = adapter
      .dispatch(
        event(json!({"httpMethod": "GET", "path": "/api/ping"})),
        LambdaContext::default(),
      )
      .await;
    assert_eq!(response.status_code, 500);
    assert_eq!(response.body, "");
    assert!(!adapter.is_ready());

    let response = adapter
      .dispatch(
        event(json!({"httpMethod": "GET", "path": "/api/ping"})),
        LambdaContext::default(),
      )
      .await;
    assert_eq!(response.status_code, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_malformed_event_is_400() {
    let adapter = Adapter::new(AdapterConfig::default(), ping_router);
    let response = adapter
      .dispatch(event(json!({"path": "/api/ping"})), LambdaContext::default())
      .await;
    assert_eq!(response.status_code, 400);
    assert_eq!(response.body, "Malformed request: missing `httpMethod`");
    assert_eq!(response.headers.get("content-type").unwrap(), "text/plain");
    assert!(!response.is_base64_encoded);
  }

  #[tokio::test]
  async fn test_undeserializable_payload_is_400() {
    let adapter = Adapter::new(AdapterConfig::default(), ping_router);
    let response = adapter
      .dispatch_event(LambdaEvent::new(
        json!({"httpMethod": "GET", "path": "/api/ping", "headers": {"X-A": null}}),
        LambdaContext::default(),
      ))
      .await;
    assert_eq!(response.status_code, 400);
    assert_eq!(response.body, "Malformed request: invalid `headers.X-A`");
    assert!(adapter.is_ready());

    let response = adapter
      .dispatch_event(LambdaEvent::new(
        json!({
          "httpMethod": "GET",
          "path": "/api/ping",
          "isBase64Encoded": null,
          "requestContext": {"identity": null},
        }),
        LambdaContext::default(),
      ))
      .await;
    assert_eq!(response.status_code, 200);
  }
}
