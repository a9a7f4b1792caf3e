use crate::event::GatewayResponseEvent;

use futures::FutureExt;
use lambda_runtime::{service_fn, LambdaEvent};

use std::future::Future;

/// Start the Lambda runtime and pass every API Gateway event to `dispatch_event`.
///
/// Events are handed over as raw JSON; [`Adapter::dispatch_event`](crate::Adapter::dispatch_event)
/// deserializes them.
///
/// The dispatch function returns a response event for every outcome (including errors), so the
/// runtime never reports a failed invocation to the gateway.
///
/// # Example
///
/// ```rust,ignore
/// use apigw_proxy::{run_lambda, Adapter, AdapterConfig};
///
/// #[tokio::main]
/// pub async fn main() {
///   let adapter = Adapter::new(AdapterConfig::from_env(), my_app::build_router);
///
///   run_lambda(|event| adapter.dispatch_event(event)).await
/// }
/// ```
pub async fn run_lambda<F, Fut>(mut dispatch_event: F)
where
  F: FnMut(LambdaEvent<serde_json::Value>) -> Fut,
  Fut: Future<Output = GatewayResponseEvent>,
{
  lambda_runtime::run(service_fn(|event: LambdaEvent<serde_json::Value>| {
    dispatch_event(event).map(Result::<_, std::convert::Infallible>::Ok)
  }))
  .await
  .expect("Lambda run loop should never exit")
}
