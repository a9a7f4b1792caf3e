use apigw_proxy::{run_lambda, Adapter, AdapterConfig};
use apilambda::{build_router, BuildInfo};

use std::sync::Arc;

#[tokio::main]
pub async fn main() {
  // stdout and stderr are sent to CloudWatch Logs. Use `RUST_LOG` to adjust verbosity.
  env_logger::init();

  let build_info = Arc::new(BuildInfo::from_env());
  let adapter = Adapter::new(AdapterConfig::from_env(), move || {
    build_router(build_info.clone())
  });

  run_lambda(|event| adapter.dispatch_event(event)).await
}
