use apigw_proxy::{json_response, HttpRequest, HttpResponse, StatusCode};
use serde_json::json;

/// `GET /api/ping`
pub async fn ping(_request: HttpRequest) -> anyhow::Result<HttpResponse> {
  Ok(json_response(StatusCode::OK, &json!({ "message": "pong" }))?)
}
