use crate::{BuildInfo, HandlerError};

use apigw_proxy::event::JsonMap;
use apigw_proxy::{
  json_response, HttpRequest, HttpResponse, RequestContext, RequestExt, StageVariables,
  StatusCode,
};
use serde::Serialize;

use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetaResponse<'a> {
  context: &'a RequestContext,
  stage_vars: Option<&'a StageVariables>,
  request_id: &'a str,
  stage: &'a str,
  authorizer: &'a JsonMap,
  version: &'a str,
  sha: &'a str,
}

/// `GET /api/meta`
///
/// Echoes the gateway request context along with the build and deployment identifiers.
pub async fn meta(
  request: HttpRequest,
  build_info: Arc<BuildInfo>,
) -> anyhow::Result<HttpResponse> {
  let context = request
    .request_context()
    .ok_or(HandlerError::MissingRequestContext)?;

  let body = MetaResponse {
    context,
    stage_vars: request.stage_variables(),
    request_id: &context.request_id,
    stage: &context.stage,
    authorizer: &context.authorizer,
    version: &build_info.version,
    sha: &build_info.sha,
  };

  Ok(json_response(StatusCode::OK, &body)?)
}

/// `GET /api/me`
///
/// Responds with `{"<user>": "<user>"}` for the caller's gateway identity.
pub async fn me(request: HttpRequest) -> anyhow::Result<HttpResponse> {
  let context = request
    .request_context()
    .ok_or(HandlerError::MissingRequestContext)?;
  let user = context.identity.user.clone().unwrap_or_default();

  let mut body = serde_json::Map::new();
  body.insert(user.clone(), serde_json::Value::String(user));

  Ok(json_response(StatusCode::OK, &body)?)
}
