use crate::error::EventError;

use backtrace::Backtrace;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

/// Opaque, order-preserving map of JSON values (e.g., authorizer claims).
pub type JsonMap = IndexMap<String, serde_json::Value>;

/// Amazon API Gateway REST API (payload format 1.0) proxy integration request.
///
/// API Gateway sends `null` rather than `{}` for empty maps, so every map-valued field accepts
/// `null` and deserializes it as empty. The same holds for the flag and nested context objects.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequestEvent {
  /// Gateway resource template that matched (e.g., `/{proxy+}`).
  #[serde(default)]
  pub resource: Option<String>,
  /// Request path as received by the gateway.
  #[serde(default)]
  pub path: Option<String>,
  /// HTTP method (e.g., `GET`).
  #[serde(default)]
  pub http_method: Option<String>,
  /// Single-value request headers.
  #[serde(default, deserialize_with = "null_as_default")]
  pub headers: IndexMap<String, String>,
  /// Multi-value request headers.
  #[serde(default, deserialize_with = "null_as_default")]
  pub multi_value_headers: IndexMap<String, Vec<String>>,
  /// Single-value query string parameters.
  #[serde(default, deserialize_with = "null_as_default")]
  pub query_string_parameters: IndexMap<String, String>,
  /// Multi-value query string parameters.
  #[serde(default, deserialize_with = "null_as_default")]
  pub multi_value_query_string_parameters: IndexMap<String, Vec<String>>,
  /// Path parameters captured by the gateway resource template.
  #[serde(default, deserialize_with = "null_as_default")]
  pub path_parameters: IndexMap<String, String>,
  /// Stage variables configured on the deployment stage.
  #[serde(default, deserialize_with = "null_as_default")]
  pub stage_variables: IndexMap<String, String>,
  /// Request body, base64-encoded if [`is_base64_encoded`](Self::is_base64_encoded) is set.
  #[serde(default)]
  pub body: Option<String>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub is_base64_encoded: bool,
  #[serde(default, deserialize_with = "null_as_default")]
  pub request_context: RequestContext,
}

impl GatewayRequestEvent {
  /// Deserialize a raw Lambda payload.
  ///
  /// Payloads that do not have the shape of a proxy request (e.g., a header with a non-string
  /// value) fail with [`EventError::InvalidEvent`], which names the offending field.
  pub fn from_value(payload: serde_json::Value) -> Result<Self, EventError> {
    serde_path_to_error::deserialize(payload)
      .map_err(|err| EventError::InvalidEvent(Box::new(err), Backtrace::new()))
  }

  /// Check that the fields required to build an HTTP request are present.
  pub fn validate(&self) -> Result<(), EventError> {
    if self
      .http_method
      .as_deref()
      .map_or(true, |method| method.trim().is_empty())
    {
      return Err(EventError::MalformedEvent("httpMethod", Backtrace::new()));
    }
    if self.path.as_deref().map_or(true, str::is_empty) {
      return Err(EventError::MalformedEvent("path", Backtrace::new()));
    }
    Ok(())
  }
}

/// Per-request metadata supplied by API Gateway.
///
/// Fields not named here are preserved in [`other`](Self::other) so that the context can be
/// echoed back without loss.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub account_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub api_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resource_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resource_path: Option<String>,
  /// Gateway-assigned request ID.
  #[serde(default, deserialize_with = "null_as_default")]
  pub request_id: String,
  /// Deployment stage name (e.g., `prod`).
  #[serde(default, deserialize_with = "null_as_default")]
  pub stage: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub http_method: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub domain_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub protocol: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_time: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub request_time_epoch: Option<i64>,
  #[serde(default, deserialize_with = "null_as_default")]
  pub identity: Identity,
  /// Claims set by an upstream authorizer, passed through untouched.
  #[serde(default, deserialize_with = "null_as_default")]
  pub authorizer: JsonMap,
  #[serde(flatten)]
  pub other: JsonMap,
}

/// Caller identity as seen by API Gateway.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_arn: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub source_ip: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_agent: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub caller: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub account_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub access_key: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cognito_identity_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cognito_identity_pool_id: Option<String>,
  #[serde(flatten)]
  pub other: JsonMap,
}

/// Amazon API Gateway proxy integration response.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponseEvent {
  pub status_code: u16,
  /// One value per header; the last value wins when a header has several.
  pub headers: IndexMap<String, String>,
  /// Every value of every header, in response order.
  pub multi_value_headers: IndexMap<String, Vec<String>>,
  pub body: String,
  pub is_base64_encoded: bool,
}

impl GatewayResponseEvent {
  /// Response with the given status and no headers or body.
  pub fn empty(status_code: u16) -> Self {
    Self {
      status_code,
      ..Default::default()
    }
  }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
