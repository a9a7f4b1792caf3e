use crate::config::AdapterConfig;
use crate::error::EventError;
use crate::event::{GatewayRequestEvent, RequestContext};
use crate::router::PathParameters;
use crate::{HttpRequest, LambdaContext, Method};

use backtrace::Backtrace;
use base64::Engine as _;
use http::header::HOST;
use http::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;

use std::sync::Arc;

/// Query string parameters after merging the single- and multi-value maps.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QueryParameters(pub IndexMap<String, Vec<String>>);

impl QueryParameters {
  /// First value of `name`, if present.
  pub fn first(&self, name: &str) -> Option<&str> {
    self
      .0
      .get(name)
      .and_then(|values| values.first())
      .map(String::as_str)
  }

  /// Every value of `name`, in request order.
  pub fn all(&self, name: &str) -> &[String] {
    self.0.get(name).map(Vec::as_slice).unwrap_or_default()
  }
}

/// Stage variables of the gateway deployment stage that received the request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StageVariables(pub IndexMap<String, String>);

impl StageVariables {
  pub fn get(&self, name: &str) -> Option<&str> {
    self.0.get(name).map(String::as_str)
  }
}

/// Accessors for the per-invocation data attached to a translated request.
pub trait RequestExt {
  /// Gateway request context (request ID, stage, identity, authorizer claims).
  fn request_context(&self) -> Option<&RequestContext>;

  /// Merged query string parameters.
  fn query_parameters(&self) -> Option<&QueryParameters>;

  /// Stage variables of the deployment stage.
  fn stage_variables(&self) -> Option<&StageVariables>;

  /// Parameters captured by the matched route pattern.
  fn path_parameters(&self) -> Option<&PathParameters>;

  /// Lambda execution context of the current invocation.
  fn lambda_context(&self) -> Option<&LambdaContext>;
}

impl<B> RequestExt for http::Request<B> {
  fn request_context(&self) -> Option<&RequestContext> {
    self
      .extensions()
      .get::<Arc<RequestContext>>()
      .map(Arc::as_ref)
  }

  fn query_parameters(&self) -> Option<&QueryParameters> {
    self.extensions().get()
  }

  fn stage_variables(&self) -> Option<&StageVariables> {
    self.extensions().get()
  }

  fn path_parameters(&self) -> Option<&PathParameters> {
    self.extensions().get()
  }

  fn lambda_context(&self) -> Option<&LambdaContext> {
    self.extensions().get()
  }
}

/// Translate a gateway event into the request consumed by the router.
///
/// The request context is moved into a shared [`Arc`] and attached as a request extension, along
/// with the merged query parameters and the stage variables.
pub fn translate_request(
  event: GatewayRequestEvent,
  config: &AdapterConfig,
) -> Result<HttpRequest, EventError> {
  event.validate()?;

  let GatewayRequestEvent {
    path,
    http_method,
    headers,
    multi_value_headers,
    query_string_parameters,
    multi_value_query_string_parameters,
    path_parameters,
    stage_variables,
    body,
    is_base64_encoded,
    request_context,
    ..
  } = event;

  let method = http_method
    .as_deref()
    .map(|method| method.trim().to_ascii_uppercase())
    .and_then(|method| Method::from_bytes(method.as_bytes()).ok())
    .ok_or_else(|| EventError::MalformedEvent("httpMethod", Backtrace::new()))?;

  let path = resolve_path(path.as_deref().unwrap_or("/"), &path_parameters, config);
  let query = merge_multi_value(
    query_string_parameters,
    multi_value_query_string_parameters,
    |a, b| a == b,
  );
  let uri = build_uri(&path, &query);

  let mut header_map = HeaderMap::new();
  for (name, values) in merge_multi_value(headers, multi_value_headers, |a, b| {
    a.eq_ignore_ascii_case(b)
  }) {
    let header_name = HeaderName::from_bytes(name.as_bytes())
      .map_err(|err| EventError::InvalidHeader(name.clone(), Box::new(err), Backtrace::new()))?;
    for value in values {
      let header_value = HeaderValue::from_str(&value)
        .map_err(|err| EventError::InvalidHeader(name.clone(), Box::new(err), Backtrace::new()))?;
      header_map.append(header_name.clone(), header_value);
    }
  }
  if !header_map.contains_key(HOST) {
    if let Some(domain_name) = &request_context.domain_name {
      let host = HeaderValue::from_str(domain_name).map_err(|err| {
        EventError::InvalidHeader(HOST.to_string(), Box::new(err), Backtrace::new())
      })?;
      header_map.insert(HOST, host);
    }
  }

  let body = match body {
    Some(body) if is_base64_encoded => base64::engine::general_purpose::STANDARD
      .decode(body.as_bytes())
      .map_err(|err| EventError::InvalidBodyBase64(Box::new(err), Backtrace::new()))?,
    Some(body) => body.into_bytes(),
    None => Vec::new(),
  };

  let mut request = http::Request::builder()
    .method(method)
    .uri(uri.as_str())
    .body(body)
    .map_err(|err| EventError::InvalidRequestUri(uri, Box::new(err), Backtrace::new()))?;

  *request.headers_mut() = header_map;
  let extensions = request.extensions_mut();
  extensions.insert(Arc::new(request_context));
  extensions.insert(QueryParameters(query));
  extensions.insert(StageVariables(stage_variables));

  Ok(request)
}

/// Merge a single-value map into a multi-value map.
///
/// Keys present in the multi-value map keep their full value list; keys only present in the
/// single-value map become one-element lists.
fn merge_multi_value<F>(
  single: IndexMap<String, String>,
  mut multi: IndexMap<String, Vec<String>>,
  same_key: F,
) -> IndexMap<String, Vec<String>>
where
  F: Fn(&str, &str) -> bool,
{
  let single_only = single
    .into_iter()
    .filter(|(key, _)| {
      !multi
        .keys()
        .any(|multi_key| same_key(multi_key.as_str(), key.as_str()))
    })
    .collect::<Vec<_>>();
  multi.extend(single_only.into_iter().map(|(key, value)| (key, vec![value])));
  multi
}

fn resolve_path(
  event_path: &str,
  path_parameters: &IndexMap<String, String>,
  config: &AdapterConfig,
) -> String {
  let routed = config
    .proxy_parameter
    .as_deref()
    .and_then(|name| path_parameters.get(name))
    .map(|suffix| format!("/{}", suffix.trim_start_matches('/')))
    .unwrap_or_else(|| event_path.to_string());
  let routed = if routed.starts_with('/') {
    routed
  } else {
    format!("/{routed}")
  };

  match config
    .base_path
    .as_deref()
    .map(|base| base.trim_matches('/'))
    .filter(|base| !base.is_empty())
  {
    Some(base) if routed == "/" => format!("/{base}"),
    Some(base) => format!("/{base}{routed}"),
    None => routed,
  }
}

fn build_uri(path: &str, query: &IndexMap<String, Vec<String>>) -> String {
  let encoded_path = path
    .split('/')
    .map(|segment| urlencoding::encode(segment))
    .join("/");
  if query.is_empty() {
    return encoded_path;
  }

  let query_string = query
    .iter()
    .flat_map(|(key, values)| {
      values
        .iter()
        .map(move |value| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
    })
    .join("&");
  format!("{encoded_path}?{query_string}")
}
