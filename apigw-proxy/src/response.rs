use crate::error::EventError;
use crate::event::GatewayResponseEvent;
use crate::{HttpResponse, StatusCode};

use aws_lambda_events::encodings::Body;
use backtrace::Backtrace;
use base64::Engine as _;
use headers::{ContentType, Header};
use http::HeaderValue;
use indexmap::IndexMap;
use mime::Mime;
use serde::Serialize;

/// Translate a router response into the gateway's response event.
///
/// Headers are emitted twice: `multiValueHeaders` keeps every value, while `headers` keeps the
/// last value of each header. The body is emitted as plain text only for [`Body::Text`] bodies
/// with a textual `Content-Type`; anything else is base64-encoded.
pub fn translate_response(response: HttpResponse) -> Result<GatewayResponseEvent, EventError> {
  let (parts, body) = response.into_parts();

  let status_code = parts.status.as_u16();
  if !(100..=599).contains(&status_code) {
    return Err(EventError::InvalidStatusCode(status_code, Backtrace::new()));
  }

  let mut headers = IndexMap::new();
  let mut multi_value_headers = IndexMap::<String, Vec<String>>::new();
  for (name, value) in &parts.headers {
    // `HeaderValue::to_str` rejects anything beyond visible ASCII, but request headers may carry
    // UTF-8 and must survive the round trip.
    let value = std::str::from_utf8(value.as_bytes())
      .map_err(|err| {
        EventError::InvalidResponseHeader(name.to_owned(), Box::new(err), Backtrace::new())
      })?
      .to_string();
    headers.insert(name.to_string(), value.clone());
    multi_value_headers
      .entry(name.to_string())
      .or_default()
      .push(value);
  }

  let textual = parts
    .headers
    .get(ContentType::name())
    .map_or(false, is_textual_content_type);
  let (body, is_base64_encoded) = match body {
    Body::Empty => (String::new(), false),
    Body::Text(text) if textual => (text, false),
    Body::Text(text) => (encode_base64(text.as_bytes()), true),
    Body::Binary(bytes) => (encode_base64(&bytes), true),
  };

  Ok(GatewayResponseEvent {
    status_code,
    headers,
    multi_value_headers,
    body,
    is_base64_encoded,
  })
}

/// Build a response from raw bytes, choosing the body representation from the content type.
///
/// Bytes that are valid UTF-8 and declared with a textual content type become [`Body::Text`];
/// all other bytes become [`Body::Binary`].
pub fn bytes_response(status: StatusCode, content_type: Mime, bytes: Vec<u8>) -> HttpResponse {
  let header_value = HeaderValue::from_str(content_type.as_ref());
  let textual = header_value
    .as_ref()
    .map_or(false, is_textual_content_type);

  let body = if bytes.is_empty() {
    Body::Empty
  } else if textual {
    match String::from_utf8(bytes) {
      Ok(text) => Body::Text(text),
      Err(err) => Body::Binary(err.into_bytes()),
    }
  } else {
    Body::Binary(bytes)
  };

  let mut response = HttpResponse::new(body);
  *response.status_mut() = status;
  if let Ok(header_value) = header_value {
    response
      .headers_mut()
      .insert(ContentType::name().to_owned(), header_value);
  }
  response
}

/// Serialize `value` as a JSON response with the given status.
pub fn json_response<T>(status: StatusCode, value: &T) -> Result<HttpResponse, EventError>
where
  T: Serialize,
{
  let body = to_json(value).map_err(|err| EventError::ToJsonResponse {
    type_name: std::any::type_name::<T>().into(),
    source: Box::new(err),
    backtrace: Backtrace::new(),
  })?;

  let mut response = HttpResponse::new(Body::Text(body));
  *response.status_mut() = status;
  response.headers_mut().insert(
    ContentType::name().to_owned(),
    HeaderValue::from_static("application/json"),
  );
  Ok(response)
}

fn to_json<T>(value: &T) -> Result<String, serde_path_to_error::Error<serde_json::Error>>
where
  T: Serialize,
{
  let mut json_bytes = Vec::new();
  let mut serializer = serde_json::Serializer::new(&mut json_bytes);
  serde_path_to_error::serialize(value, &mut serializer)?;
  // serde_json only ever writes UTF-8.
  Ok(String::from_utf8_lossy(&json_bytes).into_owned())
}

/// Whether a `Content-Type` header value denotes text that can travel as a plain string.
pub fn is_textual_content_type(value: &HeaderValue) -> bool {
  let Some(mime) = value
    .to_str()
    .ok()
    .and_then(|value| value.parse::<Mime>().ok())
  else {
    return false;
  };

  if mime.type_() == mime::TEXT {
    return true;
  }
  if mime.suffix() == Some(mime::JSON) || mime.suffix() == Some(mime::XML) {
    return true;
  }
  mime.type_() == mime::APPLICATION
    && matches!(
      mime.subtype().as_str(),
      "json" | "xml" | "javascript" | "ecmascript" | "x-www-form-urlencoded" | "graphql"
    )
}

fn encode_base64(bytes: &[u8]) -> String {
  base64::engine::general_purpose::STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
  use super::{bytes_response, is_textual_content_type, json_response, translate_response};
  use crate::{HttpResponse, StatusCode};

  use aws_lambda_events::encodings::Body;
  use base64::Engine as _;
  use http::HeaderValue;
  use pretty_assertions::assert_eq;
  use serde_json::json;

  #[test]
  fn test_collapse_headers() {
    let mut response = HttpResponse::new(Body::Empty);
    let headers = response.headers_mut();
    headers.append("set-cookie", HeaderValue::from_static("a=1"));
    headers.append("set-cookie", HeaderValue::from_static("b=2"));
    headers.append("x-request-id", HeaderValue::from_static("abc"));

    let event = translate_response(response).unwrap();
    assert_eq!(event.status_code, 200);
    assert_eq!(event.headers.get("set-cookie").unwrap(), "b=2");
    assert_eq!(event.headers.get("x-request-id").unwrap(), "abc");
    assert_eq!(
      event.multi_value_headers.get("set-cookie").unwrap(),
      &vec!["a=1".to_string(), "b=2".to_string()]
    );
    assert_eq!(event.body, "");
    assert!(!event.is_base64_encoded);
  }

  #[test]
  fn test_utf8_header_values() {
    let mut response = HttpResponse::new(Body::Empty);
    response.headers_mut().insert(
      "content-disposition",
      HeaderValue::from_str("attachment; filename=\"café.txt\"").unwrap(),
    );
    let event = translate_response(response).unwrap();
    assert_eq!(
      event.headers.get("content-disposition").unwrap(),
      "attachment; filename=\"café.txt\""
    );

    let mut response = HttpResponse::new(Body::Empty);
    response
      .headers_mut()
      .insert("x-raw", HeaderValue::from_bytes(b"\xff\xfe").unwrap());
    let err = translate_response(response).unwrap_err();
    assert_eq!(err.name(), "InvalidResponseHeader");
  }

  #[test]
  fn test_textual_bodies() {
    let response = json_response(StatusCode::CREATED, &json!({"message": "pong"})).unwrap();
    let event = translate_response(response).unwrap();
    assert_eq!(event.status_code, 201);
    assert_eq!(event.body, r#"{"message":"pong"}"#);
    assert!(!event.is_base64_encoded);
    assert_eq!(event.headers.get("content-type").unwrap(), "application/json");

    // Text without a declared textual content type is not trusted as text.
    let event = translate_response(HttpResponse::new(Body::Text("hi".to_string()))).unwrap();
    assert_eq!(event.body, "aGk=");
    assert!(event.is_base64_encoded);
  }

  #[test]
  fn test_binary_bodies_round_trip() {
    let bytes = vec![0u8, 159, 146, 150, 0, b'a', 0xff, 0xfe];
    for content_type in [mime::APPLICATION_OCTET_STREAM, mime::TEXT_PLAIN_UTF_8] {
      let response = bytes_response(StatusCode::OK, content_type, bytes.clone());
      let event = translate_response(response).unwrap();
      assert!(event.is_base64_encoded);
      assert_eq!(
        base64::engine::general_purpose::STANDARD
          .decode(event.body.as_bytes())
          .unwrap(),
        bytes
      );
    }

    // Explicitly binary bodies stay base64 even when the bytes are valid UTF-8.
    let mut response = HttpResponse::new(Body::Binary(b"plain".to_vec()));
    response
      .headers_mut()
      .insert("content-type", HeaderValue::from_static("text/plain"));
    let event = translate_response(response).unwrap();
    assert!(event.is_base64_encoded);
    assert_eq!(event.body, "cGxhaW4=");
  }

  #[test]
  fn test_bytes_response_detects_text() {
    let response = bytes_response(StatusCode::OK, mime::TEXT_HTML_UTF_8, b"<p>hi</p>".to_vec());
    let event = translate_response(response).unwrap();
    assert!(!event.is_base64_encoded);
    assert_eq!(event.body, "<p>hi</p>");
    assert_eq!(
      event.headers.get("content-type").unwrap(),
      "text/html; charset=utf-8"
    );
  }

  #[test]
  fn test_invalid_status_code() {
    let mut response = HttpResponse::new(Body::Empty);
    *response.status_mut() = StatusCode::from_u16(600).unwrap();
    let err = translate_response(response).unwrap_err();
    assert_eq!(err.name(), "InvalidStatusCode");
  }

  #[test]
  fn test_textual_content_types() {
    for (value, expected) in [
      ("application/json", true),
      ("application/problem+json", true),
      ("application/vnd.api+json; charset=utf-8", true),
      ("text/csv", true),
      ("image/svg+xml", true),
      ("application/x-www-form-urlencoded", true),
      ("application/octet-stream", false),
      ("image/png", false),
      ("not a mime type", false),
    ] {
      assert_eq!(
        is_textual_content_type(&HeaderValue::from_static(value)),
        expected,
        "{value}"
      );
    }
  }
}
