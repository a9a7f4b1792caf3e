use pretty_assertions::assert_eq;
use reqwest::{Client, StatusCode, Url};
use serde_json::json;

#[tokio::test]
// Since this test depends on the API running separately (either locally or in AWS), we only run
// the test when specifically requested (see
// https://doc.rust-lang.org/book/ch11-02-running-tests.html#ignoring-some-tests-unless-specifically-requested).
#[ignore]
async fn test_integration() {
  env_logger::init();

  let base_url = Url::parse(
    &std::env::var("APILAMBDA_BASE_URL").unwrap_or_else(|_| "http://localhost:3000".to_string()),
  )
  .unwrap();

  let client = Client::new();

  // Health check.
  {
    let response = client
      .get(base_url.join("api/ping").unwrap())
      .send()
      .await
      .unwrap_or_else(|err| panic!("request failed: {}", err));

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
      response.json::<serde_json::Value>().await.unwrap(),
      json!({"message": "pong"})
    );
  }

  // Request context echo.
  {
    let response = client
      .get(base_url.join("api/meta").unwrap())
      .send()
      .await
      .unwrap_or_else(|err| panic!("request failed: {}", err));

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.json::<serde_json::Value>().await.unwrap();
    assert!(body["requestId"].is_string(), "{body}");
    assert!(body["stage"].is_string(), "{body}");
  }

  // Unknown route.
  {
    let response = client
      .get(base_url.join("nope").unwrap())
      .send()
      .await
      .unwrap_or_else(|err| panic!("request failed: {}", err));

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
  }
}
