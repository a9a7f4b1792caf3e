use log::info;

/// Environment variable holding the path prefix applied to every request path.
pub const BASE_PATH_ENV: &str = "APIGW_BASE_PATH";

/// Environment variable naming the catch-all path parameter (e.g., `proxy` for `/{proxy+}`).
pub const PROXY_PARAM_ENV: &str = "APIGW_PROXY_PARAM";

/// How gateway request paths map onto router paths.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AdapterConfig {
  /// Prefix joined in front of every translated request path (e.g., `/v1` when a custom domain
  /// mapping strips it before the event is delivered).
  pub base_path: Option<String>,
  /// Name of a `{name+}` gateway path parameter whose captured suffix replaces the event path.
  ///
  /// For example, with a gateway resource `/{proxy+}` and this set to `proxy`, a request to
  /// `/api/ping` is routed as `/api/ping` even if the gateway's `path` differs (e.g., includes a
  /// stage prefix).
  pub proxy_parameter: Option<String>,
}

impl AdapterConfig {
  /// Read the configuration once from the process environment.
  ///
  /// Empty variables are treated as unset.
  pub fn from_env() -> Self {
    let config = Self {
      base_path: non_empty_env(BASE_PATH_ENV),
      proxy_parameter: non_empty_env(PROXY_PARAM_ENV),
    };
    info!("Adapter configuration: {config:?}");
    config
  }

  /// Use `base_path` as the path prefix.
  pub fn with_base_path<S>(mut self, base_path: S) -> Self
  where
    S: Into<String>,
  {
    self.base_path = Some(base_path.into());
    self
  }

  /// Resolve paths from the catch-all path parameter `name`.
  pub fn with_proxy_parameter<S>(mut self, name: S) -> Self
  where
    S: Into<String>,
  {
    self.proxy_parameter = Some(name.into());
    self
  }
}

fn non_empty_env(name: &str) -> Option<String> {
  std::env::var(name).ok().filter(|value| !value.trim().is_empty())
}
