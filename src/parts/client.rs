use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
}

/// An outgoing HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
  pub method: Method,
  pub url: Url,
  pub headers: Vec<(String, String)>,
  pub body: Option<String>,
}

/// Status plus the body, raw and parsed as JSON. A body that is not JSON
/// parses to `Value::Null`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub text: String,
  pub body: Value,
}

impl HttpResponse {
  pub fn json(status: u16, body: Value) -> Self {
    Self {
      status,
      text: body.to_string(),
      body,
    }
  }

  pub fn text(status: u16, text: impl Into<String>) -> Self {
    let text = text.into();
    Self {
      status,
      body: serde_json::from_str(&text).unwrap_or(Value::Null),
      text,
    }
  }
}

/// Issues HTTP requests. Errors cover transport failures and timeouts only;
/// any response that arrived is returned as `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// Transport backed by a shared `reqwest` client.
#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new(timeout: Duration) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
    let mut builder = match request.method {
      Method::Get => self.client.get(request.url.clone()),
      Method::Post => self.client.post(request.url.clone()),
    };
    for (name, value) in &request.headers {
      builder = builder.header(name, value);
    }
    if let Some(body) = request.body {
      builder = builder.body(body);
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;
    let status = response.status().as_u16();
    let bytes = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", request.url, e))?;

    Ok(HttpResponse::text(status, String::from_utf8_lossy(&bytes)))
  }
}

/// Where the products page embeds the token the search API checks.
static CSRF_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)'X-CSRF-TOKEN':\s+'([^']+)'").expect("CSRF token pattern is valid")
});

/// Builds requests for the two remote APIs and sends them.
#[derive(Clone)]
pub struct PartsClient {
  transport: Arc<dyn Transport>,
  part_detail_url: Url,
  search_url: Url,
  csrf_source_url: Url,
  /// Scraped once and reused; the lock makes concurrent searches share one fetch
  csrf_token: Arc<Mutex<Option<String>>>,
}

impl PartsClient {
  pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
    Self {
      transport,
      part_detail_url: config.endpoints.part_detail.clone(),
      search_url: config.endpoints.search.clone(),
      csrf_source_url: config.endpoints.csrf_source.clone(),
      csrf_token: Arc::new(Mutex::new(None)),
    }
  }

  /// Token sent with search requests, scraped from the products page.
  ///
  /// A failed scrape is not remembered, so the next search tries again.
  pub async fn csrf_token(&self) -> Option<String> {
    let mut token = self.csrf_token.lock().await;
    if let Some(token) = token.as_ref() {
      return Some(token.clone());
    }

    let response = self
      .transport
      .send(HttpRequest {
        method: Method::Get,
        url: self.csrf_source_url.clone(),
        headers: Vec::new(),
        body: None,
      })
      .await;

    match response {
      Ok(response) => match extract_csrf_token(&response.text) {
        Some(found) => {
          debug!("Got CSRF token from {}", self.csrf_source_url);
          *token = Some(found.clone());
          Some(found)
        }
        None => {
          debug!("Failed to read CSRF token from {}", self.csrf_source_url);
          None
        }
      },
      Err(e) => {
        warn!("Failed to fetch CSRF token: {}", e);
        None
      }
    }
  }

  /// Look up a single part by its code.
  pub async fn get_part(&self, code: &str) -> Result<HttpResponse> {
    let mut url = self.part_detail_url.clone();
    url.query_pairs_mut().append_pair("componentCode", code);

    self
      .transport
      .send(HttpRequest {
        method: Method::Get,
        url,
        headers: vec![("Accept".to_string(), "application/json".to_string())],
        body: None,
      })
      .await
  }

  /// Free-text search of the listing API.
  pub async fn search(&self, query: &str) -> Result<HttpResponse> {
    let body = url::form_urlencoded::Serializer::new(String::new())
      .append_pair("search_content", query)
      .finish();

    let mut headers = vec![
      (
        "Content-Type".to_string(),
        "application/x-www-form-urlencoded; charset=UTF-8".to_string(),
      ),
      ("X-Requested-With".to_string(), "XMLHttpRequest".to_string()),
    ];
    if let Some(token) = self.csrf_token().await {
      headers.push(("x-csrf-token".to_string(), token));
    }

    self
      .transport
      .send(HttpRequest {
        method: Method::Post,
        url: self.search_url.clone(),
        headers,
        body: Some(body),
      })
      .await
  }
}

fn extract_csrf_token(page: &str) -> Option<String> {
  CSRF_TOKEN_PATTERN
    .captures(page)
    .and_then(|caps| caps.get(1))
    .map(|m| m.as_str().to_string())
}
