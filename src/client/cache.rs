use std::sync::Arc;

use mime::Mime;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{Error, Result};
use crate::util::TimedLruCache;

pub type ResponseCache = TimedLruCache<Url, Response>;

#[derive(Clone)]
pub struct Response {
  inner: Arc<InnerResponse>,
}

struct InnerResponse {
  url: Url,
  status: reqwest::StatusCode,
  headers: HeaderMap,
  body: Box<[u8]>,
}

impl Response {
  pub async fn from_reqwest_resp(resp: reqwest::Response) -> Result<Self> {
    let status = resp.status();
    let headers = resp.headers().clone();
    let url = resp.url().clone();
    let body = resp.bytes().await?.to_vec().into_boxed_slice();
    let resp = InnerResponse {
      url,
      status,
      headers,
      body,
    };

    Ok(Self {
      inner: Arc::new(resp),
    })
  }

  #[cfg(test)]
  pub fn new(url: Url, status: reqwest::StatusCode, body: &str) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert(
      "content-type",
      "application/json; charset=utf-8"
        .parse()
        .expect("invalid content-type"),
    );

    Self {
      inner: Arc::new(InnerResponse {
        url,
        status,
        headers,
        body: body.as_bytes().into(),
      }),
    }
  }

  pub fn error_for_status(self) -> Result<Self> {
    let status = self.inner.status;
    if status.is_client_error() || status.is_server_error() {
      return Err(Error::HttpStatus(status, self.inner.url.clone()));
    }

    Ok(self)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.inner.headers.get(name).and_then(|v| v.to_str().ok())
  }

  pub fn text_with_charset(&self, default_encoding: &str) -> String {
    let content_type = self.content_type();
    let encoding_name = content_type
      .as_ref()
      .and_then(|mime| {
        mime.get_param("charset").map(|charset| charset.as_str())
      })
      .unwrap_or(default_encoding);
    let encoding = encoding_rs::Encoding::for_label(encoding_name.as_bytes())
      .unwrap_or(encoding_rs::UTF_8);

    let (text, _, _) = encoding.decode(self.body());
    text.into_owned()
  }

  pub fn text(&self) -> String {
    self.text_with_charset("utf-8")
  }

  pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
    Ok(serde_json::from_str(&self.text())?)
  }

  pub fn content_type(&self) -> Option<Mime> {
    self.header("content-type").and_then(|v| v.parse().ok())
  }

  pub fn status(&self) -> reqwest::StatusCode {
    self.inner.status
  }

  pub fn body(&self) -> &[u8] {
    &self.inner.body
  }
}
