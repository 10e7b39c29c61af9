use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::response::IntoResponse;
use http::{HeaderMap, HeaderValue, header};
use serde::{Deserialize, Serialize};
use tower::Service;
use tracing::error;
use url::Url;

use crate::error::{Error, Result};
use crate::feed::CONTENT_TYPE;
use crate::source::{Source, SourceConfig, SourceContext};

type Request = http::Request<Body>;
type Response = http::Response<Body>;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EndpointConfig {
  pub path: String,
  pub note: Option<String>,
  /// Overrides the source's default `Cache-Control` header.
  pub cache_control: Option<String>,
  /// Written as `source: { changelog: {..} }`
  #[serde(with = "serde_yaml::with::singleton_map")]
  pub source: SourceConfig,
}

impl EndpointConfig {
  pub fn path_sans_slash(&self) -> &str {
    self.path.trim_start_matches('/')
  }

  pub fn build(
    self,
    context: &SourceContext,
    base_url: Option<Url>,
  ) -> EndpointService {
    EndpointService::from_config(self, context, base_url)
  }
}

#[derive(Clone)]
pub struct EndpointService {
  source: Arc<Source>,
  cache_control: String,
  /// Configured site base, takes precedence over the request's Host.
  base_url: Option<Url>,
}

#[derive(Clone, Default, Debug)]
pub struct EndpointParam {
  /// Origin of the site, e.g. `https://example.com`
  base: Option<Url>,
  /// Path and query of the request, used for the feed's self link
  path: String,
  /// Product short names or package names
  products: Option<Vec<String>>,
  /// Include pre-release versions
  include_rc: bool,
  /// Page selected for the page change feed
  page: Option<String>,
  pretty_print: bool,
}

impl EndpointParam {
  pub fn new(base: Option<Url>) -> Self {
    Self {
      base,
      ..Default::default()
    }
  }

  pub fn with_path(mut self, path: impl Into<String>) -> Self {
    self.path = path.into();
    self
  }

  pub fn with_products(mut self, products: Vec<String>) -> Self {
    self.products = Some(products).filter(|p| !p.is_empty());
    self
  }

  pub fn with_include_rc(mut self, include_rc: bool) -> Self {
    self.include_rc = include_rc;
    self
  }

  pub fn with_page(mut self, page: impl Into<String>) -> Self {
    self.page = Some(page.into());
    self
  }

  pub fn with_pretty_print(mut self, pretty_print: bool) -> Self {
    self.pretty_print = pretty_print;
    self
  }

  fn from_request(req: &Request, base_url: Option<&Url>) -> Self {
    let base = base_url.cloned().or_else(|| infer_base(req.headers()));
    let path = req
      .uri()
      .path_and_query()
      .map(|x| x.as_str().to_owned())
      .unwrap_or_else(|| req.uri().path().to_owned());

    Self {
      base,
      path,
      products: Self::parse_products(req),
      include_rc: Self::parse_flag(req, "include-rc"),
      page: Self::get_query(req, "page").filter(|x| !x.is_empty()),
      pretty_print: Self::parse_flag(req, "pp"),
    }
  }

  fn parse_products(req: &Request) -> Option<Vec<String>> {
    let products: Vec<_> = Self::get_query(req, "products")?
      .split(',')
      .map(|x| x.trim().to_owned())
      .filter(|x| !x.is_empty())
      .collect();
    Some(products).filter(|p| !p.is_empty())
  }

  fn parse_flag(req: &Request, name: &str) -> bool {
    Self::get_query(req, name)
      .map(|x| x == "1" || x == "true")
      .unwrap_or(false)
  }

  fn get_query(req: &Request, name: &str) -> Option<String> {
    let url = Url::parse(&format!("http://placeholder{}", &req.uri())).ok()?;
    url
      .query_pairs()
      .find_map(|(k, v)| (k == name).then_some(v))
      .map(|x| x.to_string())
  }

  pub fn base(&self) -> Result<&Url> {
    self.base.as_ref().ok_or(Error::BaseUrlNotInferred)
  }

  /// Absolute URL of the request, falling back to the bare path when the
  /// base is unknown.
  pub fn self_link(&self) -> String {
    self
      .base
      .as_ref()
      .and_then(|base| base.join(&self.path).ok())
      .map(|url| url.to_string())
      .unwrap_or_else(|| self.path.clone())
  }

  pub fn products(&self) -> Option<&[String]> {
    self.products.as_deref()
  }

  pub fn include_rc(&self) -> bool {
    self.include_rc
  }

  pub fn page(&self) -> Option<&str> {
    self.page.as_deref()
  }
}

fn infer_base(headers: &HeaderMap) -> Option<Url> {
  let header_str = |name: &str| {
    headers
      .get(name)
      .and_then(|x| x.to_str().ok())
      .map(|x| x.split(',').next().unwrap_or(x).trim().to_owned())
  };

  let host = header_str("x-forwarded-host").or_else(|| header_str("host"))?;
  let scheme =
    header_str("x-forwarded-proto").unwrap_or_else(|| "http".to_owned());
  Url::parse(&format!("{scheme}://{host}")).ok()
}

#[derive(Clone)]
pub struct EndpointOutcome {
  feed_xml: String,
  cache_control: String,
}

impl EndpointOutcome {
  pub fn feed_xml(&self) -> &str {
    &self.feed_xml
  }
}

impl IntoResponse for EndpointOutcome {
  fn into_response(self) -> axum::response::Response {
    let mut resp = Response::new(Body::from(self.feed_xml));
    let headers = resp.headers_mut();
    headers
      .insert(header::CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE));
    if let Ok(value) = HeaderValue::from_str(&self.cache_control) {
      headers.insert(header::CACHE_CONTROL, value);
    }
    resp
  }
}

impl Service<EndpointParam> for EndpointService {
  type Response = EndpointOutcome;
  type Error = Error;
  type Future =
    Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

  fn poll_ready(
    &mut self,
    _cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Result<(), Self::Error>> {
    std::task::Poll::Ready(Ok(()))
  }

  fn call(&mut self, req: EndpointParam) -> Self::Future {
    let this = self.clone();
    let fut = async { this.call_internal(req).await };
    Box::pin(fut)
  }
}

impl Service<Request> for EndpointService {
  type Response = Response;
  type Error = Infallible;
  // not Sync because the request's Body may not be sync
  type Future =
    Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

  fn poll_ready(
    &mut self,
    _cx: &mut std::task::Context<'_>,
  ) -> std::task::Poll<Result<(), Self::Error>> {
    std::task::Poll::Ready(Ok(()))
  }

  fn call(&mut self, req: Request) -> Self::Future {
    let this = self.clone();
    let param = EndpointParam::from_request(&req, this.base_url.as_ref());
    let fut = async move {
      let resp = match this.call_internal(param).await {
        Ok(outcome) => outcome.into_response(),
        Err(e) => {
          error!("failed to generate feed for {}: {e}", req.uri());
          e.into_response()
        }
      };
      Ok(resp)
    };
    Box::pin(fut)
  }
}

impl EndpointService {
  pub fn from_config(
    config: EndpointConfig,
    context: &SourceContext,
    base_url: Option<Url>,
  ) -> Self {
    let source = config.source.build(context);
    let cache_control = config
      .cache_control
      .unwrap_or_else(|| source.default_cache_control().to_owned());

    Self {
      source: Arc::new(source),
      cache_control,
      base_url,
    }
  }

  async fn call_internal(
    self,
    param: EndpointParam,
  ) -> Result<EndpointOutcome> {
    let feed = self.source.fetch_feed(&param).await?;
    let feed_xml = feed.serialize(param.pretty_print)?;

    Ok(EndpointOutcome {
      feed_xml,
      cache_control: self.cache_control,
    })
  }
}

#[cfg(test)]
mod test {
  use super::*;

  fn request(uri: &str, headers: &[(&str, &str)]) -> Request {
    let mut builder = http::Request::builder().uri(uri);
    for (name, value) in headers {
      builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).unwrap()
  }

  #[test]
  fn test_param_from_request() {
    let req = request(
      "/api/changelog-rss?products=Realm,%20Reunite,&include-rc=true",
      &[("host", "docs.example.com")],
    );
    let param = EndpointParam::from_request(&req, None);

    assert_eq!(param.base().unwrap().as_str(), "http://docs.example.com/");
    assert_eq!(
      param.products(),
      Some(&["Realm".to_string(), "Reunite".to_string()][..])
    );
    assert!(param.include_rc());
    assert_eq!(param.page(), None);
    assert_eq!(
      param.self_link(),
      "http://docs.example.com/api/changelog-rss?products=Realm,%20Reunite,&include-rc=true"
    );
  }

  #[test]
  fn test_param_base_precedence() {
    let req = request(
      "/feed?page=/docs/a&products=",
      &[
        ("host", "internal:8080"),
        ("x-forwarded-host", "example.com"),
        ("x-forwarded-proto", "https"),
      ],
    );
    let param = EndpointParam::from_request(&req, None);
    assert_eq!(param.base().unwrap().as_str(), "https://example.com/");
    assert_eq!(param.page(), Some("/docs/a"));
    assert_eq!(param.products(), None);
    assert!(!param.include_rc());

    let configured = Url::parse("https://site.test").unwrap();
    let param = EndpointParam::from_request(&req, Some(&configured));
    assert_eq!(param.base().unwrap().as_str(), "https://site.test/");
  }

  #[test]
  fn test_missing_base() {
    let req = request("/feed", &[]);
    let param = EndpointParam::from_request(&req, None);
    assert!(matches!(param.base(), Err(Error::BaseUrlNotInferred)));
    assert_eq!(param.self_link(), "/feed");
  }
}
