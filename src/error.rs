use axum::{
  Json,
  response::{IntoResponse, Response},
};
use http::StatusCode;
use serde::Serialize;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("YAML parse error")]
  Yaml(#[from] serde_yaml::Error),

  #[error("IO error")]
  Io(#[from] std::io::Error),

  #[error("Invalid URL {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("{0}")]
  Message(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("IO error")]
  Io(#[from] std::io::Error),

  #[error("YAML parse error")]
  Yaml(#[from] serde_yaml::Error),

  #[error("JSON parse error")]
  Json(#[from] serde_json::Error),

  #[error("Feed error")]
  Rss(#[from] rss::Error),

  #[error("Invalid URL {0}")]
  InvalidUrl(#[from] url::ParseError),

  #[error("Reqwest client error {0:?}")]
  Reqwest(#[from] reqwest::Error),

  #[error("HTTP status error {0} (url: {1})")]
  HttpStatus(reqwest::StatusCode, url::Url),

  #[error("Failed to read content from {path}: {source}")]
  ContentSource {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("Page not found: {0}")]
  PageNotFound(String),

  #[error("Bad request: {0}")]
  BadRequest(String),

  #[error("Can't infer site base url, set base_url in the config")]
  BaseUrlNotInferred,

  #[error("Config error {0:?}")]
  Config(#[from] ConfigError),
}

impl Error {
  pub fn status_code(&self) -> StatusCode {
    match self {
      Error::PageNotFound(_) => StatusCode::NOT_FOUND,
      Error::BadRequest(_) | Error::BaseUrlNotInferred => {
        StatusCode::BAD_REQUEST
      }
      _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn label(&self) -> &'static str {
    match self.status_code() {
      StatusCode::NOT_FOUND => "Page not found",
      StatusCode::BAD_REQUEST => "Bad request",
      _ => "Internal server error",
    }
  }
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
  pub error: String,
  pub message: String,
}

impl ErrorBody {
  pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      error: error.into(),
      message: message.into(),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = self.status_code();
    let body = ErrorBody::new(self.label(), self.to_string());
    (status, Json(body)).into_response()
  }
}
