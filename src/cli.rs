use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tower::Service;
use url::Url;

use crate::{
  config::RootConfig,
  server::{EndpointParam, FeedService, ServerConfig},
};

#[derive(Parser)]
pub struct Cli {
  #[clap(subcommand)]
  subcmd: SubCommand,

  #[clap(long, short, env = "SITE_FEEDS_CONFIG")]
  config: PathBuf,
}

#[derive(Parser)]
enum SubCommand {
  Server(ServerConfig),
  Test(TestConfig),
}

#[derive(Parser)]
struct TestConfig {
  /// The endpoint to test
  endpoint: String,
  /// Product names to include, comma separated
  #[clap(long, short, value_delimiter = ',')]
  products: Vec<String>,
  /// Include pre-release versions
  #[clap(long)]
  include_rc: bool,
  /// The page to generate a change feed for
  #[clap(long)]
  page: Option<String>,
  /// The base URL of the site, overrides the configured one
  #[clap(long)]
  base: Option<Url>,
  /// Whether to compact the XML output (opposite of pretty-print)
  #[clap(long, short)]
  compact_output: bool,
  /// Don't print XML output
  #[clap(long, short)]
  quiet: bool,
}

impl TestConfig {
  fn to_endpoint_param(&self, root_config: &RootConfig) -> EndpointParam {
    let base = self.base.clone().or_else(|| root_config.base_url.clone());
    let mut param = EndpointParam::new(base)
      .with_path(self.endpoint.clone())
      .with_products(self.products.clone())
      .with_include_rc(self.include_rc)
      .with_pretty_print(!self.compact_output);

    if let Some(page) = &self.page {
      param = param.with_page(page.clone());
    }
    param
  }
}

impl Cli {
  pub async fn run(self) -> anyhow::Result<()> {
    match self.subcmd {
      SubCommand::Server(server_config) => {
        server_config.run(&self.config).await
      }
      SubCommand::Test(test_config) => {
        let root_config = RootConfig::load_from_file(&self.config)
          .with_context(|| {
            format!("failed to load config {}", self.config.display())
          })?;
        test_endpoint(root_config, &test_config).await
      }
    }
  }
}

async fn test_endpoint(
  root_config: RootConfig,
  test_config: &TestConfig,
) -> anyhow::Result<()> {
  if root_config.get_endpoint(&test_config.endpoint).is_none() {
    let endpoints: Vec<_> =
      root_config.endpoints.iter().map(|e| e.path.clone()).collect();
    anyhow::bail!(
      "endpoint {} not found (available endpoints: {:?})",
      &test_config.endpoint,
      endpoints
    );
  }

  let endpoint_param = test_config.to_endpoint_param(&root_config);
  let feed_service = FeedService::try_from(root_config)?;
  let path = test_config.endpoint.trim_start_matches('/');
  let mut endpoint_service = feed_service
    .get_endpoint(path)
    .await
    .context("endpoint service not built")?;
  let outcome = endpoint_service.call(endpoint_param).await?;

  if !test_config.quiet {
    println!("{}", outcome.feed_xml());
  }
  Ok(())
}
