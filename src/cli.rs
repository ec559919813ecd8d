//! Command-line interface. Flags override config-file values, which
//! override environment variables and defaults.

use clap::{Args, Parser, Subcommand};

use crate::config::{ConfigError, SpiderConfig};
use crate::frontier::FrontierOrder;
use crate::url_utils;

#[derive(Parser, Debug)]
#[command(
    name = "webwarden",
    version,
    about = "Policy-aware web crawler for single-domain audits"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Crawl a site and write a JSON report
    Crawl(CrawlArgs),

    /// Write a default configuration file to edit and reuse
    InitConfig {
        /// Where to write the configuration
        #[arg(short, long, default_value = "webwarden.json")]
        output: String,
    },
}

#[derive(Args, Debug)]
pub struct CrawlArgs {
    /// Start URL (bare domains get an https:// prefix)
    pub url: Option<String>,

    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Maximum link depth from the start URL
    #[arg(short = 'd', long)]
    pub max_depth: Option<u32>,

    /// Maximum number of pages to crawl
    #[arg(short = 'p', long)]
    pub max_pages: Option<usize>,

    /// User-Agent header for all requests
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Connect timeout in seconds
    #[arg(long)]
    pub timeout_connect: Option<f64>,

    /// Read timeout in seconds
    #[arg(long)]
    pub timeout_read: Option<f64>,

    /// Retry budget per URL
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Per-domain request rate
    #[arg(short = 'r', long)]
    pub requests_per_second: Option<f64>,

    /// Token-bucket burst capacity
    #[arg(long)]
    pub burst_capacity: Option<u32>,

    /// Skip robots.txt checks (not recommended)
    #[arg(long)]
    pub ignore_robots: bool,

    /// Crawl auth-looking URLs instead of skipping them
    #[arg(long)]
    pub allow_auth_pages: bool,

    /// Serve shallower pages first instead of strict FIFO
    #[arg(long)]
    pub priority_order: bool,

    /// Write the JSON report here instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Also write JSON logs to this file
    #[arg(long)]
    pub log_file: Option<String>,
}

impl CrawlArgs {
    pub fn frontier_order(&self) -> FrontierOrder {
        if self.priority_order {
            FrontierOrder::Priority
        } else {
            FrontierOrder::Fifo
        }
    }

    /// Resolve the final configuration: file or environment base, then
    /// flag overrides, then validation.
    pub fn into_config(self) -> Result<SpiderConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => SpiderConfig::from_file(path)?,
            None => SpiderConfig::from_env(),
        };

        if let Some(url) = self.url {
            config.start_url = url_utils::normalize_url_for_cli(&url);
        }
        if let Some(depth) = self.max_depth {
            config.max_depth = depth;
        }
        if let Some(pages) = self.max_pages {
            config.max_pages = pages;
        }
        if let Some(agent) = self.user_agent {
            config.user_agent = agent;
        }
        if let Some(timeout) = self.timeout_connect {
            config.timeout_connect_secs = timeout;
        }
        if let Some(timeout) = self.timeout_read {
            config.timeout_read_secs = timeout;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(rate) = self.requests_per_second {
            config.requests_per_second = rate;
        }
        if let Some(burst) = self.burst_capacity {
            config.burst_capacity = burst;
        }
        if self.ignore_robots {
            config.respect_robots_txt = false;
        }
        if self.allow_auth_pages {
            config.avoid_auth_pages = false;
        }
        if let Some(output) = self.output {
            config.output_file = Some(output);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if let Some(file) = self.log_file {
            config.log_file = Some(file);
        }

        config.validate()?;
        Ok(config)
    }
}
