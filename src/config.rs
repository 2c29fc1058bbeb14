//! Global configuration for scout402
//!
//! Settings come from three places, highest precedence first:
//! - CLI flags
//! - Environment variables (each flag has one)
//! - A `--config` JSON file, or the same JSON given inline
//!
//! Secrets, the news URL and the payout addresses stay optional here. When
//! one is missing the pipeline or the server reports it as a structured
//! result rather than failing startup.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::logging::LogFormat;
use crate::pipeline::Credentials;
use crate::x402::{MoneyAmount, Recipients};

pub const DEFAULT_FACILITATOR_URL: &str = "https://x402.org/facilitator";

/// Default reqwest timeout for model and facilitator calls, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

// ============================================================================
// Configuration Arguments
// ============================================================================

#[derive(Args, Clone, Debug, Default)]
pub struct ConfigArgs {
    /// Configuration file (JSON file path or JSON string)
    ///
    /// - A file path: --config scout402.json
    ///
    /// - Inline JSON: --config '{"news_mcp_url":"https://news.example/mcp"}'
    ///
    #[arg(long = "config", short = 'c', env = "SCOUT402_CONFIG", value_name = "file.json or {json}")]
    pub config: Option<String>,

    /// OpenAI API key used for the model call
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// EVM private key paying for news (hex, or @filename)
    #[arg(long, env = "EVM_PRIVATE_KEY", hide_env_values = true)]
    pub evm_private_key: Option<String>,

    /// Solana secret key paying for news (base58 or JSON byte array, or @filename)
    #[arg(long, env = "SOLANA_PRIVATE_KEY", hide_env_values = true)]
    pub solana_private_key: Option<String>,

    /// Streamable-HTTP MCP endpoint of the paid news provider
    #[arg(long, env = "NEWS_MCP_URL", value_name = "http(s)://...")]
    pub news_mcp_url: Option<String>,

    /// Refuse to pay more than this many USD for a single news call
    #[arg(long, env = "SCOUT402_MAX_PAYMENT", value_name = "USD")]
    pub max_payment: Option<String>,

    /// EVM address receiving payments for the served tool
    #[arg(long, env = "EVM_PAY_TO")]
    pub evm_pay_to: Option<String>,

    /// Solana address receiving payments for the served tool
    #[arg(long, env = "SOLANA_PAY_TO")]
    pub solana_pay_to: Option<String>,

    /// Accept payments on base-sepolia / solana-devnet instead of mainnets
    #[arg(long, env = "X402_TESTNET")]
    pub testnet: bool,

    /// x402 facilitator URL
    ///
    /// Defaults to https://x402.org/facilitator
    ///
    #[arg(long = "facilitator-url", short = 'f', env = "X402_FACILITATOR_URL", value_name = "http(s)://...")]
    pub facilitator_url: Option<String>,

    /// Timeout for model and facilitator requests, in seconds
    #[arg(long, env = "SCOUT402_REQUEST_TIMEOUT", value_name = "SECS")]
    pub request_timeout: Option<u64>,

    // -------------------------------------------------------------------------
    // Logging/Tracing Options
    // -------------------------------------------------------------------------

    /// Enable verbose output (INFO level logging)
    ///
    /// Default is WARN level. Use -v for INFO, -d for DEBUG.
    ///
    #[arg(short = 'v', long, env = "SCOUT402_VERBOSE")]
    pub verbose: bool,

    /// Enable debug output (DEBUG level logging)
    #[arg(short = 'd', long, env = "SCOUT402_DEBUG", conflicts_with = "verbose")]
    pub debug: bool,

    /// Quiet mode - only show errors
    #[arg(short = 'q', long, conflicts_with_all = ["verbose", "debug"])]
    pub quiet: bool,

    /// Silent mode - suppress all terminal log output
    ///
    /// Log file output (if configured) is unaffected.
    ///
    #[arg(long, short = 's', conflicts_with_all = ["verbose", "debug", "quiet"])]
    pub silent: bool,

    /// Log output format
    #[arg(long, short = 'L', value_enum, env = "SCOUT402_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,

    /// Write debug logs to file
    #[arg(long, short = 'l', env = "SCOUT402_LOG_FILE", value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

// ============================================================================
// Global Configuration
// ============================================================================

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub openai_api_key: Option<String>,
    pub evm_private_key: Option<String>,
    pub solana_private_key: Option<String>,

    pub news_mcp_url: Option<String>,

    /// Per-call payment ceiling in USD (e.g. "0.10")
    pub max_payment_usd: Option<String>,

    // Served tool
    pub evm_pay_to: Option<String>,
    pub solana_pay_to: Option<String>,
    pub testnet: bool,
    pub facilitator_url: Option<String>,

    /// Total request timeout in seconds
    pub request_timeout: Option<u64>,

    pub verbose: bool,
    pub debug: bool,
    pub quiet: bool,
    pub silent: bool,
    pub log_format: LogFormat,
    pub log_file: Option<PathBuf>,
}

impl std::fmt::Debug for GlobalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalConfig")
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "<redacted>"))
            .field("evm_private_key", &self.evm_private_key.as_ref().map(|_| "<redacted>"))
            .field("solana_private_key", &self.solana_private_key.as_ref().map(|_| "<redacted>"))
            .field("news_mcp_url", &self.news_mcp_url)
            .field("max_payment_usd", &self.max_payment_usd)
            .field("evm_pay_to", &self.evm_pay_to)
            .field("solana_pay_to", &self.solana_pay_to)
            .field("testnet", &self.testnet)
            .field("facilitator_url", &self.facilitator_url)
            .field("request_timeout", &self.request_timeout)
            .field("log_format", &self.log_format)
            .field("log_file", &self.log_file)
            .finish()
    }
}

impl GlobalConfig {
    /// Load the file config and apply CLI/env overrides
    pub fn from_args(args: &ConfigArgs) -> Result<Self> {
        let mut global = match &args.config {
            Some(input) => {
                let json = load_json_string(input)?;
                serde_json::from_str(&json).context("Failed to parse config JSON")?
            }
            None => GlobalConfig::default(),
        };

        global.merge_args(args)?;
        Ok(global)
    }

    fn merge_args(&mut self, args: &ConfigArgs) -> Result<()> {
        fn set(target: &mut Option<String>, value: &Option<String>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }

        set(&mut self.openai_api_key, &args.openai_api_key);
        set(&mut self.evm_private_key, &args.evm_private_key);
        set(&mut self.solana_private_key, &args.solana_private_key);
        set(&mut self.news_mcp_url, &args.news_mcp_url);
        set(&mut self.max_payment_usd, &args.max_payment);
        set(&mut self.evm_pay_to, &args.evm_pay_to);
        set(&mut self.solana_pay_to, &args.solana_pay_to);
        set(&mut self.facilitator_url, &args.facilitator_url);

        // @filename secrets are read once here
        for secret in [&mut self.evm_private_key, &mut self.solana_private_key] {
            if let Some(value) = secret.take() {
                *secret = Some(resolve_secret(&value)?);
            }
        }

        if args.testnet {
            self.testnet = true;
        }
        if let Some(timeout) = args.request_timeout {
            self.request_timeout = Some(timeout);
        }

        if args.verbose {
            self.verbose = true;
        }
        if args.debug {
            self.debug = true;
        }
        if args.quiet {
            self.quiet = true;
        }
        if args.silent {
            self.silent = true;
        }
        if let Some(format) = &args.log_format {
            self.log_format = format.clone();
        }
        if let Some(log_file) = &args.log_file {
            self.log_file = Some(log_file.clone());
        }

        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            openai_api_key: self.openai_api_key.clone(),
            evm_private_key: self.evm_private_key.clone(),
            solana_private_key: self.solana_private_key.clone(),
        }
    }

    pub fn recipients(&self) -> Recipients {
        Recipients {
            evm_pay_to: self.evm_pay_to.clone(),
            solana_pay_to: self.solana_pay_to.clone(),
            testnet: self.testnet,
        }
    }

    /// `None` when unset or unparseable; the pipeline reports it per call
    pub fn news_mcp_url(&self) -> Option<Url> {
        let raw = self.news_mcp_url.as_deref()?;
        match Url::parse(raw) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!("Ignoring invalid NEWS_MCP_URL '{}': {}", raw, e);
                None
            }
        }
    }

    pub fn facilitator_url(&self) -> &str {
        self.facilitator_url.as_deref().unwrap_or(DEFAULT_FACILITATOR_URL)
    }

    pub fn max_payment(&self) -> Result<Option<MoneyAmount>> {
        self.max_payment_usd
            .as_deref()
            .map(|raw| {
                raw.parse::<MoneyAmount>()
                    .map_err(|e| anyhow::anyhow!("Invalid max payment '{}': {}", raw, e))
            })
            .transpose()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    /// Call once, early, after the config is fully merged
    pub fn init_tracing(&self) {
        crate::logging::init_tracing(crate::logging::TracingConfig {
            verbose: self.verbose,
            debug: self.debug,
            quiet: self.quiet,
            silent: self.silent,
            format: self.log_format.clone(),
            log_file: self.log_file.clone(),
        });
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Inline JSON if it looks like JSON, otherwise the contents of that file
fn load_json_string(input: &str) -> Result<String> {
    if input.trim_start().starts_with('{') {
        return Ok(input.to_string());
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read config file '{}'", input))
}

/// `@path` reads the secret from a file; anything else is the secret itself
fn resolve_secret(value: &str) -> Result<String> {
    match value.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key from file '{}'", path))?
            .trim()
            .to_string()),
        None => Ok(value.to_string()),
    }
}
