//! Command line arguments.

use std::time::Duration;

use cinder_client::{ClientConfig, Passphrase, Ttl, transport::TransportConfig};
use clap::{Parser, Subcommand};

/// Burn-after-read encrypted notes
#[derive(Parser, Debug)]
#[command(name = "cinder")]
#[command(about = "Create and read burn-after-read encrypted notes")]
#[command(version)]
pub struct Args {
    /// Note server address
    #[arg(short, long, default_value = "127.0.0.1:4433", global = true)]
    pub server: String,

    /// TLS server name expected from the server
    #[arg(long, default_value = "localhost", global = true)]
    pub server_name: String,

    /// Base URL of share links
    #[arg(long, default_value = "https://localhost", global = true)]
    pub share_base: String,

    /// Seconds to wait for each request
    #[arg(long, default_value = "10", global = true)]
    pub timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", global = true)]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What to do.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a note and print its share link
    Create {
        /// Note text; read from stdin when omitted
        text: Option<String>,

        /// Lifetime, e.g. 1h, 3h, 24h, 3d
        #[arg(short, long, default_value = "1h", value_parser = parse_ttl)]
        ttl: Ttl,

        /// Passphrase to seal with; one is issued by the server when omitted
        #[arg(long, value_parser = parse_passphrase)]
        secret: Option<Passphrase>,
    },

    /// Read a note once and decrypt it
    Read {
        /// Share link or bare note id
        link: String,

        /// Passphrase; prompted for on stdin when omitted
        #[arg(long, value_parser = parse_passphrase)]
        secret: Option<Passphrase>,

        /// Fetch attempts on transport failure
        #[arg(long, default_value = "3")]
        max_fetch_attempts: u32,
    },

    /// Print a freshly issued passphrase
    Key,
}

impl Args {
    /// Client settings derived from the arguments.
    pub fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig {
            api_addr: self.server.clone(),
            share_base_url: self.share_base.clone(),
            ..ClientConfig::default()
        };
        if let Command::Read { max_fetch_attempts, .. } = self.command {
            config.max_fetch_attempts = max_fetch_attempts;
        }
        config
    }

    /// Transport settings derived from the arguments.
    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            request_timeout: Duration::from_secs(self.timeout_secs),
            server_name: self.server_name.clone(),
            ..TransportConfig::development()
        }
    }
}

fn parse_ttl(text: &str) -> Result<Ttl, String> {
    Ttl::parse(text).map_err(|e| e.to_string())
}

fn parse_passphrase(text: &str) -> Result<Passphrase, String> {
    Passphrase::parse(text).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_defaults_to_one_hour() {
        let args = Args::try_parse_from(["cinder", "create", "hello"]).unwrap();
        match args.command {
            Command::Create { text, ttl, secret } => {
                assert_eq!(text.as_deref(), Some("hello"));
                assert_eq!(ttl, Ttl::ONE_HOUR);
                assert!(secret.is_none());
            },
            other => panic!("expected create, got {other:?}"),
        }
    }

    #[test]
    fn ttl_above_maximum_is_rejected() {
        assert!(Args::try_parse_from(["cinder", "create", "x", "--ttl", "4d"]).is_err());
        assert!(Args::try_parse_from(["cinder", "create", "x", "--ttl", "72h"]).is_ok());
    }

    #[test]
    fn bad_secret_is_rejected() {
        assert!(Args::try_parse_from(["cinder", "read", "abc", "--secret", "short"]).is_err());
    }

    #[test]
    fn global_options_feed_configs() {
        let args = Args::try_parse_from([
            "cinder",
            "read",
            "abc",
            "--server",
            "10.0.0.1:4433",
            "--share-base",
            "https://notes.example",
            "--max-fetch-attempts",
            "1",
            "--timeout-secs",
            "2",
        ])
        .unwrap();

        let client = args.client_config();
        assert_eq!(client.api_addr, "10.0.0.1:4433");
        assert_eq!(client.share_base_url, "https://notes.example");
        assert_eq!(client.max_fetch_attempts, 1);
        assert_eq!(args.transport_config().request_timeout, Duration::from_secs(2));
    }
}
