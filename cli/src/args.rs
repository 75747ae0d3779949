use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotroute_core::dispatch::DispatchConfig;
use dotroute_core::tree::{LoaderConfig, PAGE_SIZE};
use tracing::Level;

/// Loads a dot tree from a backing store and dispatches requests over it.
///
/// The tree is rebuilt from the backing store on every start; with the
/// default in-memory provider, `--seed` is the only way to get dots into it.
#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// A global log level to use when printing logs.
    /// It's also possible to set `RUST_LOG` according to
    /// `tracing_subscriber::filter::EnvFilter`, which will always have
    /// priority.
    #[arg(long, default_value_t=Level::INFO)]
    pub log_level: Level,

    /// Show progress bars while loading.
    #[arg(long)]
    pub progress: bool,

    /// Address of the backing store, e.g. `memory://?max_idle=4`.
    #[arg(long, env = "DOTROUTE_PROVIDER_ADDR", default_value = "memory://")]
    pub provider_addr: String,

    /// A JSON array of dots (`Id`, `ParentId`, `Name`, `Value`) written to a
    /// fresh dots table before loading.
    #[arg(long, env = "DOTROUTE_SEED")]
    pub seed: Option<PathBuf>,

    /// Data source holding the dots table.
    #[arg(long, env = "DOTROUTE_DOTS_SOURCE", default_value = "dots")]
    pub dots_source: String,

    #[arg(long, env = "DOTROUTE_DOTS_TABLE", default_value = "dots")]
    pub dots_table: String,

    /// Number of ids read per page while loading.
    #[arg(long, default_value_t = PAGE_SIZE)]
    pub page_size: u64,

    /// Maximum number of pages read concurrently.
    #[arg(long, default_value_t = 34)]
    pub max_wave: usize,

    #[arg(long, default_value_t = 100)]
    pub mailbox_capacity: usize,

    /// Seconds to wait for the outcome of a request.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Prints every dot as a JSON array.
    Dump,
    /// Lists every route with its dot's depth and subtree size.
    Routes,
    /// Issues one request and prints its outcome.
    Request {
        /// Route the request is headed for.
        target: String,

        /// Route the request enters at. Defaults to the first segment of the
        /// target.
        #[arg(long)]
        entry: Option<String>,

        /// A request parameter as `name=value`. May be repeated.
        #[arg(long = "param", short = 'p', value_parser = crate::parse_param)]
        params: Vec<(String, String)>,
    },
}

impl Args {
    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            source: self.dots_source.clone(),
            table: self.dots_table.clone(),
            page_size: self.page_size,
            max_wave: self.max_wave,
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            mailbox_capacity: self.mailbox_capacity,
            request_timeout: Duration::from_secs(self.timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use clap::Parser;

    use dotroute_core::tree::LoaderConfig;

    use super::{Args, Command};

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["dotroute", "routes"]).expect("parse");

        assert_eq!(Command::Routes, args.command);
        assert_eq!(LoaderConfig::default(), args.loader_config());
        assert_eq!(Duration::from_secs(30), args.dispatch_config().request_timeout);
    }

    #[test]
    fn request() {
        let args = Args::try_parse_from([
            "dotroute",
            "--page-size",
            "10",
            "request",
            "/a/b",
            "-p",
            "name=alice",
            "--param",
            "age=30",
        ])
        .expect("parse");

        assert_eq!(10, args.loader_config().page_size);
        assert_eq!(
            Command::Request {
                target: "/a/b".into(),
                entry: None,
                params: vec![
                    ("name".into(), "alice".into()),
                    ("age".into(), "30".into())
                ],
            },
            args.command
        );
    }

    #[test]
    fn malformed_param() {
        assert!(Args::try_parse_from(["dotroute", "request", "/a", "-p", "novalue"]).is_err());
    }
}
