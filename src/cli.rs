use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Targets {
        #[command(subcommand)]
        command: TargetsCommand,
    },
    /// Fetch a target's landing page (or every target) through the proxy.
    Fetch(FetchArgs),
    /// Turn a fetched landing page into pending thread work items.
    Extract(TargetArgs),
    /// Run one scheduling pass over a target's pending work items.
    Scan(TargetArgs),
    Items {
        #[command(subcommand)]
        command: ItemsCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum TargetsCommand {
    Add(AddTargetArgs),
    List,
    Delete(TargetArgs),
    /// Severity counts of a target's work items.
    Summary(TargetArgs),
}

#[derive(Debug, Subcommand)]
pub enum ItemsCommand {
    List(TargetArgs),
    /// Put failed work items back to pending.
    Reset(TargetArgs),
}

#[derive(Debug, Args)]
pub struct AddTargetArgs {
    #[arg(long)]
    pub name: String,

    /// Forum landing page (http/https).
    #[arg(long)]
    pub url: String,

    #[arg(long, default_value = "")]
    pub description: String,
}

#[derive(Debug, Args)]
pub struct TargetArgs {
    pub target_id: String,
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub target_id: Option<String>,

    /// Fetch every registered target in turn.
    #[arg(long)]
    pub all: bool,
}

/// Flags that win over `CTISCAN_*` environment variables.
#[derive(Debug, Args)]
pub struct ConfigOverrides {
    /// SQLite database path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output directory for fetched documents and images.
    #[arg(long, global = true)]
    pub out: Option<PathBuf>,

    /// Directory for `log/scraper.log`.
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// SOCKS5 proxy address (host:port).
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Concurrent workers per batch; non-positive values fall back to the default.
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub batch_size: Option<i64>,

    /// Attempts per request.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Delay before each request attempt (politeness).
    #[arg(long, global = true)]
    pub delay_ms: Option<u64>,

    /// Headless browser binary used to render landing page images.
    #[arg(long, global = true)]
    pub renderer: Option<String>,

    /// YAML file replacing the built-in severity keyword tiers.
    #[arg(long, global = true)]
    pub severity_keywords: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(db) = &self.db {
            config.db_path = db.clone();
        }
        if let Some(out) = &self.out {
            config.output_dir = out.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = Some(dir.clone());
        }
        if let Some(proxy) = &self.proxy {
            config.tor_proxy = proxy.clone();
        }
        if self.batch_size.is_some() {
            config.batch_size = crate::config::batch_size_or_default(self.batch_size);
        }
        if let Some(max_retries) = self.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(delay_ms) = self.delay_ms {
            config.request_delay = std::time::Duration::from_millis(delay_ms);
        }
        if let Some(bin) = &self.renderer {
            config.renderer_bin = Some(bin.clone());
        }
        if let Some(path) = &self.severity_keywords {
            config.severity_keywords = Some(path.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::{Cli, Command, TargetsCommand};
    use crate::config::Config;

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "ctiscan",
            "scan",
            "abc",
            "--batch-size",
            "-2",
            "--db",
            "/tmp/x.db",
        ])
        .unwrap();
        let mut config = Config {
            batch_size: 4,
            ..Config::default()
        };
        cli.overrides.apply(&mut config);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.db_path, std::path::PathBuf::from("/tmp/x.db"));
        assert!(matches!(cli.command, Command::Scan(ref args) if args.target_id == "abc"));
    }

    #[test]
    fn fetch_needs_target_or_all() {
        assert!(Cli::try_parse_from(["ctiscan", "fetch"]).is_err());
        assert!(Cli::try_parse_from(["ctiscan", "fetch", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["ctiscan", "fetch", "abc", "--all"]).is_err());
    }

    #[test]
    fn parses_targets_add() {
        let cli = Cli::try_parse_from([
            "ctiscan", "targets", "add", "--name", "forum", "--url", "http://a.onion/",
        ])
        .unwrap();
        let Command::Targets {
            command: TargetsCommand::Add(args),
        } = cli.command
        else {
            panic!("expected targets add");
        };
        assert_eq!(args.name, "forum");
        assert_eq!(args.description, "");
    }
}
