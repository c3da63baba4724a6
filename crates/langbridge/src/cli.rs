//! Command-line interface handling for the langbridge host.

use clap::{Arg, Command};
use langbridge_loader::Dist;
use std::path::PathBuf;

/// Command line arguments parsed from user input.
///
/// Every option except the config path overrides the matching setting from
/// the configuration file.
#[derive(Debug, Clone)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the running side
    pub dist: Option<Dist>,
    /// Optional override for log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Whether to force concurrent stage dispatch
    pub parallel: bool,
}

impl CliArgs {
    /// Parses command line arguments using clap.
    pub fn parse() -> Self {
        Self::from_matches(Self::command().get_matches())
    }

    fn command() -> Command {
        Command::new("langbridge")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Runs configured mods through the loading stages")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("langbridge.toml"),
            )
            .arg(
                Arg::new("dist")
                    .short('d')
                    .long("dist")
                    .value_name("SIDE")
                    .help("Side to run as")
                    .value_parser(["client", "dedicated_server"]),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("parallel")
                    .long("parallel")
                    .help("Dispatch each stage to all mods concurrently")
                    .action(clap::ArgAction::SetTrue),
            )
    }

    fn from_matches(matches: clap::ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("langbridge.toml")),
            dist: matches
                .get_one::<String>("dist")
                .map(|side| match side.as_str() {
                    "dedicated_server" => Dist::DedicatedServer,
                    _ => Dist::Client,
                }),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            parallel: matches.get_flag("parallel"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::from_matches(CliArgs::command().get_matches_from(args))
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["langbridge"]);
        assert_eq!(args.config_path, PathBuf::from("langbridge.toml"));
        assert_eq!(args.dist, None);
        assert_eq!(args.log_level, None);
        assert!(!args.json_logs);
        assert!(!args.parallel);
    }

    #[test]
    fn test_overrides() {
        let args = parse(&[
            "langbridge",
            "-c",
            "mods.toml",
            "--dist",
            "dedicated_server",
            "-l",
            "debug",
            "--json-logs",
            "--parallel",
        ]);
        assert_eq!(args.config_path, PathBuf::from("mods.toml"));
        assert_eq!(args.dist, Some(Dist::DedicatedServer));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.json_logs);
        assert!(args.parallel);
    }

    #[test]
    fn test_unknown_dist_is_rejected() {
        let result = CliArgs::command().try_get_matches_from(["langbridge", "--dist", "server"]);
        assert!(result.is_err());
    }
}
