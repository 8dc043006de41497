//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::demo::Scenario;

/// batchrun: runs batch jobs through their lifecycle.
#[derive(Debug, Parser)]
#[command(name = "batchrun", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the configuration file (default: ./batchrun.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Permits available to the task executor.
    #[arg(long, global = true)]
    pub max_permits: Option<usize>,

    /// Enables debug logging.
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Demo scenarios accepted on the command line, mapped to [`Scenario`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ScenarioArg {
    Happy,
    ListenerFailure,
    StepFailure,
    Unrestartable,
    Stop,
    BrokenListener,
}

impl From<ScenarioArg> for Scenario {
    fn from(arg: ScenarioArg) -> Self {
        match arg {
            ScenarioArg::Happy => Scenario::Happy,
            ScenarioArg::ListenerFailure => Scenario::ListenerFailure,
            ScenarioArg::StepFailure => Scenario::StepFailure,
            ScenarioArg::Unrestartable => Scenario::Unrestartable,
            ScenarioArg::Stop => Scenario::Stop,
            ScenarioArg::BrokenListener => Scenario::BrokenListener,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs one of the built-in demo jobs.
    Demo {
        #[arg(long, value_enum, default_value_t = ScenarioArg::Happy)]
        scenario: ScenarioArg,

        /// Requests a stop this many milliseconds after the job started.
        #[arg(long)]
        stop_after_ms: Option<u64>,

        /// Prints the final execution record as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Lists the built-in demo scenarios.
    Scenarios,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_demo_defaults() {
        let cli = Cli::parse_from(["batchrun", "demo"]);
        match cli.command {
            Command::Demo {
                scenario,
                stop_after_ms,
                json,
            } => {
                assert_eq!(scenario, ScenarioArg::Happy);
                assert!(stop_after_ms.is_none());
                assert!(!json);
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn cli_parses_demo_options() {
        let cli = Cli::parse_from([
            "batchrun",
            "demo",
            "--scenario",
            "step-failure",
            "--stop-after-ms",
            "150",
            "--json",
        ]);
        match cli.command {
            Command::Demo {
                scenario,
                stop_after_ms,
                json,
            } => {
                assert_eq!(Scenario::from(scenario), Scenario::StepFailure);
                assert_eq!(stop_after_ms, Some(150));
                assert!(json);
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "batchrun",
            "--config",
            "/etc/batchrun.toml",
            "--max-permits",
            "4",
            "--verbose",
            "scenarios",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.max_permits, Some(4));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/batchrun.toml")));
        assert!(matches!(cli.command, Command::Scenarios));
    }

    #[test]
    fn every_scenario_has_an_argument() {
        for arg in ScenarioArg::value_variants() {
            let scenario = Scenario::from(*arg);
            let name = arg.to_possible_value().unwrap().get_name().to_string();
            assert_eq!(name, scenario.name());
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
