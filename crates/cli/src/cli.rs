use clap::{Parser, Subcommand};

/// Carbon-aware batch scheduler.
///
/// Plans processing of newly arrived files around the forecast renewable
/// peak and runs them through the transfer, unpack and decode stages.
#[derive(Parser, Debug)]
#[command(name = "greenbatch", version, about = "Carbon-aware batch scheduler")]
pub struct CliArgs {
    /// Config profile; `{PROFILE}_{KEY}` env vars override `{KEY}`.
    #[arg(long, env = "GREENBATCH_PROFILE")]
    pub profile: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Discover pending files and create one task queue.
    Schedule,

    /// Run task queues whose start time has passed.
    Execute {
        /// Run every queue with unpopped entries regardless of start time.
        #[arg(long)]
        instantly: bool,

        /// Keep waiting on stages past their timeout for a few extra polls.
        #[arg(long)]
        ignore_timeout: bool,
    },

    /// Sync stored pod records with the container runtime.
    Reconcile,

    /// Empty both buckets and delete all tracked state.
    Reset {
        /// Skip the confirmation guard.
        #[arg(long)]
        yes: bool,
    },

    /// Schedule and execute until nothing is pending, resetting on failure.
    Gather {
        /// Upper bound on schedule/execute cycles.
        #[arg(long, default_value_t = 100)]
        max_cycles: u32,
    },

    /// Run the periodic schedule, execute and reconcile loops.
    Daemon,

    /// Print tracked state counts and the active config as JSON.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_flags_parse() {
        let args = CliArgs::try_parse_from(["greenbatch", "execute", "--instantly", "--ignore-timeout"]).unwrap();
        assert_eq!(
            args.command,
            Command::Execute {
                instantly: true,
                ignore_timeout: true
            }
        );
    }

    #[test]
    fn gather_defaults_cycles() {
        let args = CliArgs::try_parse_from(["greenbatch", "gather"]).unwrap();
        assert_eq!(args.command, Command::Gather { max_cycles: 100 });
    }

    #[test]
    fn missing_subcommand_is_an_error() {
        assert!(CliArgs::try_parse_from(["greenbatch"]).is_err());
    }
}
