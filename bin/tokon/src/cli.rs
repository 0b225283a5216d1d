use clap::{Parser, Subcommand};
use tokon_deploy::TOKON_CONFIG_FILENAME;
use tracing::level_filters::LevelFilter;

/// Output format for the status command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum StatusFormat {
    Table,
    Json,
}

#[derive(Parser)]
#[command(name = "tokon")]
#[command(
    author,
    version,
    about = "Deploy and wire the TOKON contract suite across networks"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "TOKON_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the orchestrator configuration file, or a directory
    /// containing Tokon.toml.
    #[arg(short, long, alias = "conf", env = "TOKON_CONFIG", default_value = TOKON_CONFIG_FILENAME)]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the dependency-ordered deployment plan without touching any
    /// network.
    Plan,

    /// Deploy the suite to a network, resuming any prior partial run.
    Deploy {
        /// Target network, as named in the configuration.
        #[arg(short, long, env = "TOKON_NETWORK", default_value = "localhost")]
        network: String,

        /// Discard the network's recorded state and deploy from scratch.
        ///
        /// Without this flag, already-deployed artifacts are never
        /// redeployed.
        #[arg(long, default_value_t = false)]
        reset: bool,

        /// Skip the descriptor export at the end of the run.
        #[arg(long, default_value_t = false)]
        no_export: bool,
    },

    /// Show the recorded deployment state for a network.
    Status {
        /// Target network, as named in the configuration.
        #[arg(short, long, env = "TOKON_NETWORK", default_value = "localhost")]
        network: String,

        /// Also query the network for the account balance and the estimated
        /// cost of the remaining creations.
        #[arg(long, default_value_t = false)]
        probe: bool,

        /// Output format.
        #[arg(long, default_value_t = StatusFormat::Table)]
        format: StatusFormat,
    },

    /// Export interface descriptors and the address manifest for a network.
    Export {
        /// Target network, as named in the configuration.
        #[arg(short, long, env = "TOKON_NETWORK", default_value = "localhost")]
        network: String,
    },
}
