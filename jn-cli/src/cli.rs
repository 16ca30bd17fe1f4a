use clap::{Args, Parser, Subcommand};
use jn_core::Role;

#[derive(Parser)]
#[command(name = "jn", about = "Agent-native ETL substrate: move records between addresses through composable plugins")]
pub struct Cli {
    /// Override the plugin discovery cache directory.
    #[arg(long, global = true, env = "JN_CACHE_DIR")]
    pub cache_dir: Option<std::path::PathBuf>,

    /// Disable executable self-describe; only embedded manifests are trusted.
    #[arg(long, global = true, env = "JN_STRICT_DISCOVERY")]
    pub strict_discovery: bool,

    /// Raise the default log filter from `info` to `warn`.
    #[arg(long, global = true, env = "JN_QUIET")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read records from an address, streaming NDJSON to stdout.
    Get(AddressArgs),

    /// Write NDJSON from stdin to an address.
    Put(AddressArgs),

    /// Show how an address would be parsed without running anything.
    Inspect(AddressArgs),

    /// Manage the plugin registry.
    #[command(subcommand)]
    Plugins(PluginsCommand),
}

#[derive(Args)]
pub struct AddressArgs {
    /// A JN address, e.g. `data.csv.gz`, `-~json`, `@myapi/users?role=admin`.
    pub address: String,
}

#[derive(Subcommand)]
pub enum PluginsCommand {
    /// List discovered plugins, optionally filtered by role.
    List {
        #[arg(long, value_enum)]
        role: Option<RoleArg>,
    },
    /// Discard the discovery cache and re-scan every search path.
    Rescan,
}

#[derive(Clone, Copy, clap::ValueEnum)]
pub enum RoleArg {
    Format,
    Protocol,
    Filter,
    Compression,
}

impl From<RoleArg> for Role {
    fn from(r: RoleArg) -> Self {
        match r {
            RoleArg::Format => Role::Format,
            RoleArg::Protocol => Role::Protocol,
            RoleArg::Filter => Role::Filter,
            RoleArg::Compression => Role::Compression,
        }
    }
}
