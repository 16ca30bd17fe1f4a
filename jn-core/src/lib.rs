//! Domain layer of the JN ETL substrate: pure types and algorithms for
//! addressing, profile merging, plugin matching, and pipeline assembly.
//! No I/O, no async runtime — see `jn-engine` for the infrastructure that
//! implements these as ports against the filesystem and child processes.

pub mod address;
pub mod error;
pub mod pipeline;
pub mod plugin;
pub mod profile;

pub use address::{Address, AddressKind, Compression, Op, Parameter, ProfileRef};
pub use error::CoreError;
pub use pipeline::{Pipeline, Stage, StageResult, StreamEndpoint};
pub use plugin::{CompiledMatch, Mode, PluginDescriptor, PluginMetadata, Registry, Role, Tier};
pub use profile::Profile;
