mod cli;

use clap::Parser;
use cli::{Cli, Command, PluginsCommand};
use jn_core::Role;
use jn_engine::{EngineError, Runtime, RuntimeConfig};

const ALL_ROLES: [Role; 4] = [Role::Format, Role::Protocol, Role::Filter, Role::Compression];

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    jn_engine::logging::init(cli.quiet);

    let mut config = RuntimeConfig::from_env();
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if cli.strict_discovery {
        config.strict_discovery = true;
    }

    let exit_code = match run(cli, config).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            e.exit_code()
        }
    };
    std::process::exit(exit_code);
}

async fn run(cli: Cli, config: RuntimeConfig) -> Result<(), EngineError> {
    match cli.command {
        Command::Get(args) => {
            let runtime = Runtime::bootstrap(config).await?;
            runtime.get(&args.address).await?;
            Ok(())
        }
        Command::Put(args) => {
            let runtime = Runtime::bootstrap(config).await?;
            runtime.put(&args.address).await?;
            Ok(())
        }
        Command::Inspect(args) => {
            let runtime = Runtime::bootstrap(config).await?;
            let address = runtime.inspect(&args.address)?;
            println!("{}", serde_json::to_string_pretty(&inspect_view(&address)).unwrap());
            Ok(())
        }
        Command::Plugins(PluginsCommand::List { role }) => {
            let runtime = Runtime::bootstrap(config).await?;
            let roles: Vec<Role> = match role {
                Some(r) => vec![r.into()],
                None => ALL_ROLES.to_vec(),
            };
            for role in roles {
                for plugin in runtime.plugins(role) {
                    println!(
                        "{:<10} {:<12} v{:<8} tier={:?} matches={:?}",
                        role.as_str(),
                        plugin.name,
                        plugin.version,
                        plugin.tier,
                        plugin.matches.iter().map(|m| m.pattern.as_str()).collect::<Vec<_>>()
                    );
                }
            }
            Ok(())
        }
        Command::Plugins(PluginsCommand::Rescan) => {
            let mut runtime = Runtime::bootstrap(config).await?;
            runtime.rescan().await?;
            println!("rescanned, {} plugins discovered", runtime.registry.len());
            Ok(())
        }
    }
}

fn inspect_view(address: &jn_core::Address) -> serde_json::Value {
    serde_json::json!({
        "raw": address.raw,
        "kind": format!("{:?}", address.kind),
        "protocol": address.protocol,
        "path": address.path,
        "format_hint": address.format_hint,
        "compression": address.compression.iter().map(|c| c.suffix()).collect::<Vec<_>>(),
        "parameters": address.parameters.iter().map(|p| serde_json::json!({
            "key": p.key, "op": p.op.as_str(), "value": p.value,
        })).collect::<Vec<_>>(),
        "is_glob": address.is_glob,
    })
}
