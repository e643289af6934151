use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use wgmesh::{Client, Config, JsonStore, Mesh, Result};

#[derive(Parser)]
#[command(name = "wgmesh")]
#[command(author, version, about = "WireGuard address manager and config generator", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the server record and write the config file if needed
    Init,
    /// Rewrite the config file from stored records
    Regenerate {
        /// Run the configured reload command afterwards
        #[arg(long)]
        reload: bool,
    },
    ShowConfig,
    ShowServer,
    ListClients,
    AddClient {
        name: String,
        #[arg(long, default_value = "")]
        email: String,
        /// Tunnel addresses in CIDR form; allocated when omitted
        #[arg(long = "address", value_delimiter = ',')]
        addresses: Vec<String>,
        /// Routes for this peer; defaults to its tunnel addresses
        #[arg(long = "allowed-ip", value_delimiter = ',')]
        allowed_ips: Vec<String>,
        #[arg(long)]
        disabled: bool,
    },
    RemoveClient {
        id: String,
    },
    EnableClient {
        id: String,
    },
    DisableClient {
        id: String,
    },
    /// Print the config file a client installs on its side
    ClientConfig {
        id: String,
    },
    /// Print the next free address in a subnet without claiming it
    Allocate {
        subnet: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    let mut config = Config::load_or_create(&cli.config)?;
    config.apply_env_overrides();
    config.validate()?;

    if let Some(Commands::ShowConfig) = cli.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let config = Arc::new(config);
    let store = JsonStore::open(&config.records_file).await?;
    let mesh = Mesh::new(Arc::clone(&config), store);

    let server = mesh.get_or_create_server().await?;

    match cli.command.unwrap_or(Commands::Init) {
        Commands::Init => {
            info!("Server ready with config: {:?}", cli.config);
            println!("Public key: {}", server.public_key);
            println!("Addresses:  {}", server.address.join(", "));
            if let Some(path) = config.wg_config_path() {
                println!("Config:     {}", path.display());
            }
            Ok(())
        }
        Commands::Regenerate { reload } => {
            mesh.regenerate().await?;
            if reload {
                mesh.reload().await?;
            }
            Ok(())
        }
        Commands::ShowConfig => Ok(()),
        Commands::ShowServer => {
            println!("{}", serde_json::to_string_pretty(&server)?);
            Ok(())
        }
        Commands::ListClients => {
            let clients = mesh.list_clients().await?;

            if clients.is_empty() {
                println!("No clients.");
            } else {
                println!(
                    "{:<38} {:<20} {:<8} {:<40}",
                    "ID", "Name", "Enabled", "Addresses"
                );
                println!("{}", "-".repeat(108));

                for client in clients {
                    println!(
                        "{:<38} {:<20} {:<8} {:<40}",
                        client.id,
                        client.name,
                        if client.enable { "yes" } else { "no" },
                        client.address.join(", ")
                    );
                }
            }

            Ok(())
        }
        Commands::AddClient {
            name,
            email,
            addresses,
            allowed_ips,
            disabled,
        } => {
            let client = mesh
                .create_client(Client {
                    name,
                    email,
                    enable: !disabled,
                    address: addresses,
                    allowed_ips,
                    ..Default::default()
                })
                .await?;
            println!("{}", serde_json::to_string_pretty(&client)?);
            Ok(())
        }
        Commands::RemoveClient { id } => {
            mesh.delete_client(&id).await?;
            println!("Removed client {}.", id);
            Ok(())
        }
        Commands::EnableClient { id } => {
            mesh.set_client_enabled(&id, true).await?;
            println!("Enabled client {}.", id);
            Ok(())
        }
        Commands::DisableClient { id } => {
            mesh.set_client_enabled(&id, false).await?;
            println!("Disabled client {}.", id);
            Ok(())
        }
        Commands::ClientConfig { id } => {
            print!("{}", mesh.client_config(&id).await?);
            Ok(())
        }
        Commands::Allocate { subnet } => {
            println!("{}", mesh.allocate_address(&subnet).await?);
            Ok(())
        }
    }
}
