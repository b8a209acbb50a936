//! ovsdb-ctl
//!
//! Thin front end over `op-ovsdb`:
//! - database discovery (`list-dbs`, `schema`, `dump`)
//! - generic row insert/update/delete through the table registry
//! - `Open_vSwitch` bridge, port and manager helpers
//! - `hardware_vtep` logical switch, MAC and VLAN binding helpers

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use op_jsonrpc::{ClientConfig, OvsdbClient};
use op_ovsdb::monitor::MonitorRequestBuilder;
use op_ovsdb::prelude::*;

#[derive(Parser, Debug)]
#[command(name = "ovsdb-ctl")]
#[command(about = "Configure Open vSwitch and hardware VTEP databases over OVSDB")]
struct Args {
    /// OVSDB remote (unix:PATH or tcp:HOST:PORT); defaults to $OVSDB_REMOTE
    /// or the standard socket
    #[arg(long)]
    remote: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List databases served by the remote
    ListDbs,
    /// Print a database schema
    Schema { db: String },
    /// Print every row of a table
    Dump { db: String, table: String },
    /// Insert a row (JSON object in OVSDB notation), linking it to its parent
    Insert {
        db: String,
        table: String,
        row: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Overwrite columns of a row
    Update {
        db: String,
        table: String,
        uuid: String,
        row: String,
    },
    /// Delete a row, unlinking it from its parent
    Delete {
        db: String,
        table: String,
        uuid: String,
    },
    /// List bridge names
    ListBr,
    /// Add a bridge with its internal port
    AddBr { name: String },
    /// Delete a bridge
    DelBr { name: String },
    /// Add a port to a bridge
    AddPort {
        bridge: String,
        port: String,
        /// Access vlan tag
        #[arg(long, conflicts_with_all = ["tunnel_type", "patch"])]
        vlan: Option<u16>,
        /// Tunnel interface type (vxlan, gre, geneve)
        #[arg(long, requires = "remote_ip")]
        tunnel_type: Option<String>,
        #[arg(long)]
        remote_ip: Option<String>,
        /// Make the interface a patch port
        #[arg(long)]
        patch: bool,
        /// Interface option as KEY=VALUE, repeatable
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },
    /// Delete a port from a bridge
    DelPort { bridge: String, port: String },
    /// Add a manager target (ptcp:6640, tcp:IP:PORT)
    SetManager { target: String },
    /// Add a logical switch
    AddLs { name: String, vni: i64 },
    /// Delete a logical switch with its MAC entries and bindings
    DelLs { name: String },
    /// Bind a VLAN on a physical port to a logical switch
    BindLs {
        port: String,
        vlan: u16,
        ls: String,
        /// Create the logical switch with this VNI if it does not exist
        #[arg(long)]
        vni: Option<i64>,
        /// Flood unknown destinations to this VTEP address, repeatable
        #[arg(long = "flood-ip")]
        flood_ips: Vec<String>,
    },
    /// Remove the binding of a VLAN on a physical port
    UnbindLs { port: String, vlan: u16 },
    /// Remove every binding of a logical switch
    ClearBindings { ls: String },
    /// List (port, vlan) bindings of a logical switch
    ListBindings { ls: String },
    /// Add a port to a physical switch
    AddPsPort { switch: String, port: String },
    /// Add a remote unicast MAC
    AddUcastRemote {
        ls: String,
        mac: String,
        vtep_ip: String,
        #[arg(long)]
        mac_ip: Option<String>,
    },
    /// Delete remote unicast MACs
    DelUcastRemote {
        ls: String,
        mac: String,
        #[arg(long)]
        mac_ip: Option<String>,
    },
    /// Add a remote multicast MAC
    AddMcastRemote {
        ls: String,
        mac: String,
        vtep_ip: String,
    },
    /// Delete remote multicast MACs
    DelMcastRemote { ls: String, mac: String },
}

impl Commands {
    /// Database whose rows must be cached before the command runs
    fn database(&self) -> Option<Database> {
        match self {
            Commands::ListDbs
            | Commands::Schema { .. }
            | Commands::Dump { .. }
            | Commands::Insert { .. }
            | Commands::Update { .. }
            | Commands::Delete { .. } => None,
            Commands::ListBr
            | Commands::AddBr { .. }
            | Commands::DelBr { .. }
            | Commands::AddPort { .. }
            | Commands::DelPort { .. }
            | Commands::SetManager { .. } => Some(Database::OpenVSwitch),
            _ => Some(Database::HardwareVtep),
        }
    }
}

fn parse_option(text: &str) -> Result<(String, String)> {
    let Some((key, value)) = text.split_once('=') else {
        bail!("Option must be KEY=VALUE, got {}", text);
    };
    Ok((key.to_string(), value.to_string()))
}

fn port_kind(
    vlan: Option<u16>,
    tunnel_type: Option<String>,
    remote_ip: Option<String>,
    patch: bool,
) -> PortKind {
    match (vlan, tunnel_type, remote_ip) {
        (Some(tag), _, _) => PortKind::Vlan(tag),
        (None, Some(tunnel_type), Some(remote_ip)) => PortKind::Tunnel {
            tunnel_type,
            remote_ip,
        },
        _ if patch => PortKind::Patch,
        _ => PortKind::Plain,
    }
}

fn client_config(args: &Args) -> Result<ClientConfig> {
    let mut config = match &args.remote {
        Some(remote) => ClientConfig::new(remote.parse()?),
        None => ClientConfig::from_env()?,
    };
    if let Some(secs) = args.timeout {
        config = config.with_timeout(Duration::from_secs(secs));
    }
    Ok(config)
}

fn parse_row(text: &str) -> Result<Row> {
    serde_json::from_str(text).context("Row must be a JSON object of column values")
}

/// Fill `cache` with the current rows of every registered table the
/// server's schema actually has
async fn load_cache(client: &OvsdbClient, cache: &InMemoryCache, db: Database) -> Result<()> {
    let schema = client.get_schema(db.name()).await?;
    let mut request = MonitorRequestBuilder::new(db.name());
    for table in Table::tables_of(db) {
        if schema["tables"].get(table.name()).is_some() {
            request.monitor(table.name());
        } else {
            debug!("{} has no {} table", db, table);
        }
    }
    let session = client.monitor(&request).await?;
    cache.apply(db, session.initial());
    Ok(())
}

fn report(outcome: Outcome) -> Result<()> {
    if !outcome.is_success() {
        bail!("{}", outcome);
    }
    match outcome.uuid() {
        Some(uuid) => println!("{}", uuid),
        None => info!("{}", outcome),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ovsdb_ctl=info".parse()?)
                .add_directive("op_ovsdb=info".parse()?)
                .add_directive("op_jsonrpc=warn".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let client = Arc::new(OvsdbClient::with_config(client_config(&args)?));
    let cache = Arc::new(InMemoryCache::new());
    let service = ConfigService::new(client.clone(), cache.clone());

    match args.command {
        Commands::ListDbs => {
            for db in client.list_dbs().await? {
                println!("{}", db);
            }
        }
        Commands::Schema { db } => {
            let schema = client.get_schema(&db).await?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
        Commands::Dump { db, table } => {
            let db: Database = db.parse()?;
            let rows = client.select_rows(db, &table, vec![]).await?;
            for row in rows {
                println!("{}", serde_json::to_string(&row)?);
            }
        }
        Commands::Insert {
            db,
            table,
            row,
            parent,
        } => {
            let db: Database = db.parse()?;
            load_cache(&client, &cache, db).await?;
            report(
                service
                    .insert_row(db, &table, parent.as_deref(), parse_row(&row)?)
                    .await,
            )?;
        }
        Commands::Update {
            db,
            table,
            uuid,
            row,
        } => {
            let db: Database = db.parse()?;
            load_cache(&client, &cache, db).await?;
            report(service.update_row(db, &table, &uuid, parse_row(&row)?).await)?;
        }
        Commands::Delete { db, table, uuid } => {
            let db: Database = db.parse()?;
            load_cache(&client, &cache, db).await?;
            report(service.delete_row(db, &table, &uuid).await)?;
        }
        command => {
            if let Some(db) = command.database() {
                load_cache(&client, &cache, db).await?;
            }
            let outcome = match command {
                Commands::ListBr => {
                    for name in service.bridge_domains() {
                        println!("{}", name);
                    }
                    Outcome::success()
                }
                Commands::AddBr { name } => service.create_bridge_domain(&name).await,
                Commands::DelBr { name } => service.delete_bridge_domain(&name).await,
                Commands::AddPort {
                    bridge,
                    port,
                    vlan,
                    tunnel_type,
                    remote_ip,
                    patch,
                    options,
                } => {
                    let kind = port_kind(vlan, tunnel_type, remote_ip, patch);
                    let options: OvsMap<String, String> = options.into_iter().collect();
                    service.add_port(&bridge, &port, kind, options).await
                }
                Commands::DelPort { bridge, port } => service.delete_port(&bridge, &port).await,
                Commands::SetManager { target } => service.set_manager(&target).await,
                Commands::AddLs { name, vni } => service.vtep_add_logical_switch(&name, vni).await,
                Commands::DelLs { name } => service.vtep_delete_logical_switch(&name).await,
                Commands::BindLs {
                    port,
                    vlan,
                    ls,
                    vni,
                    flood_ips,
                } => {
                    let flood_ips: Vec<&str> = flood_ips.iter().map(String::as_str).collect();
                    service
                        .vtep_bind_vlan(&ls, &port, vlan, vni, &flood_ips)
                        .await
                }
                Commands::UnbindLs { port, vlan } => service.vtep_delete_binding(&port, vlan).await,
                Commands::ClearBindings { ls } => service.vtep_clear_bindings(&ls).await,
                Commands::ListBindings { ls } => {
                    let Some(uuid) = service.find_logical_switch(&ls) else {
                        bail!("No logical switch named {}", ls);
                    };
                    for binding in service.port_vlan_bindings(&uuid) {
                        println!("{} {}", binding.port, binding.vlan);
                    }
                    Outcome::success()
                }
                Commands::AddPsPort { switch, port } => {
                    service.vtep_add_physical_switch_port(&switch, &port).await
                }
                Commands::AddUcastRemote {
                    ls,
                    mac,
                    vtep_ip,
                    mac_ip,
                } => {
                    service
                        .vtep_add_ucast_mac_remote(&ls, &mac, &vtep_ip, mac_ip.as_deref())
                        .await
                }
                Commands::DelUcastRemote { ls, mac, mac_ip } => {
                    service
                        .vtep_delete_ucast_mac_remote(&ls, &mac, mac_ip.as_deref())
                        .await
                }
                Commands::AddMcastRemote { ls, mac, vtep_ip } => {
                    service.vtep_add_mcast_mac_remote(&ls, &mac, &vtep_ip).await
                }
                Commands::DelMcastRemote { ls, mac } => {
                    service.vtep_delete_mcast_mac_remote(&ls, &mac).await
                }
                other => bail!("Unhandled command {:?}", other),
            };
            report(outcome)?;
        }
    }

    Ok(())
}
