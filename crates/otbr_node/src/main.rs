//! OTBR Node CLI
//!
//! Runs the border router startup sequence on a host, with the host network
//! as the backbone and a simulated Thread stack.
//!
//! ## Usage
//!
//! ```bash
//! # Saved dataset, or wait for provisioning on the console
//! otbr-node
//!
//! # Form a new network on channel 20
//! otbr-node --auto-start --channel 20
//!
//! # Settings from a file, backbone restricted to one interface
//! otbr-node --config otbr.json --interface eth0
//! ```

use clap::Parser;
use otbr_node::{
    open_store, BorderRouter, Components, Config, Error, HostBackbone, HostPlatform,
    MdnsSdResponder, Result, SimulatedThreadStack, StorageBackendType,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Standalone Thread border router node
#[derive(Parser, Debug)]
#[command(name = "otbr-node")]
#[command(version)]
#[command(about = "Thread border router on a Wi-Fi backbone", long_about = None)]
struct Args {
    /// JSON configuration file (defaults to the OTBR_* environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Device name, also the mDNS hostname
    #[arg(short = 'n', long)]
    device_name: Option<String>,

    /// Backbone interface (first non-loopback IPv4 interface if omitted)
    #[arg(short, long)]
    interface: Option<String>,

    /// Create a network when no dataset is stored
    #[arg(long)]
    auto_start: bool,

    /// Channel for a created network
    #[arg(long)]
    channel: Option<u8>,

    /// Name for a created network
    #[arg(long)]
    network_name: Option<String>,

    /// Active dataset as a hex TLV string
    #[arg(long)]
    dataset: Option<String>,

    /// Settings database path
    #[arg(long)]
    storage: Option<String>,

    /// Keep settings in memory only
    #[arg(long, conflicts_with = "storage")]
    ephemeral: bool,

    /// Serve the OpenThread console on stdin/stdout
    #[arg(long)]
    console: bool,

    /// Disable the OpenThread console
    #[arg(long, conflicts_with = "console")]
    no_console: bool,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env(),
    };

    if let Some(name) = &args.device_name {
        config.device.name = name.clone();
    }
    if args.auto_start {
        config.thread.auto_start = true;
    }
    if let Some(channel) = args.channel {
        config.thread.channel = channel;
    }
    if let Some(name) = &args.network_name {
        config.thread.network_name = name.clone();
    }
    if let Some(tlvs) = &args.dataset {
        config.thread.dataset_tlvs = tlvs.clone();
    }
    if let Some(path) = &args.storage {
        config.storage.backend = StorageBackendType::Sqlite;
        config.storage.path = path.clone();
    }
    if args.ephemeral {
        config.storage.backend = StorageBackendType::Memory;
    }
    if args.console {
        config.thread.cli_enabled = true;
    } else if args.no_console {
        config.thread.cli_enabled = false;
    }
    Ok(config)
}

fn run(config: Config, interface: Option<String>) -> Result<()> {
    let store = open_store(&config.storage)?;
    let components = Components {
        store: store.clone(),
        backbone: Box::new(HostBackbone::new(interface)),
        responder: Box::new(MdnsSdResponder::new()),
        platform: Arc::new(HostPlatform::new()),
        stack: SimulatedThreadStack::new(store),
    };

    let mut router = BorderRouter::new(config, components)?;
    let mesh = router.start()?;
    let source = mesh.join()?;
    log::info!("Thread main loop finished ({} dataset)", source);
    Ok(())
}

fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };

    // Initialize logging
    let log_level = match args.verbose {
        0 => config.log_level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    log::info!("otbr-node {}", otbr_node::VERSION);

    if let Err(e) = run(config, args.interface.clone()) {
        log::error!("[{}] {}", e.code(), e);
        let status = match e {
            Error::Config(_) => 2,
            _ if e.is_fatal() => 1,
            _ => 3,
        };
        std::process::exit(status);
    }
}
