use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam::channel;
use jka_listener::capture::list_interfaces;
use jka_listener::config::{DEFAULT_READ_TIMEOUT_MS, DEFAULT_SNAPLEN};
use jka_listener::{ChannelSink, Direction, Listener, ListenerConfig, RawPacket, StatsSnapshot};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::thread;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(name = "jka-listener")]
#[command(about = "Passively observe the UDP traffic of one game server")]
#[command(version)]
struct Args {
    /// Verbose logging (default: false)
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture live traffic until Ctrl+C
    Listen {
        /// Server IP address
        #[arg(short, long)]
        server: IpAddr,

        /// Server UDP port
        #[arg(short, long, default_value = "29070")]
        port: u16,

        /// Capture device (default: system default device)
        #[arg(short, long)]
        interface: Option<String>,

        /// Bytes captured per frame
        #[arg(long, default_value_t = DEFAULT_SNAPLEN)]
        snaplen: i32,

        /// Do not put the interface into promiscuous mode
        #[arg(long)]
        no_promisc: bool,

        /// Read timeout in milliseconds
        #[arg(long, default_value_t = DEFAULT_READ_TIMEOUT_MS, value_parser = clap::value_parser!(i32).range(1..))]
        timeout_ms: i32,
    },
    /// Classify the traffic stored in a PCAP file
    Replay {
        /// Path to PCAP file
        #[arg(short, long)]
        file: PathBuf,

        /// Server IP address
        #[arg(short, long)]
        server: IpAddr,

        /// Server UDP port
        #[arg(short, long, default_value = "29070")]
        port: u16,
    },
    /// List capture devices
    Interfaces,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let log_level = if args.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match args.command {
        Commands::Listen { server, port, interface, snaplen, no_promisc, timeout_ms } => {
            let mut config = ListenerConfig::new(SocketAddr::new(server, port));
            config.device = interface;
            config.snaplen = snaplen;
            config.promiscuous = !no_promisc;
            config.read_timeout_ms = timeout_ms;

            info!("Starting live capture for {}", config.server);
            let (sink, consumer) = spawn_consumer();
            let listener = Listener::open(&config, sink).context("Failed to set up live capture")?;

            let stop = listener.stop_handle();
            tokio::spawn(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                    return;
                }
                info!("Received Ctrl+C, shutting down...");
                stop.stop();
            });

            let clean = listener.start()?.await.context("Capture task panicked")?;
            finish(clean, listener.stats(), consumer)?;
        }
        Commands::Replay { file, server, port } => {
            let server = SocketAddr::new(server, port);
            info!("Replaying {} for {}", file.display(), server);

            let (sink, consumer) = spawn_consumer();
            let listener = Listener::open_file(&file, server, sink)
                .with_context(|| format!("Failed to open capture file {}", file.display()))?;

            let clean = listener.start()?.await.context("Capture task panicked")?;
            finish(clean, listener.stats(), consumer)?;
        }
        Commands::Interfaces => {
            for interface in list_interfaces()? {
                let addresses: Vec<String> = interface.addresses.iter().map(|a| a.to_string()).collect();
                println!(
                    "{:<20} {:<40} {}",
                    interface.name,
                    interface.description.unwrap_or_default(),
                    addresses.join(", ")
                );
            }
        }
    }

    Ok(())
}

/// Consumer thread standing in for the protocol stack: logs every packet
fn spawn_consumer() -> (ChannelSink, thread::JoinHandle<u64>) {
    let (sender, receiver) = channel::unbounded::<(Direction, RawPacket)>();

    let handle = thread::spawn(move || {
        let mut count = 0u64;
        for (direction, packet) in receiver {
            count += 1;
            debug!(
                "#{} {} {} -> {} ({} bytes) at {:.6}",
                count,
                direction_label(direction),
                packet.source,
                packet.destination,
                packet.payload.len(),
                packet.timestamp
            );
        }
        count
    });

    (ChannelSink::new(sender), handle)
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::FromClient => "client -> server",
        Direction::FromServer => "server -> client",
        Direction::NotRelated => "unrelated",
    }
}

fn finish(clean: bool, stats: StatsSnapshot, consumer: thread::JoinHandle<u64>) -> Result<()> {
    // The sink was dropped with the capture loop, so the consumer drains and exits
    let consumed = consumer
        .join()
        .map_err(|_| anyhow::anyhow!("Packet consumer thread panicked"))?;

    println!("\n=== Capture Statistics ===");
    println!("Frames seen:       {}", stats.frames);
    println!("Client packets:    {} ({} bytes)", stats.client_packets, stats.client_bytes);
    println!("Server packets:    {} ({} bytes)", stats.server_packets, stats.server_bytes);
    println!("Dropped frames:    {} malformed, {} unrelated", stats.malformed, stats.unrelated);
    println!("Consumed packets:  {}", consumed);

    if !clean {
        return Err(anyhow::anyhow!("Capture loop ended with a read error"));
    }
    Ok(())
}
