//! Castlink - Cast V2 Sender
//!
//! Controls Chromecast-class media receivers over the TLS cast channel.

mod config;
mod discovery;
mod media;
mod network;
mod protocol;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;
use media::MediaInformation;
use network::Connection;
use protocol::{
    CastMessage, DEFAULT_RECEIVER, NAMESPACE_HEARTBEAT, NAMESPACE_MEDIA, NAMESPACE_RECEIVER,
};

/// Castlink - Cast V2 sender
#[derive(Parser)]
#[command(name = "castlink")]
#[command(author = "Castlink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Control cast media receivers over TLS", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover cast devices on the network
    Discover {
        /// How long to scan (seconds)
        #[arg(short, long, default_value_t = 5)]
        timeout: u64,
    },

    /// Query receiver status, or player status of a running app session
    Status {
        /// Device address
        #[arg(short = 'H', long)]
        host: String,

        /// Control channel port
        #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
        port: u16,

        /// Transport id of an app session to query instead of the receiver
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Launch the media receiver app
    Launch {
        /// Device address
        #[arg(short = 'H', long)]
        host: String,

        /// Control channel port
        #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
        port: u16,

        /// Application id to launch
        #[arg(short, long, default_value = protocol::APP_ID)]
        app: String,
    },

    /// Load the local stream on a running app session
    Load {
        #[command(flatten)]
        target: MediaTarget,
    },

    /// Resume playback
    Play {
        #[command(flatten)]
        target: MediaTarget,

        /// Media session id (from `status -d`)
        #[arg(short, long)]
        session: i64,
    },

    /// Pause playback
    Pause {
        #[command(flatten)]
        target: MediaTarget,

        /// Media session id (from `status -d`)
        #[arg(short, long)]
        session: i64,
    },

    /// Stop playback
    Stop {
        #[command(flatten)]
        target: MediaTarget,

        /// Media session id (from `status -d`)
        #[arg(short, long)]
        session: i64,
    },

    /// Set the stream volume
    Volume {
        #[command(flatten)]
        target: MediaTarget,

        /// Media session id (from `status -d`)
        #[arg(short, long)]
        session: i64,

        /// Volume level in [0.0, 1.0]
        #[arg(short, long)]
        level: f64,

        /// Mute the stream
        #[arg(short, long)]
        muted: bool,
    },

    /// Seek to a position in the stream
    Seek {
        #[command(flatten)]
        target: MediaTarget,

        /// Media session id (from `status -d`)
        #[arg(short, long)]
        session: i64,

        /// Position in seconds
        #[arg(short = 't', long)]
        time: f64,
    },

    /// Exercise the heartbeat against a device
    Ping {
        /// Device address
        #[arg(short = 'H', long)]
        host: String,

        /// Control channel port
        #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
        port: u16,

        /// Number of heartbeat windows to run
        #[arg(short = 'n', long, default_value_t = 3)]
        count: u32,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

/// Addressing shared by every media-player command: the device and the
/// transport id of the app session on it.
#[derive(Args)]
struct MediaTarget {
    /// Device address
    #[arg(short = 'H', long)]
    host: String,

    /// Control channel port
    #[arg(short, long, default_value_t = protocol::DEFAULT_PORT)]
    port: u16,

    /// Transport id of the app session (from `status`)
    #[arg(short, long)]
    destination: String,
}

/// Session-scoped playback commands that differ only in their type tag
enum PlayerOp {
    Play,
    Pause,
    Stop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    match cli.command {
        Commands::Discover { timeout } => {
            run_discovery(timeout).await?;
        }
        Commands::Status {
            host,
            port,
            destination,
        } => {
            run_status(config, host, port, destination).await?;
        }
        Commands::Launch { host, port, app } => {
            run_launch(config, host, port, app).await?;
        }
        Commands::Load { target } => {
            run_load(config, target).await?;
        }
        Commands::Play { target, session } => {
            run_player(config, target, session, PlayerOp::Play).await?;
        }
        Commands::Pause { target, session } => {
            run_player(config, target, session, PlayerOp::Pause).await?;
        }
        Commands::Stop { target, session } => {
            run_player(config, target, session, PlayerOp::Stop).await?;
        }
        Commands::Volume {
            target,
            session,
            level,
            muted,
        } => {
            run_volume(config, target, session, level, muted).await?;
        }
        Commands::Seek {
            target,
            session,
            time,
        } => {
            run_seek(config, target, session, time).await?;
        }
        Commands::Ping { host, port, count } => {
            run_ping(config, host, port, count).await?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config();
                if let Some(path) = output {
                    std::fs::write(&path, &sample)?;
                    println!("Configuration written to: {}", path.display());
                } else {
                    println!("{}", sample);
                }
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Scan the network for cast devices
async fn run_discovery(timeout_secs: u64) -> anyhow::Result<()> {
    println!("Scanning for cast devices ({} seconds)...\n", timeout_secs);

    let devices = discovery::scan(Duration::from_secs(timeout_secs)).await?;

    if devices.is_empty() {
        println!("No cast devices found.");
        return Ok(());
    }

    for device in devices {
        let addr = device
            .socket_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<no address>".to_string());
        println!("{:<30} {:<20} {}", device.friendly_name, device.model, addr);
    }

    Ok(())
}

/// Open a channel and perform the standard session preamble: auth
/// challenge, then a virtual connection to the receiver.
async fn open_channel(config: &Config, host: &str, port: u16) -> anyhow::Result<Connection> {
    tracing::info!("Connecting to {}:{}", host, port);

    let mut conn = Connection::connect(
        host,
        port,
        Duration::from_millis(config.network.connect_timeout_ms),
    )
    .await?;

    conn.auth().await?;
    conn.connect_destination(DEFAULT_RECEIVER).await?;

    Ok(conn)
}

/// Pump inbound frames until a message on `namespace` arrives or
/// `windows` receive deadlines elapse. Answers PINGs along the way.
async fn wait_for_frame(
    conn: &mut Connection,
    deadline: Duration,
    windows: u32,
    namespace: &str,
) -> anyhow::Result<Option<CastMessage>> {
    for _ in 0..windows {
        match conn.receive(deadline).await? {
            Some(message) => {
                if message.namespace == NAMESPACE_HEARTBEAT {
                    if message.payload_utf8.as_deref() == Some(protocol::PING) {
                        conn.pong().await?;
                    }
                    continue;
                }

                if message.namespace == namespace {
                    return Ok(Some(message));
                }

                tracing::debug!(namespace = %message.namespace, "ignoring frame");
            }
            None => {
                tracing::warn!("no frame within {:?}", deadline);
            }
        }
    }

    Ok(None)
}

/// Query and print receiver status, or an app session's player status
async fn run_status(
    config: Config,
    host: String,
    port: u16,
    destination: Option<String>,
) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_channel(&config, &host, port).await?;

    let namespace = match &destination {
        Some(dest) => {
            conn.connect_destination(dest).await?;
            conn.player_get_status(dest).await?;
            NAMESPACE_MEDIA
        }
        None => {
            conn.receiver_get_status().await?;
            NAMESPACE_RECEIVER
        }
    };

    match wait_for_frame(&mut conn, deadline, 3, namespace).await? {
        Some(message) => {
            println!("{}", message.payload_utf8.unwrap_or_default());
        }
        None => {
            println!("No status response from {}:{}", host, port);
        }
    }

    conn.close().await;
    Ok(())
}

/// Launch an app on the receiver
async fn run_launch(config: Config, host: String, port: u16, app: String) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_channel(&config, &host, port).await?;

    tracing::info!("Launching app {}", app);
    conn.launch(&app).await?;

    match wait_for_frame(&mut conn, deadline, 3, NAMESPACE_RECEIVER).await? {
        Some(message) => {
            println!("{}", message.payload_utf8.unwrap_or_default());
        }
        None => {
            println!("No launch response from {}:{}", host, port);
        }
    }

    conn.close().await;
    Ok(())
}

/// Open a media channel: the usual preamble plus a virtual connection to
/// the app session the commands target.
async fn open_media_channel(config: &Config, target: &MediaTarget) -> anyhow::Result<Connection> {
    let mut conn = open_channel(config, &target.host, target.port).await?;
    conn.connect_destination(&target.destination).await?;
    Ok(conn)
}

/// Wait for the player's reply to a media command and print it
async fn report_media_reply(
    conn: &mut Connection,
    deadline: Duration,
    target: &MediaTarget,
) -> anyhow::Result<()> {
    match wait_for_frame(conn, deadline, 3, NAMESPACE_MEDIA).await? {
        Some(message) => {
            println!("{}", message.payload_utf8.unwrap_or_default());
        }
        None => {
            println!("No media response from {}:{}", target.host, target.port);
        }
    }
    Ok(())
}

/// Load the local stream on a running app session
async fn run_load(config: Config, target: MediaTarget) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_media_channel(&config, &target).await?;

    let media = MediaInformation::new(
        &conn.local_ip().to_string(),
        config.media.stream_port,
        &config.media.mime,
        None,
    );
    tracing::info!("Loading {} on {}", media.content_id, target.destination);
    conn.load(&target.destination, &media).await?;

    report_media_reply(&mut conn, deadline, &target).await?;
    conn.close().await;
    Ok(())
}

/// Issue a session-scoped playback command
async fn run_player(
    config: Config,
    target: MediaTarget,
    session: i64,
    op: PlayerOp,
) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_media_channel(&config, &target).await?;

    match op {
        PlayerOp::Play => conn.play(&target.destination, session).await?,
        PlayerOp::Pause => conn.pause(&target.destination, session).await?,
        PlayerOp::Stop => conn.stop(&target.destination, session).await?,
    }

    report_media_reply(&mut conn, deadline, &target).await?;
    conn.close().await;
    Ok(())
}

/// Set the stream volume on a session
async fn run_volume(
    config: Config,
    target: MediaTarget,
    session: i64,
    level: f64,
    muted: bool,
) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_media_channel(&config, &target).await?;

    conn.set_volume(&target.destination, session, level, muted)
        .await?;

    report_media_reply(&mut conn, deadline, &target).await?;
    conn.close().await;
    Ok(())
}

/// Seek to a position on a session
async fn run_seek(
    config: Config,
    target: MediaTarget,
    session: i64,
    time: f64,
) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_media_channel(&config, &target).await?;

    conn.seek(&target.destination, session, time).await?;

    report_media_reply(&mut conn, deadline, &target).await?;
    conn.close().await;
    Ok(())
}

/// Run heartbeat windows against a device
async fn run_ping(config: Config, host: String, port: u16, count: u32) -> anyhow::Result<()> {
    let deadline = Duration::from_millis(config.network.receive_deadline_ms);
    let mut conn = open_channel(&config, &host, port).await?;

    let mut missed = 0u32;

    for window in 1..=count {
        match conn.receive(deadline).await? {
            Some(message) if message.namespace == NAMESPACE_HEARTBEAT => {
                println!(
                    "[{}/{}] {} from {}",
                    window,
                    count,
                    message.payload_utf8.as_deref().unwrap_or("<binary>"),
                    message.source_id
                );
                if message.payload_utf8.as_deref() == Some(protocol::PING) {
                    conn.pong().await?;
                }
            }
            Some(message) => {
                println!(
                    "[{}/{}] frame on {}",
                    window, count, message.namespace
                );
            }
            None => {
                missed += 1;
                println!("[{}/{}] silence, sending PING", window, count);
                conn.ping().await?;
            }
        }
    }

    if missed > 0 {
        println!("{} of {} windows were silent", missed, count);
    }

    conn.close().await;
    Ok(())
}

/// Print protocol information
fn print_protocol_info() {
    println!("Castlink Protocol Information");
    println!("=============================\n");

    println!("Default port:      {}", protocol::DEFAULT_PORT);
    println!("Default receiver:  {}", protocol::DEFAULT_RECEIVER);
    println!("Sender id:         {}", protocol::SENDER_ID);
    println!("Media app id:      {}", protocol::APP_ID);

    println!("\nNamespaces:");
    println!("  auth:       {}", protocol::NAMESPACE_DEVICEAUTH);
    println!("  heartbeat:  {}", protocol::NAMESPACE_HEARTBEAT);
    println!("  connection: {}", protocol::NAMESPACE_CONNECTION);
    println!("  receiver:   {}", protocol::NAMESPACE_RECEIVER);
    println!("  media:      {}", protocol::NAMESPACE_MEDIA);
}
