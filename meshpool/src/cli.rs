use clap::{Parser, Subcommand};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "meshpool")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Serial port or TCP address (e.g., /dev/ttyUSB0 or tcp://192.168.1.100:4403)
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Output in JSON format
    #[arg(short = 'j', long, global = true)]
    pub json: bool,

    /// Connection timeout in seconds
    #[arg(short = 't', long, global = true, default_value = "30")]
    pub timeout: u64,

    /// Enable debug logging
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Find nodes on serial ports and the local network
    Discover {
        /// Explicit endpoints to probe instead of scanning serial patterns
        #[arg(long)]
        ports: Vec<String>,

        /// Also listen for mDNS-advertised nodes
        #[arg(short = 'n', long)]
        network: bool,

        /// How long to listen for mDNS announcements
        #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
        listen: Duration,
    },

    /// Show the connected node's identity and configuration
    Info,

    /// List nodes the connected node has overheard on the mesh
    Heard {
        /// Show the who-heard-whom history instead of the catalog
        #[arg(long)]
        history: bool,
    },

    /// Send a text message and wait for the acknowledgement
    Message {
        /// Target node id ("!hex" or bare hex)
        dest: String,

        /// Message text to send
        #[arg(short = 'm', long)]
        text: String,

        /// How long to wait for the ack
        #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
        wait: Duration,
    },

    /// Remote administration over the mesh
    Remote {
        #[command(subcommand)]
        subcommand: RemoteCommands,
    },

    /// Evaluate a node's configuration against expected settings
    Check {
        /// Remote node to check (the connected node if omitted)
        #[arg(long)]
        dest: Option<String>,

        /// Expected hop limit
        #[arg(long, default_value = "7")]
        hop_limit: u64,

        /// Expected LoRa region
        #[arg(long)]
        region: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum RemoteCommands {
    /// Probe whether the target accepts our admin requests
    Verify {
        /// Target node id ("!hex" or bare hex)
        dest: String,
    },

    /// Retrieve the target's configuration section by section
    Config {
        /// Target node id ("!hex" or bare hex)
        dest: String,

        /// How long to wait per request attempt
        #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
        wait: Duration,

        /// Whole-sequence retries on transport errors
        #[arg(long, default_value = "1")]
        retries: u32,
    },
}

impl Cli {
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
