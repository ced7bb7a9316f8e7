//! Entry point for `udp-arq`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to the library; `main.rs` owns only
//! process setup (logging, argument parsing, exit status).

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use udp_arq::{Policy, Receiver, Sender, TransferConfig};

/// Reliable file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send a file to a listening receiver.
    Send {
        #[command(flatten)]
        common: Common,
        /// Receiving host.
        #[arg(long, default_value = "localhost")]
        host: String,
        /// Give up after a packet has been retransmitted this many times.
        #[arg(long)]
        max_retransmits: Option<u32>,
        /// File to send.
        file: PathBuf,
    },
    /// Receive one file and exit.
    Receive {
        #[command(flatten)]
        common: Common,
        /// Address to bind.
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Keep re-acknowledging for this long after the last packet.
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,
        /// Output file.
        file: PathBuf,
    },
}

#[derive(Args)]
struct Common {
    /// none | saw | gbn | sr
    #[arg(short, long, default_value = "sr")]
    policy: Policy,
    /// Data port; acknowledgments use port + 1.
    #[arg(long, default_value_t = 9000)]
    port: u16,
    #[arg(long, default_value_t = 300)]
    ack_timeout_ms: u64,
    /// Window size for gbn and sr.
    #[arg(short, long, default_value_t = 16)]
    window: usize,
    /// Datagram size including the 3-byte header.
    #[arg(long, default_value_t = 1024)]
    packet_size: usize,
}

impl Common {
    fn config(&self, host: String) -> TransferConfig {
        TransferConfig {
            ack_timeout: Duration::from_millis(self.ack_timeout_ms),
            window_size: self.window,
            packet_size: self.packet_size,
            ..TransferConfig::new(self.policy, host, self.port)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.mode {
        Mode::Send {
            common,
            host,
            max_retransmits,
            file,
        } => {
            let config = TransferConfig {
                max_retransmits,
                ..common.config(host)
            };
            let sender = Sender::bind(config).await.context("setting up sender")?;
            log::info!("Sending {} to {}", file.display(), sender.dest());
            let report = sender
                .send_file(&file)
                .await
                .with_context(|| format!("sending {}", file.display()))?;
            println!("File sent successfully.");
            println!("{report}");
        }
        Mode::Receive {
            common,
            host,
            linger_ms,
            file,
        } => {
            let config = TransferConfig {
                linger: Duration::from_millis(linger_ms),
                ..common.config(host)
            };
            let receiver = Receiver::bind(config).await.context("setting up receiver")?;
            log::info!("Receiving into {} on {}", file.display(), receiver.local_addr());
            let report = receiver
                .receive_to_file(&file)
                .await
                .with_context(|| format!("receiving into {}", file.display()))?;
            println!("File received successfully.");
            println!("{report}");
        }
    }
    Ok(())
}
