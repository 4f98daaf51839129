mod args;
mod bar;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use args::{Cli, Command, FlashArgs};
use bar::BarProgress;
use kflash_core::prelude::*;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Command::Ports => {
            print_ports();
            Ok(())
        }
        Command::Flash(args) => flash(args).await,
    };

    if let Err(e) = result {
        tracing::error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .without_time()
        .init();
}

fn print_ports() {
    let ports = list_ports();
    if ports.is_empty() {
        tracing::warn!("no serial ports found");
        return;
    }
    for port in ports {
        let usb = match (port.vid, port.pid) {
            (Some(vid), Some(pid)) => format!("{vid:04x}:{pid:04x}"),
            _ => "-".to_string(),
        };
        let marker = if port.is_likely_k210() { "*" } else { " " };
        println!(
            "{marker} {:<20} {usb:<10} {}",
            port.name,
            port.product.as_deref().unwrap_or("")
        );
    }
}

/// First port that looks like a K210 board, or any port at all
fn detect_port() -> Result<String> {
    let ports = list_ports();
    let port = ports
        .iter()
        .find(|p| p.is_likely_k210())
        .or_else(|| ports.first())
        .context("no serial port found; pass --port")?;
    tracing::info!("using port {}", port.name);
    Ok(port.name.clone())
}

fn session_config(args: &FlashArgs) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SessionConfig::default(),
    };

    if let Some(target_baud) = args.target_baud {
        config.target_baud = target_baud;
    }
    if let Some(address) = args.address {
        config.flash_address = address;
    }
    if let Some(load_address) = args.load_address {
        config.load_address = load_address;
    }
    if let Some(chip) = args.chip {
        config.chip_type = chip;
    }
    Ok(config)
}

async fn flash(args: FlashArgs) -> Result<()> {
    let config = session_config(&args)?;

    let stub_bytes = std::fs::read(&args.stub)
        .with_context(|| format!("failed to read stub {}", args.stub.display()))?;
    let stub = if args.raw_stub {
        StubImage::from_raw(stub_bytes)?
    } else {
        StubImage::from_compressed(&stub_bytes)?
    };
    let firmware = std::fs::read(&args.firmware)
        .with_context(|| format!("failed to read firmware {}", args.firmware.display()))?;

    let port = match &args.port {
        Some(port) => port.clone(),
        None => detect_port()?,
    };
    let transport = SerialTransport::open(&port, args.baud, DEFAULT_BUFFER_SIZE)
        .with_context(|| format!("failed to open {port}"))?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, stopping after the current exchange");
                cancel.cancel();
            }
        }
    });

    let mut session = Session::new(transport, stub, config)
        .with_cancellation(cancel)
        .with_progress(BarProgress::default());
    session.flash(&firmware).await?;

    let mut transport = session.into_transport();
    transport.close().await?;
    tracing::info!(
        "wrote {} bytes to {} and rebooted",
        firmware.len(),
        transport.path()
    );
    Ok(())
}
