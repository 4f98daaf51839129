use std::path::PathBuf;

use kflash_core::protocol::DEFAULT_BAUD_RATE;

#[derive(clap::Parser, Debug, Clone)]
#[command(name = "kflash", version, about, long_about = None)]
pub struct Cli {
    /// Increase message verbosity
    #[arg(short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a firmware image to flash and reboot into it
    Flash(FlashArgs),
    /// List serial ports, likely K210 boards first
    Ports,
}

#[derive(clap::Args, Debug, Clone)]
pub struct FlashArgs {
    /// Serial port to use; will try to autodetect if not specified
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate the bootrom is spoken to at
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Baud rate to switch to once the stub is running
    #[arg(short = 'B', long)]
    pub target_baud: Option<u32>,

    /// Flash address to write the firmware to
    #[arg(short, long, value_parser = clap_num::maybe_hex::<u32>)]
    pub address: Option<u32>,

    /// SRAM address to load the stub at
    #[arg(long, value_parser = clap_num::maybe_hex::<u32>)]
    pub load_address: Option<u32>,

    /// Flash chip selector
    #[arg(long)]
    pub chip: Option<u32>,

    /// Stub loader image (zlib compressed unless --raw-stub)
    #[arg(long)]
    pub stub: PathBuf,

    /// The stub image is not compressed
    #[arg(long)]
    pub raw_stub: bool,

    /// JSON file with session settings; flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Firmware image to write
    #[arg(required = true)]
    pub firmware: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_flash_args() {
        let cli = Cli::try_parse_from([
            "kflash",
            "-vv",
            "flash",
            "--port",
            "/dev/ttyUSB0",
            "--address",
            "0x100000",
            "--stub",
            "isp.bin.z",
            "firmware.bin",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Flash(args) = cli.command else {
            panic!("expected flash");
        };
        assert_eq!(args.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(args.baud, 115_200);
        assert_eq!(args.address, Some(0x10_0000));
        assert!(!args.raw_stub);
        assert_eq!(args.firmware, PathBuf::from("firmware.bin"));
    }

    #[test]
    fn test_stub_is_required() {
        assert!(Cli::try_parse_from(["kflash", "flash", "firmware.bin"]).is_err());
    }
}
