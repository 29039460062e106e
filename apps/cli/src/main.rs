use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Args, Parser, Subcommand};
use ispflash_core::transport::Transport;
use ispflash_core::{
    DeviceSession, ProtocolFamily, SessionConfig, TracingObserver, UsbControlTransport,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Touchpad and USB-hub co-processor firmware tool",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read the running firmware version
    Setup(DeviceArgs),
    /// Write a firmware image to the device
    Update {
        #[command(flatten)]
        device: DeviceArgs,

        /// Firmware image to write
        #[arg(long)]
        firmware: PathBuf,
    },
}

#[derive(Args, Debug)]
struct DeviceArgs {
    /// Protocol family: register (touchpad) or opcode (hub co-processor)
    #[arg(long)]
    family: Option<ProtocolFamily>,

    /// I2C character device of a touchpad, e.g. /dev/i2c-1
    #[arg(long, conflicts_with = "usb")]
    device: Option<PathBuf>,

    /// USB device as VID:PID in hex, e.g. 2109:2817
    #[arg(long)]
    usb: Option<String>,

    /// Session configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Device quirk as KEY=VALUE, may be repeated
    #[arg(long = "quirk")]
    quirks: Vec<String>,
}

impl DeviceArgs {
    fn session_config(&self) -> Result<SessionConfig> {
        let mut config = match (&self.config, self.family) {
            (Some(path), family) => {
                let mut config = SessionConfig::load_from_file(path)
                    .with_context(|| format!("loading {}", path.display()))?;
                if let Some(family) = family {
                    config.family = family;
                }
                config
            }
            (None, Some(family)) => SessionConfig::new(family),
            (None, None) => bail!("either --family or --config is required"),
        };
        for quirk in &self.quirks {
            config.apply_quirk_str(quirk)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn open_transport(&self) -> Result<Box<dyn Transport>> {
        match (&self.device, &self.usb) {
            (Some(path), None) => open_chardev(path),
            (None, Some(ids)) => {
                let (vid, pid) = parse_usb_ids(ids)?;
                info!(
                    vid = %format!("{:04X}", vid),
                    pid = %format!("{:04X}", pid),
                    "Opening USB device"
                );
                Ok(Box::new(UsbControlTransport::open_with_ids(vid, pid)?))
            }
            _ => bail!("exactly one of --device or --usb is required"),
        }
    }

    fn open_session(&self) -> Result<DeviceSession<Box<dyn Transport>>> {
        let config = self.session_config()?;
        let transport = self.open_transport()?;
        Ok(DeviceSession::with_observer(
            transport,
            config,
            Arc::new(TracingObserver),
        )?)
    }
}

#[cfg(unix)]
fn open_chardev(path: &std::path::Path) -> Result<Box<dyn Transport>> {
    info!(path = %path.display(), "Opening I2C device");
    Ok(Box::new(ispflash_core::I2cDevTransport::open(path)?))
}

#[cfg(not(unix))]
fn open_chardev(_path: &std::path::Path) -> Result<Box<dyn Transport>> {
    bail!("I2C character devices are only supported on unix")
}

fn parse_usb_ids(ids: &str) -> Result<(u16, u16)> {
    let (vid, pid) = ids
        .split_once(':')
        .ok_or_else(|| anyhow!("expected VID:PID, got '{ids}'"))?;
    let vid = u16::from_str_radix(vid, 16).with_context(|| format!("bad vendor id '{vid}'"))?;
    let pid = u16::from_str_radix(pid, 16).with_context(|| format!("bad product id '{pid}'"))?;
    Ok((vid, pid))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Setup(device) => {
            let mut session = device.open_session()?;
            let version = session.setup()?;
            println!("{version}");
        }
        Commands::Update { device, firmware } => {
            let data = std::fs::read(&firmware)
                .with_context(|| format!("reading {}", firmware.display()))?;
            let mut session = device.open_session()?;
            info!(path = %firmware.display(), len = data.len(), "Loaded firmware");
            session.install(&data)?;
            if let Some(version) = session.version() {
                info!(previous = %version, "Update finished");
            }
        }
    }
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if cli.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(cli) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
