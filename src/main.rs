use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::LevelFilter;
use mesh_net_hw::logging::{init_logger, init_logger_with_level};
use mesh_net_hw::sim::{BusyModel, SimPlatform};
use mesh_net_hw::{HwConfig, MeshHw, Status};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "mesh-hw-cli")]
#[command(about = "Bring-up tool for the mesh radio HAL, running on the register simulator")]
struct Cli {
    /// JSON configuration file (defaults apply for missing fields)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log register sequences at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Status polls the simulated transmitter stays busy after each transmit start
    #[arg(long, default_value = "0")]
    busy_polls: u32,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach and report the device status
    Status,
    /// Transmit one frame given as hex
    Send { payload: String },
    /// Transmit a frame and read it back through the simulated receive FIFO
    Loopback { payload: String },
    /// Print the effective configuration
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<HwConfig> {
    match path {
        Some(path) => HwConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(HwConfig::default()),
    }
}

fn decode_payload(payload: &str) -> Result<Vec<u8>> {
    hex::decode(payload.trim()).with_context(|| format!("invalid hex payload {payload:?}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.verbose {
        init_logger_with_level(LevelFilter::Debug);
    } else {
        init_logger();
    }

    let config = load_config(cli.config.as_ref())?;
    let platform = SimPlatform::new();
    if cli.busy_polls > 0 {
        platform
            .registers
            .set_busy_on_tx_start(BusyModel::Polls(cli.busy_polls));
    }
    let registers = platform.registers.clone();
    let delay = platform.delay.clone();

    match cli.command {
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            return Ok(());
        }
        Commands::Status => {
            let hw = MeshHw::attach(platform, config)?;
            let status = hw.get_status();
            println!("status: 0x{status:02X} {:?}", Status::from_bits_retain(status));
            println!("ready: {}", hw.is_ready());
            println!("irq: {}", hw.irq_number()?);
            hw.detach();
        }
        Commands::Send { payload } => {
            let frame = decode_payload(&payload)?;
            let hw = MeshHw::attach(platform, config)?;
            hw.enable()?;
            hw.tx(&frame)?;
            println!("sent {} bytes, fifo: {}", frame.len(), hex::encode_upper(registers.transmitted()));
            println!("{:?}", hw.stats());
        }
        Commands::Loopback { payload } => {
            let frame = decode_payload(&payload)?;
            let hw = MeshHw::attach(platform, config)?;
            hw.enable()?;
            hw.tx(&frame)?;
            registers.queue_rx_frame(&frame);
            let received = hw.rx()?;
            if received[..] != frame[..] {
                bail!(
                    "loopback mismatch: sent {}, received {}",
                    hex::encode_upper(&frame),
                    hex::encode_upper(&received)
                );
            }
            println!("loopback ok: {} bytes", received.len());
            println!("{:?}", hw.stats());
        }
    }

    println!("simulated wait: {:?}", delay.elapsed());
    Ok(())
}
