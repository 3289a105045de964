use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use serde::Serialize;
use std::fs::File;
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use rs01_lib::constants::DEFAULT_ADDRESS;
use rs01_lib::{
    BasicInfo, BaudRate, CheckBit, MeasurementConfig, MeasurementData, RS01, RtuTransport, SerialSettings, StopBit,
};

/// Read and configure a DFRobot RS01 ranging sensor over Modbus-RTU.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Serial port the sensor is attached to (e.g. /dev/ttyUSB0).
    #[arg(short, long)]
    port: String,
    /// Line speed used to reach the sensor.
    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,
    /// Bus address of the sensor, decimal or 0x-prefixed hex.
    #[arg(short, long, default_value_t = DEFAULT_ADDRESS, value_parser = parse_address)]
    address: u8,
    /// Parity used on the line.
    #[arg(long, value_enum, default_value_t = Parity::None)]
    line_parity: Parity,
    /// Stop bits used on the line.
    #[arg(long, value_enum, default_value_t = StopBits::One)]
    line_stop_bits: StopBits,
    /// Optional path to a file to write logs to, in addition to the console.
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[command(flatten)]
    verbose: Verbosity<InfoLevel>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print identity, communication settings, measurement window and targets.
    Info {
        /// Print a JSON document instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Poll target readings.
    Monitor {
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,
        /// Stop after this many readings.
        #[arg(long)]
        count: Option<u64>,
    },
    /// Change the sensor's bus address (1-247).
    SetAddress {
        #[arg(value_parser = parse_u16)]
        address: u16,
    },
    /// Change the sensor's baud rate. Applies after a power cycle.
    SetBaud { rate: u32 },
    /// Change the sensor's parity and stop bits.
    SetFraming {
        #[arg(long, value_enum)]
        parity: Parity,
        #[arg(long, value_enum)]
        stop_bits: StopBits,
    },
    /// Write the measurement window and detection parameters in one transaction.
    SetWindow {
        start: u16,
        stop: u16,
        initial_threshold: u16,
        end_threshold: u16,
        sensitivity: u16,
        #[arg(allow_negative_numbers = true)]
        offset: i16,
    },
    /// Restore the sensor's factory settings.
    FactoryReset,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Parity {
    None,
    Even,
    Odd,
}

impl From<Parity> for CheckBit {
    fn from(parity: Parity) -> Self {
        match parity {
            Parity::None => CheckBit::None,
            Parity::Even => CheckBit::Even,
            Parity::Odd => CheckBit::Odd,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum StopBits {
    #[value(name = "1")]
    One,
    #[value(name = "2")]
    Two,
}

impl From<StopBits> for StopBit {
    fn from(stop_bits: StopBits) -> Self {
        match stop_bits {
            StopBits::One => StopBit::One,
            StopBits::Two => StopBit::Two,
        }
    }
}

#[derive(Serialize)]
struct Report {
    basic_info: BasicInfo,
    /// `None` when the sensor reports a code outside the known set
    baud_rate: Option<u32>,
    parity: Option<CheckBit>,
    stop_bits: Option<StopBit>,
    firmware: String,
    measurement_config: MeasurementConfig,
    measurement_data: MeasurementData,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{}': {}", s, e))
}

fn parse_address(s: &str) -> Result<u8, String> {
    let value = parse_u16(s)?;
    u8::try_from(value).map_err(|_| format!("address {} does not fit in one byte", value))
}

/// Console output goes to stderr so `info --json` stays machine-readable on stdout.
/// `--log-file` adds an uncolored copy written off-thread; the returned guard flushes it.
fn init_tracing(cli: &Cli) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(cli.verbose.tracing_level_filter().into())
        .from_env_lossy();
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .without_time();

    let Some(path) = cli.log_file.as_deref() else {
        tracing_subscriber::registry().with(filter).with(console).init();
        return Ok(None);
    };

    let log_file = File::create(path).with_context(|| format!("Cannot create log file {}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(log_file);
    let file = tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false);

    tracing_subscriber::registry().with(filter).with(console).with(file).init();
    debug!("Writing log to {}", path.display());
    Ok(Some(guard))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(&cli)?;

    if let Err(e) = run(cli) {
        error!("{:#}", e);
        process::exit(1);
    }

    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    if BaudRate::from_bps(cli.baud).is_none() {
        warn!("{} baud is not a rate the RS01 supports", cli.baud);
    }
    let settings = SerialSettings {
        baud_rate: cli.baud,
        check_bit: cli.line_parity.into(),
        stop_bit: cli.line_stop_bits.into(),
        ..SerialSettings::default()
    };
    let transport =
        RtuTransport::open(&cli.port, &settings).with_context(|| format!("Failed to open {}", cli.port))?;

    let mut sensor = RS01::new(transport, cli.address);
    sensor
        .begin()
        .with_context(|| format!("No RS01 at address {:#04x} on {}", cli.address, cli.port))?;

    match cli.command {
        Command::Info { json } => show_info(&mut sensor, json),
        Command::Monitor { interval_ms, count } => monitor(&mut sensor, Duration::from_millis(interval_ms), count),
        Command::SetAddress { address } => {
            sensor.set_address(address)?;
            println!("Address set to {:#04x}; reconnect with --address {:#04x}", address, address);
            Ok(())
        }
        Command::SetBaud { rate } => {
            let Some(baudrate) = BaudRate::from_bps(rate) else {
                let supported: Vec<String> = BaudRate::ALL.iter().map(ToString::to_string).collect();
                bail!("Unsupported baud rate {}, expected one of: {}", rate, supported.join(", "));
            };
            sensor.set_baudrate_mode(baudrate)?;
            println!("Baud rate set to {}; power cycle the sensor to apply", baudrate);
            Ok(())
        }
        Command::SetFraming { parity, stop_bits } => {
            let (check_bit, stop_bit) = (CheckBit::from(parity), StopBit::from(stop_bits));
            sensor.set_checkbit_stopbit(check_bit, stop_bit)?;
            println!("Framing set to parity {}, {} stop bit(s)", check_bit, stop_bit);
            Ok(())
        }
        Command::SetWindow {
            start,
            stop,
            initial_threshold,
            end_threshold,
            sensitivity,
            offset,
        } => {
            sensor.set_all_measurement_parameters(start, stop, initial_threshold, end_threshold, sensitivity, offset)?;
            println!("{}", sensor.refresh_measurement_config()?);
            Ok(())
        }
        Command::FactoryReset => {
            sensor.restore_factory_setting()?;
            println!("Factory settings restored");
            Ok(())
        }
    }
}

fn show_info(sensor: &mut RS01<impl rs01_lib::Transport>, json: bool) -> Result<()> {
    let basic_info = *sensor.refresh_basic_info()?;
    let measurement_config = *sensor.refresh_measurement_config()?;
    let measurement_data = *sensor.refresh_measurement_data()?;

    if json {
        let framing = basic_info.checkbit_stopbit().ok();
        let report = Report {
            basic_info,
            baud_rate: basic_info.baudrate().ok().map(|rate| rate.as_bps()),
            parity: framing.map(|(check_bit, _)| check_bit),
            stop_bits: framing.map(|(_, stop_bit)| stop_bit),
            firmware: basic_info.firmware_version(),
            measurement_config,
            measurement_data,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Module info:");
    println!("  PID: {:#06x}", basic_info.pid);
    println!("  VID: {:#06x}", basic_info.vid);
    println!("  Address: {:#04x}", basic_info.address);
    match basic_info.baudrate() {
        Ok(baudrate) => println!("  Baud rate: {}", baudrate),
        Err(_) => println!("  Baud rate: unknown code {:#06x}", basic_info.baudrate_code),
    }
    match basic_info.checkbit_stopbit() {
        Ok((check_bit, stop_bit)) => {
            println!("  Parity: {}", check_bit);
            println!("  Stop bits: {}", stop_bit);
        }
        Err(_) => println!("  Framing: unknown word {:#06x}", basic_info.framing),
    }
    println!("  Firmware: {}", basic_info.firmware_version());
    println!("Measurement config:");
    println!("  {}", measurement_config);
    println!("Targets:");
    print_targets(&measurement_data);
    Ok(())
}

fn print_targets(data: &MeasurementData) {
    if data.targets().is_empty() {
        println!("  (none)");
    }
    for (index, target) in data.targets().iter().enumerate() {
        println!(
            "  #{}: distance {}, intensity {}",
            index + 1,
            target.distance,
            target.intensity
        );
    }
}

fn monitor(sensor: &mut RS01<impl rs01_lib::Transport>, interval: Duration, count: Option<u64>) -> Result<()> {
    info!("Polling targets every {:?}", interval);
    let mut readings = 0u64;
    loop {
        match sensor.refresh_measurement_data() {
            Ok(data) => {
                println!(
                    "[{}] {} target(s)",
                    chrono::Local::now().format("%H:%M:%S%.3f"),
                    data.valid_count()
                );
                print_targets(data);
            }
            Err(e) => warn!("Reading failed: {}", e),
        }

        readings += 1;
        if count.is_some_and(|limit| readings >= limit) {
            debug!("Stopping after {} readings", readings);
            return Ok(());
        }
        thread::sleep(interval);
    }
}
