//! Modbus Poller
//!
//! Polls the registers listed in a register map from one Modbus TCP device
//! and writes one line per register to stdout.
//!
//! Usage: modbus-poller [OPTIONS] <IP> <MAP>
//! Example: modbus-poller 192.168.1.20 registers.csv --loop --comma

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use modbus_poller::constants::{
    DEFAULT_INITIAL_AVERAGE_MS, DEFAULT_LOOP_DELAY_MS, DEFAULT_REGISTER_DELAY_MS,
    DEFAULT_SMOOTHING_FACTOR, DEFAULT_TCP_PORT, DEFAULT_TIMEOUT_MS, DEFAULT_UNIT_ID,
};
use modbus_poller::{
    init_tracing, DelimitedSink, FileRegisterSource, LogFormat, PollerConfig, PollerError,
    PollingEngine, Separator, TcpConnector,
};

/// Exit code after Ctrl-C
const EXIT_INTERRUPTED: u8 = 130;

/// A duration given in (fractional) seconds on the command line
#[derive(Debug, Clone, Copy, PartialEq)]
struct Seconds(Duration);

impl Seconds {
    const fn millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }
}

impl FromStr for Seconds {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let seconds: f64 = raw
            .trim()
            .parse()
            .map_err(|e| format!("invalid number of seconds {:?}: {}", raw, e))?;
        Duration::try_from_secs_f64(seconds)
            .map(Self)
            .map_err(|e| format!("invalid duration {:?}: {}", raw, e))
    }
}

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.as_secs_f64())
    }
}

/// Continuous Modbus TCP register poller.
#[derive(Parser, Debug)]
#[command(name = "modbus-poller")]
#[command(about = "Polls Modbus registers and prints decoded values", long_about = None)]
#[command(version)]
struct Args {
    /// Device IP address or host name
    #[arg(env = "MODBUS_POLLER_HOST")]
    ip: String,

    /// Register map (function, address, length, multiplier, encoding)
    #[arg(env = "MODBUS_POLLER_MAP")]
    map: PathBuf,

    /// TCP port
    #[arg(short, long, default_value_t = DEFAULT_TCP_PORT, env = "MODBUS_POLLER_PORT")]
    port: u16,

    /// Unit (slave) identifier
    #[arg(short, long, default_value_t = DEFAULT_UNIT_ID, env = "MODBUS_POLLER_SLAVE")]
    slave: u8,

    /// Connect and request timeout in seconds
    #[arg(short, long, default_value_t = Seconds::millis(DEFAULT_TIMEOUT_MS), env = "MODBUS_POLLER_TIMEOUT")]
    timeout: Seconds,

    /// Delay between registers in seconds
    #[arg(short, long, default_value_t = Seconds::millis(DEFAULT_REGISTER_DELAY_MS), env = "MODBUS_POLLER_DELAY")]
    delay: Seconds,

    /// Keep polling until interrupted
    #[arg(short, long = "loop", env = "MODBUS_POLLER_LOOP")]
    looping: bool,

    /// Delay between passes in seconds when looping
    #[arg(short = 'w', long, default_value_t = Seconds::millis(DEFAULT_LOOP_DELAY_MS), env = "MODBUS_POLLER_LOOP_WAIT")]
    loop_wait: Seconds,

    /// Weight of the newest sample in the running latency average, in (0, 1]
    #[arg(long, default_value_t = DEFAULT_SMOOTHING_FACTOR, env = "MODBUS_POLLER_SMOOTHING")]
    smoothing: f64,

    /// Initial value of the running latency average in milliseconds
    #[arg(long, default_value_t = DEFAULT_INITIAL_AVERAGE_MS)]
    seed_latency: f64,

    /// Pause after a connection fault in seconds
    #[arg(long, default_value_t = Seconds(Duration::ZERO))]
    reconnect_delay: Seconds,

    /// Separate fields with commas instead of tabs
    #[arg(short, long, conflicts_with = "separator")]
    comma: bool,

    /// Field separator (a single character, `\t` for tab)
    #[arg(long, value_parser = parse_separator)]
    separator: Option<char>,

    /// Log level or filter directive (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "MODBUS_POLLER_LOG_LEVEL")]
    log_level: String,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "MODBUS_POLLER_LOG_FORMAT")]
    log_format: LogFormat,
}

impl Args {
    fn separator(&self) -> Separator {
        match (self.comma, self.separator) {
            (true, _) => Separator::Comma,
            (false, Some(c)) => Separator::from(c),
            (false, None) => Separator::Tab,
        }
    }

    fn config(&self) -> PollerConfig {
        PollerConfig::new(&self.ip, &self.map)
            .with_port(self.port)
            .with_unit_id(self.slave)
            .with_connect_timeout(self.timeout.0)
            .with_register_delay(self.delay.0)
            .with_loop_delay(self.looping.then_some(self.loop_wait.0))
            .with_smoothing_factor(self.smoothing)
            .with_initial_average_ms(self.seed_latency)
            .with_reconnect_delay(self.reconnect_delay.0)
            .with_separator(self.separator())
    }
}

fn parse_separator(raw: &str) -> Result<char, String> {
    if raw == "\\t" {
        return Ok('\t');
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("separator must be a single character, got {:?}", raw)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(&args.log_level, args.log_format) {
        eprintln!("modbus-poller: {}", e);
        return ExitCode::from(4);
    }

    let config = args.config();
    info!(
        target = %config.target(),
        map = %config.register_map.display(),
        looping = config.is_looping(),
        "Starting modbus-poller"
    );

    let connector = TcpConnector::new(&config.host, config.port, config.connect_timeout);
    let source = FileRegisterSource::new(&config.register_map);
    let sink = DelimitedSink::new(std::io::stdout(), config.separator);

    let mut engine = match PollingEngine::from_config(&config, connector, source, sink) {
        Ok(engine) => engine,
        Err(e) => return fail(&e),
    };

    let outcome = tokio::select! {
        result = engine.run() => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(summary)) => {
            info!(
                passes = summary.passes,
                errors = summary.error_count,
                "modbus-poller finished"
            );
            ExitCode::SUCCESS
        }
        Some(Err(e)) => fail(&e),
        None => {
            info!("Interrupted, closing connection");
            if let Err(e) = engine.shutdown().await {
                eprintln!("modbus-poller: {}", e);
            }
            ExitCode::from(EXIT_INTERRUPTED)
        }
    }
}

/// The one top-level report of a fatal error. The library has already
/// logged the details.
fn fail(e: &PollerError) -> ExitCode {
    eprintln!("modbus-poller: {}", e);
    ExitCode::from(e.exit_code())
}
