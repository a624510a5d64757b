use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};

use roverlink_bridge::CommandSource;
use roverlink_transport::LinkEndpoint;

use crate::exit::{transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod drive;
pub mod monitor;
pub mod probe;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the bridge: arbitrate commands from stdin and keep the link fed.
    Drive(DriveArgs),
    /// Print telemetry frames as they arrive.
    Monitor(MonitorArgs),
    /// Send velocity commands once and exit.
    Send(SendArgs),
    /// Open the link and report whether the controller is talking.
    Probe(ProbeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Drive(args) => drive::run(args, format),
        Command::Monitor(args) => monitor::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Probe(args) => probe::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum SourceArg {
    Teleop,
    Autonomy,
}

impl From<SourceArg> for CommandSource {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Teleop => CommandSource::Teleop,
            SourceArg::Autonomy => CommandSource::Autonomy,
        }
    }
}

#[derive(Args, Debug)]
pub struct DriveArgs {
    /// Link endpoint, e.g. serial:/dev/ttyAMA0 or tcp:127.0.0.1:9910.
    #[arg(default_value = "serial:/dev/ttyAMA0", env = "ROVERLINK_ENDPOINT")]
    pub endpoint: String,
    /// Serial baud rate.
    #[arg(long, default_value = "115200", env = "ROVERLINK_BAUD")]
    pub baud: u32,
    /// Source that stdin command lines are submitted as.
    #[arg(long, value_enum, default_value = "teleop")]
    pub source: SourceArg,
    /// Control tick period (e.g. 20ms).
    #[arg(long, default_value = "20ms")]
    pub tick: String,
    /// Heartbeat interval for unchanged commands.
    #[arg(long, default_value = "50ms")]
    pub heartbeat: String,
    /// Teleop staleness timeout.
    #[arg(long, default_value = "500ms")]
    pub teleop_timeout: String,
    /// Autonomy staleness timeout.
    #[arg(long, default_value = "1s")]
    pub autonomy_timeout: String,
    /// Maximum linear speed in m/s.
    #[arg(long, default_value = "0.6")]
    pub max_linear: f32,
    /// Maximum angular rate in rad/s.
    #[arg(long, default_value = "2.0")]
    pub max_angular: f32,
    /// How often to print a bridge status snapshot.
    #[arg(long, default_value = "1s")]
    pub status_interval: String,
    /// Disable periodic status snapshots.
    #[arg(long)]
    pub no_status: bool,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Link endpoint, e.g. serial:/dev/ttyAMA0 or tcp:127.0.0.1:9910.
    #[arg(default_value = "serial:/dev/ttyAMA0", env = "ROVERLINK_ENDPOINT")]
    pub endpoint: String,
    /// Serial baud rate.
    #[arg(long, default_value = "115200", env = "ROVERLINK_BAUD")]
    pub baud: u32,
    /// Exit after printing N telemetry frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Fail if no telemetry arrives within this window (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Link endpoint, e.g. serial:/dev/ttyAMA0 or tcp:127.0.0.1:9910.
    #[arg(default_value = "serial:/dev/ttyAMA0", env = "ROVERLINK_ENDPOINT")]
    pub endpoint: String,
    /// Serial baud rate.
    #[arg(long, default_value = "115200", env = "ROVERLINK_BAUD")]
    pub baud: u32,
    /// Linear velocity in m/s.
    #[arg(long, short = 'l', default_value = "0.0", allow_hyphen_values = true)]
    pub linear: f32,
    /// Angular velocity in rad/s.
    #[arg(long, short = 'a', default_value = "0.0", allow_hyphen_values = true)]
    pub angular: f32,
    /// Number of times to send the command.
    #[arg(long, default_value = "1")]
    pub repeat: usize,
    /// Delay between repeated sends.
    #[arg(long, default_value = "50ms")]
    pub interval: String,
    /// Wait for one telemetry frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for telemetry when --wait is set.
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct ProbeArgs {
    /// Link endpoint, e.g. serial:/dev/ttyAMA0 or tcp:127.0.0.1:9910.
    #[arg(default_value = "serial:/dev/ttyAMA0", env = "ROVERLINK_ENDPOINT")]
    pub endpoint: String,
    /// Serial baud rate.
    #[arg(long, default_value = "115200", env = "ROVERLINK_BAUD")]
    pub baud: u32,
    /// How long to listen for telemetry before giving up.
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_endpoint(input: &str) -> CliResult<LinkEndpoint> {
    input
        .parse()
        .map_err(|err| transport_error("invalid endpoint", err))
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

/// Flag set by Ctrl-C. Commands poll it between units of work.
pub fn install_shutdown_handler() -> CliResult<Arc<AtomicBool>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })?;
    Ok(shutdown)
}
