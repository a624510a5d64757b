use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use roverlink_bridge::{BridgeConfig, CommandArbiter, CommandSource, VelocityBounds};

use crate::cmd::{parse_duration, parse_endpoint, DriveArgs};
use crate::exit::{io_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_snapshot, OutputFormat};

pub fn run(args: DriveArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;

    if !(args.max_linear.is_finite() && args.max_linear > 0.0) {
        return Err(CliError::new(USAGE, "--max-linear must be a positive number"));
    }
    if !(args.max_angular.is_finite() && args.max_angular > 0.0) {
        return Err(CliError::new(USAGE, "--max-angular must be a positive number"));
    }

    let mut config = BridgeConfig::new(endpoint).with_bounds(VelocityBounds {
        max_linear_mps: args.max_linear,
        max_angular_rps: args.max_angular,
    });
    config.link.baud = args.baud;
    config.control.tick_period = parse_duration(&args.tick)?;
    config.control.heartbeat_interval = parse_duration(&args.heartbeat)?;
    config.arbiter.teleop_timeout = parse_duration(&args.teleop_timeout)?;
    config.arbiter.autonomy_timeout = parse_duration(&args.autonomy_timeout)?;
    let status_interval = parse_duration(&args.status_interval)?;

    let source = CommandSource::from(args.source);
    let (arbiter, control) = config.build();
    let handle = control
        .spawn()
        .map_err(|err| io_error("control loop spawn failed", err))?;

    let shutdown = handle.shutdown_flag();
    {
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
    }

    let lines = spawn_stdin_reader()?;
    info!(source = source.name(), "reading command lines from stdin");

    let mut stdin_open = true;
    let mut next_status = Instant::now() + status_interval;
    while !shutdown.load(Ordering::SeqCst) {
        if stdin_open {
            match lines.recv_timeout(Duration::from_millis(50)) {
                Ok(line) => submit_line(&arbiter, source, &line),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    // Stdin closed. Stale sources will time out and the
                    // loop degrades to the stop command on its own.
                    info!("stdin closed, bridging until interrupted");
                    stdin_open = false;
                }
            }
        } else {
            thread::sleep(Duration::from_millis(50));
        }

        if !args.no_status && Instant::now() >= next_status {
            print_snapshot(&arbiter.snapshot(Instant::now()), format);
            next_status += status_interval;
        }
    }

    handle.stop();
    Ok(SUCCESS)
}

/// Parse one `<linear> <angular>` line and submit it. Malformed or
/// rejected lines are logged and skipped; an interactive typo must not
/// take the bridge down.
fn submit_line(arbiter: &CommandArbiter, source: CommandSource, line: &str) {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return;
    }
    let mut parts = line.split_whitespace();
    let parsed = match (parts.next(), parts.next(), parts.next()) {
        (Some(linear), Some(angular), None) => {
            match (linear.parse::<f32>(), angular.parse::<f32>()) {
                (Ok(linear), Ok(angular)) => Some((linear, angular)),
                _ => None,
            }
        }
        _ => None,
    };
    let Some((linear, angular)) = parsed else {
        warn!(line, "ignoring malformed command line, expected '<linear> <angular>'");
        return;
    };
    if let Err(err) = arbiter.submit(source, linear, angular, Instant::now()) {
        warn!(line, error = %err, "command rejected");
    }
}

fn spawn_stdin_reader() -> CliResult<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("roverlink-stdin".into())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|err| io_error("stdin reader spawn failed", err))?;
    Ok(rx)
}
