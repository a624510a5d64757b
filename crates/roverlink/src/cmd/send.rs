use std::thread;
use std::time::Instant;

use tracing::debug;

use roverlink_bridge::{LinkConfig, LinkDriver, VelocityBounds};
use roverlink_frame::{Telemetry, VelocityCommand};

use crate::cmd::{parse_duration, parse_endpoint, SendArgs};
use crate::exit::{link_error, transport_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_telemetry, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let interval = parse_duration(&args.interval)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;

    let cmd = VelocityCommand::new(args.linear, args.angular);
    let bounds = VelocityBounds::default();
    if !bounds.contains(&cmd) {
        return Err(CliError::new(
            USAGE,
            format!(
                "velocity ({}, {}) outside limits ({} m/s, {} rad/s)",
                args.linear, args.angular, bounds.max_linear_mps, bounds.max_angular_rps
            ),
        ));
    }
    if args.repeat == 0 {
        return Err(CliError::new(USAGE, "--repeat must be at least 1"));
    }

    let config = LinkConfig {
        baud: args.baud,
        ..LinkConfig::default()
    };
    let stream = endpoint
        .open(args.baud)
        .map_err(|err| transport_error("open failed", err))?;
    let mut driver = LinkDriver::from_stream(stream, config);

    for i in 0..args.repeat {
        driver
            .send_velocity(cmd, Instant::now())
            .map_err(|err| link_error("send failed", err))?;
        if i + 1 < args.repeat {
            thread::sleep(interval);
        }
    }
    debug!(count = args.repeat, "commands sent");

    if args.wait {
        let deadline = Instant::now() + wait_timeout;
        loop {
            for frame in driver.poll_receive(Instant::now()) {
                if let Ok(sample) = Telemetry::try_from(&frame) {
                    print_telemetry(&sample, format);
                    return Ok(SUCCESS);
                }
            }
            if Instant::now() >= deadline {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no telemetry within {}", args.wait_timeout),
                ));
            }
            thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    Ok(SUCCESS)
}
