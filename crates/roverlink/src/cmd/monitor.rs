use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use roverlink_bridge::{LinkConfig, LinkDriver};
use roverlink_frame::Telemetry;

use crate::cmd::{install_shutdown_handler, parse_duration, parse_endpoint, MonitorArgs};
use crate::exit::{CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_telemetry, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

pub fn run(args: MonitorArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let first_frame_deadline = args
        .timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|timeout| Instant::now() + timeout);

    let config = LinkConfig {
        baud: args.baud,
        ..LinkConfig::default()
    };
    let mut driver = LinkDriver::new(endpoint, config);

    let shutdown = install_shutdown_handler()?;

    let mut printed = 0usize;
    while !shutdown.load(Ordering::SeqCst) {
        for frame in driver.poll_receive(Instant::now()) {
            match Telemetry::try_from(&frame) {
                Ok(sample) => {
                    print_telemetry(&sample, format);
                    printed = printed.saturating_add(1);
                    if let Some(count) = args.count {
                        if printed >= count {
                            return Ok(SUCCESS);
                        }
                    }
                }
                Err(err) => debug!(msg_id = frame.msg_id, error = %err, "skipping frame"),
            }
        }

        if printed == 0 {
            if let Some(deadline) = first_frame_deadline {
                if Instant::now() >= deadline {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no telemetry received within {}", args.timeout.unwrap_or_default()),
                    ));
                }
            }
        }

        thread::sleep(POLL_INTERVAL);
    }

    Ok(SUCCESS)
}
