use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use roverlink_bridge::{LinkConfig, LinkDriver};
use roverlink_frame::Telemetry;

use crate::cmd::{parse_duration, parse_endpoint, ProbeArgs};
use crate::exit::{transport_error, CliResult, SUCCESS, TIMEOUT};
use crate::output::OutputFormat;

#[derive(Serialize)]
struct ProbeOutput {
    schema_id: &'static str,
    endpoint: String,
    connected: bool,
    telemetry_seen: bool,
    battery_voltage: Option<f32>,
    frames_decoded: u64,
    resyncs: u64,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let timeout = parse_duration(&args.timeout)?;

    let config = LinkConfig {
        baud: args.baud,
        ..LinkConfig::default()
    };
    let stream = endpoint
        .open(args.baud)
        .map_err(|err| transport_error("open failed", err))?;
    let mut driver = LinkDriver::from_stream(stream, config);

    let deadline = Instant::now() + timeout;
    let mut first: Option<Telemetry> = None;
    'listen: while Instant::now() < deadline {
        for frame in driver.poll_receive(Instant::now()) {
            if let Ok(sample) = Telemetry::try_from(&frame) {
                first = Some(sample);
                break 'listen;
            }
        }
        thread::sleep(Duration::from_millis(10));
    }

    let stats = driver.stats();
    let out = ProbeOutput {
        schema_id: "https://schemas.openrover.dev/roverlink/cli/v1/probe-report.schema.json",
        endpoint: args.endpoint.clone(),
        connected: driver.connected(),
        telemetry_seen: first.is_some(),
        battery_voltage: first.map(|sample| sample.battery_voltage),
        frames_decoded: stats.frames_decoded,
        resyncs: stats.resyncs,
    };
    print_probe(&out, format);

    if out.telemetry_seen {
        Ok(SUCCESS)
    } else {
        Ok(TIMEOUT)
    }
}

fn print_probe(out: &ProbeOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Link probe:");
            println!("  Endpoint:   {}", out.endpoint);
            println!(
                "  Connected:  {}",
                if out.connected { "yes" } else { "no" }
            );
            println!(
                "  Telemetry:  {}",
                if out.telemetry_seen { "seen" } else { "none" }
            );
            match out.battery_voltage {
                Some(v) => println!("  Battery:    {v:.2} V"),
                None => println!("  Battery:    unknown"),
            }
            println!("  Frames:     {}", out.frames_decoded);
            println!("  Resyncs:    {}", out.resyncs);
        }
        OutputFormat::Raw => {
            println!("{}", if out.telemetry_seen { "ok" } else { "silent" });
        }
    }
}
