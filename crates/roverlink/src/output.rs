use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

use roverlink_bridge::StateSnapshot;
use roverlink_frame::Telemetry;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct TelemetryOutput<'a> {
    schema_id: &'static str,
    #[serde(flatten)]
    sample: &'a Telemetry,
    timestamp: String,
}

pub fn print_telemetry(sample: &Telemetry, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = TelemetryOutput {
                schema_id: "https://schemas.openrover.dev/roverlink/cli/v1/telemetry.schema.json",
                sample,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "TARGET RPM L/R",
                    "ACTUAL RPM L/R",
                    "BATTERY",
                    "ACCEL XYZ",
                    "GYRO XYZ",
                ])
                .add_row(vec![
                    format!("{:.1} / {:.1}", sample.left_target_rpm, sample.right_target_rpm),
                    format!("{:.1} / {:.1}", sample.left_actual_rpm, sample.right_actual_rpm),
                    format!("{:.2} V", sample.battery_voltage),
                    format!("{:.2} {:.2} {:.2}", sample.accel_x, sample.accel_y, sample.accel_z),
                    format!("{:.2} {:.2} {:.2}", sample.gyro_x, sample.gyro_y, sample.gyro_z),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "rpm target={:.1}/{:.1} actual={:.1}/{:.1} battery={:.2}V accel=({:.2},{:.2},{:.2}) gyro=({:.2},{:.2},{:.2})",
                sample.left_target_rpm,
                sample.right_target_rpm,
                sample.left_actual_rpm,
                sample.right_actual_rpm,
                sample.battery_voltage,
                sample.accel_x,
                sample.accel_y,
                sample.accel_z,
                sample.gyro_x,
                sample.gyro_y,
                sample.gyro_z
            );
        }
        OutputFormat::Raw => {
            println!(
                "{} {} {} {} {} {} {} {} {} {} {}",
                sample.left_target_rpm,
                sample.right_target_rpm,
                sample.left_actual_rpm,
                sample.right_actual_rpm,
                sample.battery_voltage,
                sample.accel_x,
                sample.accel_y,
                sample.accel_z,
                sample.gyro_x,
                sample.gyro_y,
                sample.gyro_z
            );
        }
    }
}

#[derive(Serialize)]
struct SnapshotOutput<'a> {
    schema_id: &'static str,
    #[serde(flatten)]
    snapshot: &'a StateSnapshot,
    timestamp: String,
}

pub fn print_snapshot(snapshot: &StateSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = SnapshotOutput {
                schema_id: "https://schemas.openrover.dev/roverlink/cli/v1/bridge-status.schema.json",
                snapshot,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"])
                .add_row(vec!["mode".to_string(), snapshot.mode.name().to_string()])
                .add_row(vec![
                    "command".to_string(),
                    format!(
                        "{:.3} m/s, {:.3} rad/s",
                        snapshot.command.linear_mps, snapshot.command.angular_rps
                    ),
                ])
                .add_row(vec!["teleop".to_string(), source_text(&snapshot.teleop)])
                .add_row(vec!["autonomy".to_string(), source_text(&snapshot.autonomy)])
                .add_row(vec![
                    "telemetry".to_string(),
                    telemetry_text(&snapshot.telemetry),
                ])
                .add_row(vec![
                    "link".to_string(),
                    format!(
                        "{} (frames={} resyncs={} reconnects={})",
                        if snapshot.link.connected { "connected" } else { "down" },
                        snapshot.link.stats.frames_decoded,
                        snapshot.link.stats.resyncs,
                        snapshot.link.stats.reconnects
                    ),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Bridge status:");
            println!("  Mode:      {}", snapshot.mode.name());
            println!(
                "  Command:   {:.3} m/s, {:.3} rad/s",
                snapshot.command.linear_mps, snapshot.command.angular_rps
            );
            println!("  Teleop:    {}", source_text(&snapshot.teleop));
            println!("  Autonomy:  {}", source_text(&snapshot.autonomy));
            println!("  Telemetry: {}", telemetry_text(&snapshot.telemetry));
            println!(
                "  Link:      {} (frames={} resyncs={} send_failures={} reconnects={})",
                if snapshot.link.connected { "connected" } else { "down" },
                snapshot.link.stats.frames_decoded,
                snapshot.link.stats.resyncs,
                snapshot.link.stats.send_failures,
                snapshot.link.stats.reconnects
            );
        }
        OutputFormat::Raw => {
            println!("{}", snapshot.mode.name());
        }
    }
}

fn source_text(source: &roverlink_bridge::SourceStatus) -> String {
    match (&source.command, source.age_s) {
        (Some(cmd), Some(age)) => format!(
            "{} ({:.3} m/s, {:.3} rad/s, {age:.2}s ago)",
            if source.fresh { "fresh" } else { "stale" },
            cmd.linear_mps,
            cmd.angular_rps
        ),
        _ => "never".to_string(),
    }
}

fn telemetry_text(telemetry: &roverlink_bridge::TelemetryStatus) -> String {
    match (&telemetry.sample, telemetry.age_s) {
        (Some(sample), Some(age)) => format!(
            "{} (battery={:.2}V, {age:.2}s ago)",
            if telemetry.valid { "valid" } else { "stale" },
            sample.battery_voltage
        ),
        _ => "none".to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telemetry_json_flattens_sample_fields() {
        let sample = Telemetry {
            battery_voltage: 12.5,
            ..Telemetry::default()
        };
        let out = TelemetryOutput {
            schema_id: "x",
            sample: &sample,
            timestamp: "0".to_string(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["battery_voltage"], 12.5);
        assert_eq!(json["schema_id"], "x");
    }

    #[test]
    fn source_text_reports_missing_sources() {
        let status = roverlink_bridge::SourceStatus {
            command: None,
            age_s: None,
            fresh: false,
        };
        assert_eq!(source_text(&status), "never");
    }
}
