//! Bridge demo against a scripted in-process controller.
//!
//! Run with:
//!   cargo run --example fake-controller
//!
//! A MemoryLink stands in for the UART. The far end plays the drive
//! firmware: it decodes each velocity command and answers with a
//! telemetry frame whose wheel targets track the command.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use roverlink::bridge::{
    ArbiterConfig, CommandArbiter, ControlLoop, LinkConfig, LinkDriver, LoopConfig,
};
use roverlink::frame::{StreamDecoder, Telemetry, VelocityCommand};
use roverlink::transport::{LinkStream, MemoryLink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (near, mut far) = MemoryLink::pair();
    let driver = LinkDriver::from_stream(Box::new(near), LinkConfig::default());
    let arbiter = Arc::new(CommandArbiter::new(ArbiterConfig::default()));
    let handle =
        ControlLoop::new(driver, Arc::clone(&arbiter), LoopConfig::default()).spawn()?;

    let firmware = thread::spawn(move || {
        let mut decoder = StreamDecoder::new();
        let mut chunk = [0u8; 256];
        let mut seen = 0u32;
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            match far.read(&mut chunk) {
                Ok(0) => thread::sleep(Duration::from_millis(5)),
                Ok(n) => decoder.extend(&chunk[..n]),
                Err(_) => break,
            }
            while let Some(frame) = decoder.next_frame() {
                let Ok(cmd) = VelocityCommand::try_from(&frame) else {
                    continue;
                };
                seen += 1;
                eprintln!(
                    "[firmware] command #{seen}: {:.2} m/s, {:.2} rad/s",
                    cmd.linear_mps, cmd.angular_rps
                );
                let rpm = cmd.linear_mps * 100.0;
                let reply = Telemetry {
                    left_target_rpm: rpm,
                    right_target_rpm: rpm,
                    battery_voltage: 12.4,
                    ..Telemetry::default()
                };
                let mut buf = BytesMut::new();
                if reply.encode_framed(&mut buf).is_ok() {
                    let _ = far.write_all(&buf);
                }
            }
        }
        seen
    });

    // Drive forward for a second, steering teleop at 10 Hz.
    for i in 0..10 {
        arbiter.submit_teleop(0.3, 0.05 * i as f32)?;
        thread::sleep(Duration::from_millis(100));
    }

    let snap = arbiter.snapshot(Instant::now());
    eprintln!(
        "[host] mode={} telemetry_valid={} frames={}",
        snap.mode.name(),
        snap.telemetry.valid,
        snap.link.stats.frames_decoded
    );

    handle.stop();
    let answered = firmware.join().expect("firmware thread should not panic");
    eprintln!("[host] firmware answered {answered} commands");
    Ok(())
}
