//! End-to-end bridge tests with a scripted peer standing in for the
//! motor controller firmware.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::BytesMut;

use roverlink_bridge::{
    ArbiterConfig, BridgeConfig, CommandArbiter, ControlLoop, LinkConfig, LinkDriver, LinkMode,
    LoopConfig,
};
use roverlink_frame::{StreamDecoder, Telemetry, VelocityCommand};
use roverlink_transport::{LinkStream, MemoryLink};

fn fast_loop_config() -> LoopConfig {
    LoopConfig {
        tick_period: Duration::from_millis(2),
        heartbeat_interval: Duration::from_millis(10),
        command_epsilon: 1e-4,
    }
}

fn wait_until(deadline: Duration, mut check: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + deadline;
    while Instant::now() < end {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn memory_loopback_round_trip() {
    let (near, mut far) = MemoryLink::pair();
    let driver = LinkDriver::from_stream(Box::new(near), LinkConfig::default());
    let arbiter = Arc::new(CommandArbiter::new(ArbiterConfig::default()));
    let handle = ControlLoop::new(driver, Arc::clone(&arbiter), fast_loop_config())
        .spawn()
        .unwrap();

    arbiter.submit_teleop(0.3, 0.5).unwrap();

    // The firmware side answers with one telemetry frame.
    let sample = Telemetry {
        battery_voltage: 12.5,
        accel_z: -9.81,
        ..Telemetry::default()
    };
    let mut buf = BytesMut::new();
    sample.encode_framed(&mut buf).unwrap();
    far.write_all(&buf).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            arbiter.snapshot(Instant::now()).telemetry.valid
        }),
        "telemetry never reached the arbiter"
    );

    // Keep teleop fresh so the mode assertion is not timing dependent.
    arbiter.submit_teleop(0.3, 0.5).unwrap();
    let snap = arbiter.snapshot(Instant::now());
    assert_eq!(snap.mode, LinkMode::Teleop);
    assert_eq!(snap.telemetry.sample.unwrap().battery_voltage, 12.5);
    assert_eq!(snap.telemetry.sample.unwrap().accel_z, -9.81);
    assert!(snap.link.connected);
    assert_eq!(snap.link.stats.frames_decoded, 1);

    handle.stop();

    let mut decoder = StreamDecoder::new();
    let mut chunk = [0u8; 1024];
    while let Ok(n) = far.read(&mut chunk) {
        if n == 0 {
            break;
        }
        decoder.extend(&chunk[..n]);
    }
    let mut cmds = Vec::new();
    while let Some(frame) = decoder.next_frame() {
        cmds.push(VelocityCommand::try_from(&frame).unwrap());
    }
    assert!(cmds.contains(&VelocityCommand::new(0.3, 0.5)));
    assert_eq!(*cmds.last().unwrap(), VelocityCommand::ZERO);
}

#[test]
fn link_loss_is_visible_in_snapshots() {
    let (near, far) = MemoryLink::pair();
    let driver = LinkDriver::from_stream(Box::new(near), LinkConfig::default());
    let arbiter = Arc::new(CommandArbiter::new(ArbiterConfig::default()));
    let handle = ControlLoop::new(driver, Arc::clone(&arbiter), fast_loop_config())
        .spawn()
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            arbiter.snapshot(Instant::now()).link.connected
        }),
        "link never reported connected"
    );

    drop(far);

    assert!(
        wait_until(Duration::from_secs(2), || {
            !arbiter.snapshot(Instant::now()).link.connected
        }),
        "link loss never surfaced"
    );
}

#[test]
fn tcp_endpoint_end_to_end() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = BridgeConfig::new(format!("tcp:{addr}").parse().unwrap());
    config.control = fast_loop_config();
    let (arbiter, control) = config.build();
    let handle = control.spawn().unwrap();

    let (mut conn, _) = listener.accept().unwrap();
    conn.set_read_timeout(Some(Duration::from_millis(100))).unwrap();

    // The idle loop heartbeats the stop command; wait for one frame.
    let mut decoder = StreamDecoder::new();
    let deadline = Instant::now() + Duration::from_secs(2);
    let first = loop {
        if let Some(frame) = decoder.next_frame() {
            break frame;
        }
        assert!(Instant::now() < deadline, "no command frame arrived");
        let mut chunk = [0u8; 256];
        match conn.read(&mut chunk) {
            Ok(0) => panic!("bridge closed the connection"),
            Ok(n) => decoder.extend(&chunk[..n]),
            Err(_) => {}
        }
    };
    assert_eq!(
        VelocityCommand::try_from(&first).unwrap(),
        VelocityCommand::ZERO
    );

    let mut buf = BytesMut::new();
    Telemetry {
        battery_voltage: 11.8,
        ..Telemetry::default()
    }
    .encode_framed(&mut buf)
    .unwrap();
    conn.write_all(&buf).unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            let snap = arbiter.snapshot(Instant::now());
            snap.telemetry.valid
                && snap.telemetry.sample.unwrap().battery_voltage == 11.8
        }),
        "telemetry never surfaced over TCP"
    );

    handle.stop();
}
