//! The 50 Hz control loop.
//!
//! Each tick resolves the arbiter's winning command, sends it when it
//! changed or the heartbeat interval elapsed, and drains telemetry back
//! into the arbiter. Ticks are scheduled against absolute deadlines so
//! jitter in one tick does not accumulate into drift.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use tracing::{debug, info, warn};

use roverlink_frame::{Telemetry, VelocityCommand};

use crate::arbiter::CommandArbiter;
use crate::config::LoopConfig;
use crate::driver::LinkDriver;

pub struct ControlLoop {
    driver: LinkDriver,
    arbiter: Arc<CommandArbiter>,
    config: LoopConfig,
    last_sent: Option<VelocityCommand>,
    last_send_at: Option<Instant>,
    send_ok: bool,
    last_telemetry_at: Option<Instant>,
    telemetry_ok: bool,
}

impl ControlLoop {
    pub fn new(driver: LinkDriver, arbiter: Arc<CommandArbiter>, config: LoopConfig) -> Self {
        Self {
            driver,
            arbiter,
            config,
            last_sent: None,
            last_send_at: None,
            send_ok: true,
            last_telemetry_at: None,
            telemetry_ok: true,
        }
    }

    /// Run until `shutdown` is set, then flush a stop command.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            period_ms = self.config.tick_period.as_millis() as u64,
            "control loop started"
        );
        let period = self.config.tick_period;
        let mut deadline = Instant::now() + period;
        while !shutdown.load(Ordering::Relaxed) {
            self.tick(Instant::now());

            let now = Instant::now();
            match deadline.checked_duration_since(now) {
                Some(wait) => {
                    thread::sleep(wait);
                    deadline += period;
                }
                None => {
                    let overrun = now - deadline;
                    if overrun > period {
                        // Way behind, re-anchor rather than burst-send a
                        // backlog of ticks.
                        debug!(
                            overrun_us = overrun.as_micros() as u64,
                            "tick overrun, re-anchoring schedule"
                        );
                        deadline = now + period;
                    } else {
                        deadline += period;
                    }
                }
            }
        }
        self.flush_stop();
        info!("control loop stopped");
    }

    /// One scheduling step: arbitrate, send if due, drain telemetry.
    fn tick(&mut self, now: Instant) {
        let (cmd, _mode) = self.arbiter.effective_command(now);

        let changed = match &self.last_sent {
            Some(last) => !cmd.approx_eq(last, self.config.command_epsilon),
            None => true,
        };
        let heartbeat_due = match self.last_send_at {
            Some(at) => now.saturating_duration_since(at) >= self.config.heartbeat_interval,
            None => true,
        };

        if changed || heartbeat_due {
            match self.driver.send_velocity(cmd, now) {
                Ok(()) => {
                    self.last_sent = Some(cmd);
                    self.last_send_at = Some(now);
                    if !self.send_ok {
                        self.send_ok = true;
                        info!("command transmission restored");
                    }
                }
                Err(err) => {
                    // Logged once per outage, not per tick.
                    if self.send_ok {
                        self.send_ok = false;
                        warn!(error = %err, "command transmission failing");
                    }
                }
            }
        }

        for frame in self.driver.poll_receive(now) {
            match Telemetry::try_from(&frame) {
                Ok(sample) => {
                    self.arbiter.record_telemetry(sample, now);
                    self.last_telemetry_at = Some(now);
                }
                Err(err) => {
                    debug!(msg_id = frame.msg_id, error = %err, "ignoring non-telemetry frame");
                }
            }
        }

        // Staleness is logged on the transition, not every quiet tick.
        if let Some(at) = self.last_telemetry_at {
            let stale =
                now.saturating_duration_since(at) > self.arbiter.config().telemetry_stale_after;
            if stale && self.telemetry_ok {
                self.telemetry_ok = false;
                warn!("telemetry stale");
            } else if !stale && !self.telemetry_ok {
                self.telemetry_ok = true;
                info!("telemetry restored");
            }
        }

        self.arbiter
            .record_link_status(self.driver.connected(), self.driver.stats());
    }

    /// Best-effort stop command so the rover halts when the bridge exits.
    fn flush_stop(&mut self) {
        match self.driver.send_velocity(VelocityCommand::ZERO, Instant::now()) {
            Ok(()) => debug!("stop command flushed at shutdown"),
            Err(err) => warn!(error = %err, "stop command not delivered at shutdown"),
        }
    }

    /// Run the loop on a dedicated thread. The returned handle stops and
    /// joins it, flushing the stop command on the way out.
    pub fn spawn(mut self) -> std::io::Result<LoopHandle> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let thread = thread::Builder::new()
            .name("roverlink-control".into())
            .spawn(move || self.run(&flag))?;
        Ok(LoopHandle {
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Handle to a running control loop thread.
pub struct LoopHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl LoopHandle {
    /// Flag other code can use to request shutdown, e.g. from a signal
    /// handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the loop to stop and wait for it to finish.
    pub fn stop(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("control loop thread panicked");
            }
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use bytes::BytesMut;

    use roverlink_frame::StreamDecoder;
    use roverlink_transport::{LinkStream, MemoryLink};

    use crate::arbiter::CommandSource;
    use crate::config::{ArbiterConfig, LinkConfig};

    fn test_loop() -> (ControlLoop, Arc<CommandArbiter>, MemoryLink) {
        let (near, far) = MemoryLink::pair();
        let driver = LinkDriver::from_stream(Box::new(near), LinkConfig::default());
        let arbiter = Arc::new(CommandArbiter::new(ArbiterConfig::default()));
        let config = LoopConfig {
            tick_period: Duration::from_millis(2),
            heartbeat_interval: Duration::from_millis(10),
            command_epsilon: 1e-4,
        };
        let control = ControlLoop::new(driver, Arc::clone(&arbiter), config);
        (control, arbiter, far)
    }

    fn drain_commands(far: &mut MemoryLink) -> Vec<VelocityCommand> {
        let mut decoder = StreamDecoder::new();
        let mut chunk = [0u8; 256];
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
        cmds
    }

    #[test]
    fn first_tick_sends_the_idle_command() {
        let (mut control, _arbiter, mut far) = test_loop();
        control.tick(Instant::now());
        assert_eq!(drain_commands(&mut far), vec![VelocityCommand::ZERO]);
    }

    #[test]
    fn unchanged_command_waits_for_heartbeat() {
        let (mut control, arbiter, mut far) = test_loop();
        let t0 = Instant::now();
        arbiter.submit(CommandSource::Teleop, 0.5, 0.0, t0).unwrap();

        control.tick(t0);
        assert_eq!(drain_commands(&mut far).len(), 1);

        // Same command, heartbeat not yet due.
        control.tick(t0 + Duration::from_millis(2));
        control.tick(t0 + Duration::from_millis(4));
        assert!(drain_commands(&mut far).is_empty());

        // Heartbeat interval elapsed, resend.
        control.tick(t0 + Duration::from_millis(11));
        assert_eq!(
            drain_commands(&mut far),
            vec![VelocityCommand::new(0.5, 0.0)]
        );
    }

    #[test]
    fn changed_command_sends_immediately() {
        let (mut control, arbiter, mut far) = test_loop();
        let t0 = Instant::now();
        arbiter.submit(CommandSource::Teleop, 0.5, 0.0, t0).unwrap();
        control.tick(t0);
        drain_commands(&mut far);

        arbiter
            .submit(CommandSource::Teleop, 0.3, 0.1, t0 + Duration::from_millis(1))
            .unwrap();
        control.tick(t0 + Duration::from_millis(2));
        assert_eq!(
            drain_commands(&mut far),
            vec![VelocityCommand::new(0.3, 0.1)]
        );
    }

    #[test]
    fn sub_epsilon_changes_do_not_resend() {
        let (mut control, arbiter, mut far) = test_loop();
        let t0 = Instant::now();
        arbiter.submit(CommandSource::Teleop, 0.5, 0.0, t0).unwrap();
        control.tick(t0);
        drain_commands(&mut far);

        arbiter
            .submit(
                CommandSource::Teleop,
                0.500_05,
                0.0,
                t0 + Duration::from_millis(1),
            )
            .unwrap();
        control.tick(t0 + Duration::from_millis(2));
        assert!(drain_commands(&mut far).is_empty());
    }

    #[test]
    fn source_timeout_triggers_a_stop_send() {
        let (mut control, arbiter, mut far) = test_loop();
        let t0 = Instant::now();
        arbiter.submit(CommandSource::Teleop, 0.5, 0.0, t0).unwrap();
        control.tick(t0);
        drain_commands(&mut far);

        // Past the teleop timeout the arbitrated command drops to zero,
        // which differs from the last send and goes out at once.
        control.tick(t0 + Duration::from_millis(600));
        assert_eq!(drain_commands(&mut far), vec![VelocityCommand::ZERO]);
    }

    #[test]
    fn telemetry_is_recorded_into_the_arbiter() {
        let (mut control, arbiter, mut far) = test_loop();
        let sample = Telemetry {
            battery_voltage: 12.5,
            gyro_z: 0.25,
            ..Telemetry::default()
        };
        let mut buf = BytesMut::new();
        sample.encode_framed(&mut buf).unwrap();
        far.write_all(&buf).unwrap();

        let now = Instant::now();
        control.tick(now);

        let snap = arbiter.snapshot(now);
        assert!(snap.telemetry.valid);
        let got = snap.telemetry.sample.unwrap();
        assert_eq!(got.battery_voltage, 12.5);
        assert_eq!(got.gyro_z, 0.25);
        assert!(snap.link.connected);
        assert_eq!(snap.link.stats.frames_decoded, 1);
    }

    #[test]
    fn flush_stop_sends_zero() {
        let (mut control, arbiter, mut far) = test_loop();
        let t0 = Instant::now();
        arbiter.submit(CommandSource::Teleop, 0.5, 0.0, t0).unwrap();
        control.tick(t0);
        drain_commands(&mut far);

        control.flush_stop();
        assert_eq!(drain_commands(&mut far), vec![VelocityCommand::ZERO]);
    }

    #[test]
    fn send_outage_is_reported_through_link_status() {
        let (mut control, arbiter, far) = test_loop();
        drop(far);

        let now = Instant::now();
        control.tick(now);
        control.tick(now + Duration::from_millis(2));

        let snap = arbiter.snapshot(now + Duration::from_millis(2));
        assert!(!snap.link.connected);
        assert_eq!(snap.link.stats.send_failures, 1);
    }

    #[test]
    fn spawned_loop_heartbeats_and_stops_on_shutdown() {
        let (control, arbiter, mut far) = test_loop();
        let handle = control.spawn().unwrap();
        arbiter.submit_teleop(0.4, 0.0).unwrap();

        thread::sleep(Duration::from_millis(60));
        handle.stop();

        let cmds = drain_commands(&mut far);
        // Several heartbeats of the teleop command, then the shutdown stop.
        assert!(cmds.len() >= 3, "expected heartbeats, got {cmds:?}");
        assert!(cmds.contains(&VelocityCommand::new(0.4, 0.0)));
        assert_eq!(*cmds.last().unwrap(), VelocityCommand::ZERO);
    }
}
