//! Outbound input pump with sequencing and send-rate limiting.
//!
//! The host may tick much faster than the network rate; the pump only emits
//! a frame once a full send interval has passed since the previous one.

use crate::presentation::LocalControls;
use shared::{send_interval, InputFrame, Role};
use std::time::Duration;
use tokio::time::Instant;

pub struct InputPump {
    send_interval: Duration,
    last_sent: Option<Instant>,
    next_sequence: u64,
}

impl InputPump {
    pub fn new(rate_hz: u32) -> Self {
        Self {
            send_interval: send_interval(rate_hz),
            last_sent: None,
            next_sequence: 1,
        }
    }

    pub fn send_interval(&self) -> Duration {
        self.send_interval
    }

    /// Sequence stamp the next frame will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Called once per host tick. Returns a frame when one is due and the
    /// host has a ship to report.
    pub fn poll(
        &mut self,
        now: Instant,
        controls: Option<LocalControls>,
        role: Option<Role>,
    ) -> Option<InputFrame> {
        let controls = controls?;

        if let Some(last) = self.last_sent {
            if now.saturating_duration_since(last) < self.send_interval {
                return None;
            }
        }

        let [x, y, z] = controls.position;
        let frame = InputFrame {
            seq: self.next_sequence,
            throttle: controls.throttle(),
            pitch: controls.pitch,
            yaw: controls.yaw,
            fire: controls.fire,
            // Only haulers carry a tractor beam.
            tractor: (role == Some(Role::Hauler)).then_some(controls.tractor),
            x: Some(x),
            y: Some(y),
            z: Some(z),
        };

        self.next_sequence += 1;
        self.last_sent = Some(now);
        Some(frame)
    }

    /// Forget the last send time so the next poll sends immediately.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

impl Default for InputPump {
    fn default() -> Self {
        Self::new(shared::INPUT_SEND_RATE)
    }
}
