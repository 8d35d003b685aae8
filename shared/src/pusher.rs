/*!
Display pusher.

Owns the HMI link. Every cycle it applies messages from the telemetry side,
pushes changed values to the panel, keeps the max-power field refreshed and
checks for one inbound button frame. The link is only touched from this
loop, so it needs no locking.
*/

use crate::channel::ByteChannel;
use crate::codec::FrameCodec;
use crate::command::{command_text, DisplayField};
use crate::error::{Result, SharedError};
use crate::protocol::{COMMAND_TERMINATOR, SCREEN_FRAME_LEN, SCREEN_SENTINEL};
use crate::screen::{EventCallbacks, ScreenCodec};
use crate::state::{ScreenState, SharedScreenState};
use crate::telemetry::TelemetryReading;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Messages from other threads to the pusher
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BridgeEvent {
    /// New telemetry sample
    Reading(TelemetryReading),
    /// Start was pressed on a panel frame decoded elsewhere
    StartPressed,
    /// Replace the maximum power
    OverrideMaxPower(f32),
}

/// Pusher timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PusherConfig {
    /// Sleep between cycles
    pub interval: Duration,
    /// Wait for the rest of an inbound panel frame
    pub inbound_timeout: Duration,
}

impl Default for PusherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(50),
            inbound_timeout: Duration::from_millis(100),
        }
    }
}

impl PusherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(SharedError::config("push interval must be greater than zero"));
        }
        if self.inbound_timeout.is_zero() {
            return Err(SharedError::config("inbound timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Periodic HMI driver
pub struct ScreenPusher<C: ByteChannel> {
    /// `None` when the panel port could not be opened
    channel: Option<C>,
    codec: ScreenCodec,
    inbox: Option<Receiver<BridgeEvent>>,
    config: PusherConfig,
    running: Arc<AtomicBool>,
    last_logged: Option<String>,
    commands_sent: u64,
    frames_received: u64,
}

impl<C: ByteChannel> ScreenPusher<C> {
    /// Create a pusher over `channel` driving `state`
    pub fn new(
        channel: Option<C>,
        state: SharedScreenState,
        callbacks: EventCallbacks,
        config: PusherConfig,
    ) -> Result<Self> {
        config.validate()?;

        if channel.is_none() {
            warn!("⚠️ No HMI link, display updates will be dropped");
        }

        Ok(Self {
            channel,
            codec: ScreenCodec::new(state, callbacks),
            inbox: None,
            config,
            running: Arc::new(AtomicBool::new(true)),
            last_logged: None,
            commands_sent: 0,
            frames_received: 0,
        })
    }

    /// Apply [`BridgeEvent`]s from `inbox` at the start of every cycle
    pub fn with_inbox(mut self, inbox: Receiver<BridgeEvent>) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Share an externally owned running flag (e.g. one cleared by Ctrl+C)
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Ask the loop to exit after the current cycle
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Display state driven by this pusher
    pub fn state(&self) -> &SharedScreenState {
        self.codec.state()
    }

    /// Callbacks run for panel frames read on the HMI link
    pub fn callbacks(&self) -> &EventCallbacks {
        self.codec.callbacks()
    }

    /// (commands sent, inbound frames decoded)
    pub fn stats(&self) -> (u64, u64) {
        (self.commands_sent, self.frames_received)
    }

    /// Run cycles until the running flag is cleared
    pub fn run(&mut self) {
        info!(
            "🖥️ Display pusher started (interval {} ms)",
            self.config.interval.as_millis()
        );

        while self.running.load(Ordering::SeqCst) {
            self.run_cycle();
            thread::sleep(self.config.interval);
        }

        info!("📊 Display pusher final stats:");
        info!("   Commands sent: {}", self.commands_sent);
        info!("   Panel frames received: {}", self.frames_received);
    }

    /// One pass: apply messages, push values, check for one inbound frame
    pub fn run_cycle(&mut self) {
        self.drain_inbox();

        let pending = self.state().take_pending();
        let values = pending.values;

        if pending.send_measurements {
            self.send_field(DisplayField::Current, values.current);
            self.send_field(DisplayField::Power, values.power);
        }
        if pending.send_geometry {
            self.send_field(DisplayField::Distance, values.distance);
            self.send_field(DisplayField::SideLength, values.side_length);
        }
        self.send_field(DisplayField::MaxPower, values.max_power);

        self.poll_inbound();
    }

    /// Send every field regardless of pending flags
    pub fn send_all(&mut self) {
        let values = self.state().snapshot();
        for field in DisplayField::ALL {
            self.send_field(field, Self::field_value(&values, field));
        }
    }

    fn field_value(values: &ScreenState, field: DisplayField) -> f32 {
        match field {
            DisplayField::Distance => values.distance,
            DisplayField::SideLength => values.side_length,
            DisplayField::Current => values.current,
            DisplayField::Power => values.power,
            DisplayField::MaxPower => values.max_power,
        }
    }

    fn drain_inbox(&mut self) {
        let Some(inbox) = self.inbox.as_ref() else {
            return;
        };
        let state = self.codec.state();
        for event in inbox.try_iter() {
            match event {
                BridgeEvent::Reading(reading) => {
                    state.update_current_power(reading.current, reading.power)
                }
                BridgeEvent::StartPressed => state.notify_start_pressed(),
                BridgeEvent::OverrideMaxPower(value) => state.override_max_power(value),
            }
        }
    }

    /// Write one command as text then terminator, two unconfirmed writes
    fn send_field(&mut self, field: DisplayField, value: f32) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        let text = command_text(field.token(), value);
        if let Err(e) = channel.write_nonblocking(text.as_bytes()) {
            warn!("Write to {} failed: {}", channel.name(), e);
            return;
        }
        if let Err(e) = channel.write_nonblocking(&COMMAND_TERMINATOR) {
            warn!("Write to {} failed: {}", channel.name(), e);
            return;
        }
        self.commands_sent += 1;

        // The max-power heartbeat repeats every cycle; only log changes
        if self.last_logged.as_deref() != Some(text.as_str()) {
            info!("➡️ Panel command: {}", text);
            self.last_logged = Some(text);
        }
    }

    fn poll_inbound(&mut self) {
        let Some(channel) = self.channel.as_mut() else {
            return;
        };

        let mut lead = [0u8; 1];
        match channel.read_nonblocking(&mut lead) {
            Ok(1) if lead[0] == SCREEN_SENTINEL => {}
            Ok(_) => return,
            Err(e) => {
                warn!("Read from {} failed: {}", channel.name(), e);
                return;
            }
        }

        let mut frame = [0u8; SCREEN_FRAME_LEN];
        frame[0] = lead[0];
        let got = match channel.read_blocking(&mut frame[1..], self.config.inbound_timeout) {
            Ok(n) => n,
            Err(e) => {
                warn!("Read from {} failed: {}", channel.name(), e);
                return;
            }
        };
        if got != SCREEN_FRAME_LEN - 1 {
            debug!("Torn panel frame: {} of {} bytes", got + 1, SCREEN_FRAME_LEN);
            return;
        }

        match self.codec.decode(&frame) {
            Ok(_) => self.frames_received += 1,
            Err(e) => debug!("Dropping panel frame: {}", e),
        }
    }
}
