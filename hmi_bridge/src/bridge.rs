/*!
Bridge runtime.

Wires the two links together:
1. Telemetry thread: serial port -> frame dispatcher -> [`BridgeEvent`]s
2. Pusher thread: [`BridgeEvent`]s -> screen state -> HMI commands
3. Both threads share one running flag, cleared by Ctrl+C
*/

use crate::config::BridgeConfig;
use crate::serial::SerialChannel;
use anyhow::{anyhow, Result};
use chrono::Local;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use shared::{
    BridgeEvent, ByteChannel, DispatcherTimeouts, EventCallbacks, FrameDispatcher, FrameEvent,
    ScreenCodec, ScreenEvent, ScreenPusher, SharedScreenState, TelemetryCodec,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{error, info, warn};

/// Messages queued between the telemetry and pusher threads
const EVENT_QUEUE_DEPTH: usize = 1024;

pub struct HmiBridge {
    config: BridgeConfig,
    running: Arc<AtomicBool>,
}

impl HmiBridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Open both links and run until the running flag is cleared
    pub fn start(&mut self) -> Result<()> {
        self.config.validate()?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        info!("🕒 Bridge session started at {}", timestamp);

        let telemetry = SerialChannel::open(
            &self.config.telemetry.port,
            self.config.telemetry.baud_rate,
        )?;
        let hmi = open_optional(self.config.hmi.port.as_deref(), self.config.hmi.baud_rate);

        let (event_tx, event_rx) = bounded::<BridgeEvent>(EVENT_QUEUE_DEPTH);

        let mut dispatcher = build_dispatcher(
            telemetry,
            self.config.dispatcher_timeouts(),
            Arc::clone(&self.running),
            event_tx,
        );
        let mut pusher = build_pusher(hmi, &self.config, Arc::clone(&self.running), event_rx)?;

        let live_output = self.config.output.live;

        let dispatcher_handle = thread::spawn(move || {
            dispatcher.run(|event| {
                if live_output {
                    print_live(event);
                }
            })
        });

        let pusher_handle = thread::spawn(move || {
            pusher.send_all();
            pusher.run();
            pusher.stats()
        });

        let dispatcher_result = dispatcher_handle.join();
        // The pusher shares the flag, but stop it explicitly if the
        // dispatcher thread died on its own
        self.running.store(false, Ordering::SeqCst);
        let pusher_result = pusher_handle.join();

        let stats = dispatcher_result.map_err(|_| anyhow!("Telemetry thread panicked"))?;
        let (commands_sent, panel_frames) =
            pusher_result.map_err(|_| anyhow!("Pusher thread panicked"))?;

        info!(
            "✅ Bridge stopped: {} frames decoded, {} commands sent, {} panel frames",
            stats.frames_decoded, commands_sent, panel_frames
        );
        Ok(())
    }
}

/// Open the panel port if one is configured. A port that fails to open is
/// logged and the bridge carries on without a display.
pub fn open_optional(port: Option<&str>, baud_rate: u32) -> Option<SerialChannel> {
    let Some(port) = port else {
        info!("No HMI port configured");
        return None;
    };

    match SerialChannel::open(port, baud_rate) {
        Ok(channel) => Some(channel),
        Err(e) => {
            warn!("⚠️ HMI port unavailable, continuing without display: {:#}", e);
            None
        }
    }
}

/// Dispatcher for the telemetry link.
///
/// Telemetry readings and start presses seen on this link are forwarded to
/// the pusher through `events`.
pub fn build_dispatcher<C: ByteChannel>(
    channel: C,
    timeouts: DispatcherTimeouts,
    running: Arc<AtomicBool>,
    events: Sender<BridgeEvent>,
) -> FrameDispatcher<C> {
    let mut dispatcher = FrameDispatcher::new(channel)
        .with_timeouts(timeouts)
        .with_running_flag(running);

    let readings = events.clone();
    dispatcher.add_codec(TelemetryCodec::with_sink(move |reading| {
        forward(&readings, BridgeEvent::Reading(reading));
    }));

    let callbacks = EventCallbacks::new();
    callbacks.register(ScreenEvent::StartButton, move || {
        forward(&events, BridgeEvent::StartPressed);
    });
    dispatcher.add_codec(ScreenCodec::new(SharedScreenState::new(), callbacks));

    dispatcher
}

/// Pusher for the HMI link, seeded with the configured geometry
pub fn build_pusher<C: ByteChannel>(
    channel: Option<C>,
    config: &BridgeConfig,
    running: Arc<AtomicBool>,
    events: Receiver<BridgeEvent>,
) -> Result<ScreenPusher<C>> {
    let state = SharedScreenState::new();
    state.set_distance(config.hmi.distance);
    state.set_side_length(config.hmi.side_length);

    let pusher = ScreenPusher::new(channel, state, EventCallbacks::new(), config.pusher_config())?
        .with_inbox(events)
        .with_running_flag(running);
    Ok(pusher)
}

fn forward(events: &Sender<BridgeEvent>, event: BridgeEvent) {
    match events.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => warn!("Pusher queue full, dropping {:?}", dropped),
        Err(TrySendError::Disconnected(_)) => {}
    }
}

/// One JSON line per decoded frame on stdout
fn print_live(event: &FrameEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => error!("Failed to serialize frame event: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use shared::{DisplayField, ScriptedChannel, TelemetryReading};

    const REFERENCE_FRAME: [u8; 20] = [
        0xAA, 0xAA, 0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x00, 0x00, 0x00,
        0x00, 0x00, 0x00, 0xFF, 0xFF,
    ];
    const START_FRAME: [u8; 7] = [0x65, 0x01, 0x02, 0x01, 0xFF, 0xFF, 0xFF];

    #[test]
    fn test_dispatcher_forwards_readings_and_start() {
        let mut channel = ScriptedChannel::with_bytes("telemetry", &REFERENCE_FRAME);
        channel.push_bytes(&START_FRAME);

        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let mut dispatcher =
            build_dispatcher(channel, DispatcherTimeouts::default(), running, tx);

        assert!(dispatcher.poll_once());
        assert!(dispatcher.poll_once());

        let events: Vec<BridgeEvent> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![
                BridgeEvent::Reading(TelemetryReading {
                    current: 1.0,
                    power: 1.0
                }),
                BridgeEvent::StartPressed,
            ]
        );
    }

    #[test]
    fn test_end_to_end_through_pusher() {
        let channel = ScriptedChannel::with_bytes("telemetry", &REFERENCE_FRAME);
        let hmi = ScriptedChannel::new("hmi");
        let log = hmi.write_log();

        let (tx, rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));
        let mut dispatcher = build_dispatcher(
            channel,
            DispatcherTimeouts::default(),
            Arc::clone(&running),
            tx,
        );
        let mut pusher = build_pusher(Some(hmi), &BridgeConfig::new(), running, rx).unwrap();

        assert!(dispatcher.poll_once());
        pusher.run_cycle();

        let text = String::from_utf8_lossy(&log.bytes()).into_owned();
        assert!(text.contains("t2.txt=\"1.000\""));
        assert!(text.contains("t3.txt=\"1.000\""));
        assert!(text.contains("t4.txt=\"1.000\""));
        assert!(!text.contains(DisplayField::Distance.token()));
    }

    #[test]
    fn test_pusher_seeded_with_config_geometry() {
        let mut config = BridgeConfig::new();
        config.hmi.distance = 12.5;
        config.hmi.side_length = 3.0;

        let (_tx, rx) = unbounded();
        let pusher = build_pusher::<ScriptedChannel>(
            None,
            &config,
            Arc::new(AtomicBool::new(true)),
            rx,
        )
        .unwrap();

        let values = pusher.state().snapshot();
        assert_eq!(values.distance, 12.5);
        assert_eq!(values.side_length, 3.0);
    }

    #[test]
    fn test_missing_telemetry_port_is_fatal() {
        let mut config = BridgeConfig::new();
        config.telemetry.port = "/dev/hmi-bridge-no-telemetry".to_string();
        config.hmi.port = None;

        let mut bridge = HmiBridge::new(config);
        let err = bridge.start().unwrap_err();
        assert!(format!("{:#}", err).contains("/dev/hmi-bridge-no-telemetry"));
    }

    #[test]
    fn test_missing_hmi_port_runs_blind() {
        assert!(open_optional(Some("/dev/hmi-bridge-no-panel"), 9600).is_none());
        assert!(open_optional(None, 9600).is_none());
    }

    #[test]
    fn test_forward_ignores_disconnected_pusher() {
        let (tx, rx) = bounded(1);
        drop(rx);
        forward(&tx, BridgeEvent::StartPressed);
    }
}
