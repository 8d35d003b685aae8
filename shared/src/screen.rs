/*!
HMI touch panel input.

The panel reports button presses as 7-byte frames:

```text
65 | page | control | event | FF FF FF
```

Only `page` and `control` select the [`ScreenEvent`]; the `event` byte is
carried along for tracing.
*/

use crate::codec::{FrameCodec, FrameEvent};
use crate::error::{Result, SharedError};
use crate::protocol::{SCREEN_FRAME_LEN, SCREEN_SENTINEL, SCREEN_TERMINATOR};
use crate::state::SharedScreenState;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

const HEADER: [u8; 1] = [SCREEN_SENTINEL];

/// Step size of a camera exposure/threshold button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Adjustment {
    Plus1,
    Plus10,
    Plus100,
    Plus1000,
    Minus1,
    Minus10,
    Minus100,
    Minus1000,
}

impl Adjustment {
    /// Signed step value
    pub fn delta(self) -> i32 {
        match self {
            Adjustment::Plus1 => 1,
            Adjustment::Plus10 => 10,
            Adjustment::Plus100 => 100,
            Adjustment::Plus1000 => 1000,
            Adjustment::Minus1 => -1,
            Adjustment::Minus10 => -10,
            Adjustment::Minus100 => -100,
            Adjustment::Minus1000 => -1000,
        }
    }

    /// Pages 0x04 and 0x05 share the same control layout
    fn from_control(control: u8) -> Option<Self> {
        match control {
            0x02 => Some(Adjustment::Plus1),
            0x04 => Some(Adjustment::Plus10),
            0x05 => Some(Adjustment::Plus100),
            0x06 => Some(Adjustment::Plus1000),
            0x07 => Some(Adjustment::Minus1),
            0x08 => Some(Adjustment::Minus10),
            0x09 => Some(Adjustment::Minus100),
            0x0A => Some(Adjustment::Minus1000),
            _ => None,
        }
    }
}

/// Button events the panel can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenEvent {
    StartButton,
    Keypad0,
    Keypad1,
    Keypad2,
    Keypad3,
    Keypad4,
    Keypad5,
    Keypad6,
    Keypad7,
    Keypad8,
    Keypad9,
    DeleteButton,
    CameraExposure(Adjustment),
    CameraThreshold(Adjustment),
    Unknown,
}

impl ScreenEvent {
    /// Resolve the event for a `(page, control)` pair
    pub fn resolve(page: u8, control: u8) -> Self {
        match (page, control) {
            (0x01, 0x02) => ScreenEvent::StartButton,
            (0x02, 0x02) => ScreenEvent::Keypad0,
            (0x02, 0x05) => ScreenEvent::Keypad1,
            (0x02, 0x06) => ScreenEvent::Keypad2,
            (0x02, 0x07) => ScreenEvent::Keypad3,
            (0x02, 0x08) => ScreenEvent::Keypad4,
            (0x02, 0x09) => ScreenEvent::Keypad5,
            (0x02, 0x0A) => ScreenEvent::Keypad6,
            (0x02, 0x0B) => ScreenEvent::Keypad7,
            (0x02, 0x0C) => ScreenEvent::Keypad8,
            (0x02, 0x0E) => ScreenEvent::Keypad9,
            (0x02, 0x0D) => ScreenEvent::DeleteButton,
            (0x04, control) => Adjustment::from_control(control)
                .map_or(ScreenEvent::Unknown, ScreenEvent::CameraExposure),
            (0x05, control) => Adjustment::from_control(control)
                .map_or(ScreenEvent::Unknown, ScreenEvent::CameraThreshold),
            _ => ScreenEvent::Unknown,
        }
    }

    /// Digit for keypad events
    pub fn keypad_digit(self) -> Option<u8> {
        match self {
            ScreenEvent::Keypad0 => Some(0),
            ScreenEvent::Keypad1 => Some(1),
            ScreenEvent::Keypad2 => Some(2),
            ScreenEvent::Keypad3 => Some(3),
            ScreenEvent::Keypad4 => Some(4),
            ScreenEvent::Keypad5 => Some(5),
            ScreenEvent::Keypad6 => Some(6),
            ScreenEvent::Keypad7 => Some(7),
            ScreenEvent::Keypad8 => Some(8),
            ScreenEvent::Keypad9 => Some(9),
            _ => None,
        }
    }
}

impl fmt::Display for ScreenEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(digit) = self.keypad_digit() {
            return write!(f, "keypad {}", digit);
        }
        match self {
            ScreenEvent::StartButton => write!(f, "start button"),
            ScreenEvent::DeleteButton => write!(f, "delete button"),
            ScreenEvent::CameraExposure(step) => write!(f, "camera exposure {:+}", step.delta()),
            ScreenEvent::CameraThreshold(step) => write!(f, "camera threshold {:+}", step.delta()),
            _ => write!(f, "unknown"),
        }
    }
}

/// A decoded panel frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScreenInput {
    pub page: u8,
    pub control: u8,
    /// Raw event byte (press/release), not used for dispatch
    pub event_byte: u8,
    pub event: ScreenEvent,
}

type EventCallback = Box<dyn Fn() + Send>;

/// Per-event actions, shared between the thread that registers them and
/// the thread that decodes frames.
///
/// Callbacks run while the table lock is held, so a callback must not
/// register or remove callbacks on the same table.
#[derive(Clone, Default)]
pub struct EventCallbacks {
    table: Arc<Mutex<HashMap<ScreenEvent, EventCallback>>>,
}

impl EventCallbacks {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScreenEvent, EventCallback>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `callback` for `event`, replacing any previous one
    pub fn register(&self, event: ScreenEvent, callback: impl Fn() + Send + 'static) {
        self.lock().insert(event, Box::new(callback));
        debug!("Registered callback for {}", event);
    }

    /// Remove the callback for `event`. Returns whether one was registered.
    pub fn unregister(&self, event: ScreenEvent) -> bool {
        let removed = self.lock().remove(&event).is_some();
        if removed {
            debug!("Unregistered callback for {}", event);
        }
        removed
    }

    /// Remove every callback
    pub fn clear(&self) {
        self.lock().clear();
        debug!("Cleared all screen event callbacks");
    }

    /// Whether a callback is registered for `event`
    pub fn is_registered(&self, event: ScreenEvent) -> bool {
        self.lock().contains_key(&event)
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run the callback for `event`, if any. Returns whether one ran.
    pub fn invoke(&self, event: ScreenEvent) -> bool {
        let table = self.lock();
        match table.get(&event) {
            Some(callback) => {
                debug!("Running callback for {}", event);
                callback();
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for EventCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCallbacks")
            .field("registered", &self.len())
            .finish()
    }
}

/// Codec for inbound panel frames.
///
/// Decoding a frame runs the registered callback for the resolved event and,
/// for the start button, also raises `start_pending` on the display state.
#[derive(Debug, Clone)]
pub struct ScreenCodec {
    state: SharedScreenState,
    callbacks: EventCallbacks,
}

impl ScreenCodec {
    /// Create a codec that raises start on `state` and runs `callbacks`
    pub fn new(state: SharedScreenState, callbacks: EventCallbacks) -> Self {
        Self { state, callbacks }
    }

    /// Display state the start button writes to
    pub fn state(&self) -> &SharedScreenState {
        &self.state
    }

    /// Callback table consulted for every decoded frame
    pub fn callbacks(&self) -> &EventCallbacks {
        &self.callbacks
    }
}

impl FrameCodec for ScreenCodec {
    fn header(&self) -> &'static [u8] {
        &HEADER
    }

    fn frame_length(&self) -> usize {
        SCREEN_FRAME_LEN
    }

    fn name(&self) -> &'static str {
        "screen"
    }

    fn validate(&self, frame: &[u8]) -> bool {
        frame.len() == SCREEN_FRAME_LEN
            && frame[0] == SCREEN_SENTINEL
            && frame[4..].iter().all(|&b| b == SCREEN_TERMINATOR)
    }

    fn decode(&mut self, frame: &[u8]) -> Result<FrameEvent> {
        if !self.validate(frame) {
            return Err(SharedError::invalid_frame(
                self.name(),
                format!("bad length or sentinels: {}", hex::encode(frame)),
            ));
        }

        let input = ScreenInput {
            page: frame[1],
            control: frame[2],
            event_byte: frame[3],
            event: ScreenEvent::resolve(frame[1], frame[2]),
        };

        info!(
            "🖐️ Screen page 0x{:02X} control 0x{:02X} event 0x{:02X}: {}",
            input.page, input.control, input.event_byte, input.event
        );
        debug!("Screen raw frame: {}", hex::encode(frame));

        self.callbacks.invoke(input.event);

        if input.event == ScreenEvent::StartButton {
            self.state.notify_start_pressed();
        }

        Ok(FrameEvent::Screen(input))
    }
}
