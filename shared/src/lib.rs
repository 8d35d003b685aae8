/*!
# Shared Bridge Core

This crate contains the protocol and driver logic shared by the UART bridge
binary: the frame codecs for the instrument telemetry feed and the HMI touch
panel, the frame dispatcher that demultiplexes them from one byte stream, and
the display pusher that keeps the HMI in sync with the latest measurements.

## Core Types

- [`FrameDispatcher`] - Reads frames off a [`ByteChannel`] and routes them to a codec
- [`TelemetryCodec`] - 20-byte current/power frames
- [`ScreenCodec`] - 7-byte HMI button frames
- [`ScreenState`] - Display model shared between decoder and pusher
- [`ScreenPusher`] - Periodic HMI update loop

## Modules

- [`channel`] - Byte channel capability and the scripted test channel
- [`codec`] - Codec capability, the closed codec enum and decoded events
- [`telemetry`] - Telemetry frame codec
- [`screen`] - HMI event table, callbacks and frame codec
- [`state`] - Shared display state
- [`command`] - Outgoing HMI command encoding
- [`dispatcher`] - Frame dispatcher
- [`pusher`] - Display pusher loop
- [`error`] - Common error types
*/

pub mod channel;
pub mod codec;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod pusher;
pub mod screen;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use channel::{ByteChannel, ScriptedChannel, WriteLog};
pub use codec::{Codec, FrameCodec, FrameEvent};
pub use command::{command_text, format_command, DisplayField};
pub use dispatcher::{DispatcherStats, DispatcherTimeouts, FrameDispatcher};
pub use error::{Result, SharedError};
pub use pusher::{BridgeEvent, PusherConfig, ScreenPusher};
pub use screen::{Adjustment, EventCallbacks, ScreenCodec, ScreenEvent, ScreenInput};
pub use state::{PushSnapshot, ScreenState, SharedScreenState};
pub use telemetry::{TelemetryCodec, TelemetryReading};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Leading byte of a telemetry frame (sent twice)
    pub const TELEMETRY_SENTINEL: u8 = 0xAA;

    /// Trailing byte of a telemetry frame (sent twice)
    pub const TELEMETRY_TERMINATOR: u8 = 0xFF;

    /// Total telemetry frame size: header(2) + current(4) + power(4) + padding(8) + tail(2)
    pub const TELEMETRY_FRAME_LEN: usize = 20;

    /// Leading byte of an inbound HMI frame
    pub const SCREEN_SENTINEL: u8 = 0x65;

    /// Terminator byte used by the HMI in both directions (sent three times)
    pub const SCREEN_TERMINATOR: u8 = 0xFF;

    /// Inbound HMI frame size: header(1) + page + control + event + tail(3)
    pub const SCREEN_FRAME_LEN: usize = 7;

    /// Terminator appended to every outgoing HMI command
    pub const COMMAND_TERMINATOR: [u8; 3] = [0xFF, 0xFF, 0xFF];
}
