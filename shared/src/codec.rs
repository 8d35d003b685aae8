/*!
Codec capability and the closed set of codecs the dispatcher knows about.
*/

use crate::error::Result;
use crate::screen::{ScreenCodec, ScreenInput};
use crate::telemetry::{TelemetryCodec, TelemetryReading};
use serde::Serialize;

/// What a fixed-length frame protocol has to provide to be dispatched.
pub trait FrameCodec {
    /// Leading bytes that identify this protocol on the wire
    fn header(&self) -> &'static [u8];

    /// Total frame length including header and terminator
    fn frame_length(&self) -> usize;

    /// Short protocol name for logs
    fn name(&self) -> &'static str;

    /// Length, sentinel and terminator checks
    fn validate(&self, frame: &[u8]) -> bool;

    /// Validate and decode a complete frame, running the codec's side effects
    fn decode(&mut self, frame: &[u8]) -> Result<FrameEvent>;
}

/// A successfully decoded frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FrameEvent {
    Telemetry(TelemetryReading),
    Screen(ScreenInput),
}

/// Every codec the dispatcher can route to
#[derive(Debug)]
pub enum Codec {
    Telemetry(TelemetryCodec),
    Screen(ScreenCodec),
}

impl Codec {
    /// Whether a frame of this codec can start with `byte`
    pub fn accepts_lead(&self, byte: u8) -> bool {
        self.header().first() == Some(&byte)
    }

    fn inner(&self) -> &dyn FrameCodec {
        match self {
            Codec::Telemetry(codec) => codec,
            Codec::Screen(codec) => codec,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn FrameCodec {
        match self {
            Codec::Telemetry(codec) => codec,
            Codec::Screen(codec) => codec,
        }
    }
}

impl FrameCodec for Codec {
    fn header(&self) -> &'static [u8] {
        self.inner().header()
    }

    fn frame_length(&self) -> usize {
        self.inner().frame_length()
    }

    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn validate(&self, frame: &[u8]) -> bool {
        self.inner().validate(frame)
    }

    fn decode(&mut self, frame: &[u8]) -> Result<FrameEvent> {
        self.inner_mut().decode(frame)
    }
}

impl From<TelemetryCodec> for Codec {
    fn from(codec: TelemetryCodec) -> Self {
        Codec::Telemetry(codec)
    }
}

impl From<ScreenCodec> for Codec {
    fn from(codec: ScreenCodec) -> Self {
        Codec::Screen(codec)
    }
}
