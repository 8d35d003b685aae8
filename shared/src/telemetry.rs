/*!
Instrument telemetry frames.

```text
AA AA | current: f32 LE | power: f32 LE | 8 x 00 | FF FF
```

Twenty bytes, no checksum. The padding is expected to be zero but a
non-zero padding byte only produces a warning; the reading is still
delivered.
*/

use crate::codec::{FrameCodec, FrameEvent};
use crate::error::{Result, SharedError};
use crate::protocol::{TELEMETRY_FRAME_LEN, TELEMETRY_SENTINEL, TELEMETRY_TERMINATOR};
use serde::Serialize;
use tracing::{debug, info, warn};

const HEADER: [u8; 2] = [TELEMETRY_SENTINEL, TELEMETRY_SENTINEL];
const CURRENT_OFFSET: usize = 2;
const POWER_OFFSET: usize = 6;
const PADDING: std::ops::Range<usize> = 10..18;

/// One current/power sample from the instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryReading {
    pub current: f32,
    pub power: f32,
}

/// Receiver of decoded readings
pub type TelemetrySink = Box<dyn FnMut(TelemetryReading) + Send>;

/// Codec for the 20-byte telemetry frame
#[derive(Default)]
pub struct TelemetryCodec {
    sink: Option<TelemetrySink>,
    padding_warnings: u64,
}

impl TelemetryCodec {
    /// Create a codec with no sink attached
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a codec that forwards every reading to `sink`
    pub fn with_sink(sink: impl FnMut(TelemetryReading) + Send + 'static) -> Self {
        Self {
            sink: Some(Box::new(sink)),
            padding_warnings: 0,
        }
    }

    /// Replace the sink
    pub fn set_sink(&mut self, sink: impl FnMut(TelemetryReading) + Send + 'static) {
        self.sink = Some(Box::new(sink));
    }

    /// Number of frames decoded with non-zero padding
    pub fn padding_warnings(&self) -> u64 {
        self.padding_warnings
    }

    fn read_f32(frame: &[u8], offset: usize) -> f32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&frame[offset..offset + 4]);
        f32::from_le_bytes(raw)
    }
}

impl std::fmt::Debug for TelemetryCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCodec")
            .field("has_sink", &self.sink.is_some())
            .field("padding_warnings", &self.padding_warnings)
            .finish()
    }
}

impl FrameCodec for TelemetryCodec {
    fn header(&self) -> &'static [u8] {
        &HEADER
    }

    fn frame_length(&self) -> usize {
        TELEMETRY_FRAME_LEN
    }

    fn name(&self) -> &'static str {
        "telemetry"
    }

    fn validate(&self, frame: &[u8]) -> bool {
        frame.len() == TELEMETRY_FRAME_LEN
            && frame[..2] == HEADER
            && frame[TELEMETRY_FRAME_LEN - 2..] == [TELEMETRY_TERMINATOR, TELEMETRY_TERMINATOR]
    }

    fn decode(&mut self, frame: &[u8]) -> Result<FrameEvent> {
        if !self.validate(frame) {
            return Err(SharedError::invalid_frame(
                self.name(),
                format!("bad length or sentinels: {}", hex::encode(frame)),
            ));
        }

        let reading = TelemetryReading {
            current: Self::read_f32(frame, CURRENT_OFFSET),
            power: Self::read_f32(frame, POWER_OFFSET),
        };

        let padding_ok = frame[PADDING].iter().all(|&b| b == 0);
        if !padding_ok {
            self.padding_warnings += 1;
            warn!(
                "⚠️ Telemetry padding not zero: {}",
                hex::encode(&frame[PADDING])
            );
        }

        info!(
            "⚡ Current {:.3} A, power {:.3} W",
            reading.current, reading.power
        );
        debug!("Telemetry raw frame: {}", hex::encode(frame));

        if let Some(sink) = self.sink.as_mut() {
            sink(reading);
        }

        Ok(FrameEvent::Telemetry(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn frame(current: f32, power: f32) -> Vec<u8> {
        let mut frame = vec![0xAA, 0xAA];
        frame.extend_from_slice(&current.to_le_bytes());
        frame.extend_from_slice(&power.to_le_bytes());
        frame.extend_from_slice(&[0u8; 8]);
        frame.extend_from_slice(&[0xFF, 0xFF]);
        frame
    }

    fn recording_codec() -> (TelemetryCodec, Arc<Mutex<Vec<TelemetryReading>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let codec = TelemetryCodec::with_sink(move |reading| {
            sink_seen.lock().unwrap().push(reading);
        });
        (codec, seen)
    }

    #[test]
    fn test_decode_reference_frame() {
        let bytes = [
            0xAA, 0xAA, 0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x80, 0x3F, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF,
        ];
        let (mut codec, seen) = recording_codec();

        let event = codec.decode(&bytes).unwrap();
        let expected = TelemetryReading {
            current: 1.0,
            power: 1.0,
        };
        assert_eq!(event, FrameEvent::Telemetry(expected));
        assert_eq!(*seen.lock().unwrap(), vec![expected]);
    }

    #[test]
    fn test_padding_does_not_suppress_sink() {
        let (mut codec, seen) = recording_codec();

        for fill in [0x00u8, 0x01, 0x7F, 0xFF] {
            let mut bytes = frame(-2.5, 123.25);
            for b in &mut bytes[10..18] {
                *b = fill;
            }
            assert!(codec.validate(&bytes));
            let event = codec.decode(&bytes).unwrap();
            assert_eq!(
                event,
                FrameEvent::Telemetry(TelemetryReading {
                    current: -2.5,
                    power: 123.25
                })
            );
        }

        assert_eq!(seen.lock().unwrap().len(), 4);
        assert_eq!(codec.padding_warnings(), 3);
    }

    #[test]
    fn test_validate_rejects_bad_frames() {
        let codec = TelemetryCodec::new();
        let good = frame(1.0, 2.0);
        assert!(codec.validate(&good));

        assert!(!codec.validate(&good[..19]));

        let mut bad_head = good.clone();
        bad_head[1] = 0xAB;
        assert!(!codec.validate(&bad_head));

        let mut bad_tail = good.clone();
        bad_tail[18] = 0x00;
        assert!(!codec.validate(&bad_tail));

        let mut long = good.clone();
        long.push(0xFF);
        assert!(!codec.validate(&long));
    }

    #[test]
    fn test_invalid_frame_never_reaches_sink() {
        let (mut codec, seen) = recording_codec();
        let mut bytes = frame(1.0, 1.0);
        bytes[19] = 0x00;

        assert!(matches!(
            codec.decode(&bytes),
            Err(SharedError::InvalidFrame { codec: "telemetry", .. })
        ));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_codec_shape() {
        let codec = TelemetryCodec::new();
        assert_eq!(codec.header(), &[0xAA, 0xAA]);
        assert_eq!(codec.frame_length(), 20);
        assert_eq!(codec.name(), "telemetry");
    }
}
