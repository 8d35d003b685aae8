/*!
Frame dispatcher.

Pulls one frame at a time off a [`ByteChannel`] carrying interleaved
protocols. The lead byte selects the codec; the rest of the header and the
frame body are read with per-step timeouts. Anything that does not arrive in
time is dropped. There is no resynchronisation beyond looking for the next
lead byte on the following poll.
*/

use crate::channel::ByteChannel;
use crate::codec::{Codec, FrameCodec, FrameEvent};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Read timeouts used by one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherTimeouts {
    /// Wait for each header byte
    pub sentinel: Duration,
    /// Wait for the rest of a telemetry frame
    pub telemetry_body: Duration,
    /// Wait for the rest of a screen frame
    pub screen_body: Duration,
}

impl Default for DispatcherTimeouts {
    fn default() -> Self {
        Self {
            sentinel: Duration::from_millis(50),
            telemetry_body: Duration::from_millis(100),
            screen_body: Duration::from_millis(200),
        }
    }
}

impl DispatcherTimeouts {
    fn body(&self, codec: &Codec) -> Duration {
        match codec {
            Codec::Telemetry(_) => self.telemetry_body,
            Codec::Screen(_) => self.screen_body,
        }
    }
}

/// Dispatcher counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatcherStats {
    pub frames_decoded: u64,
    /// Polls where no lead byte arrived
    pub idle_polls: u64,
    pub unknown_lead_bytes: u64,
    /// Lead byte matched but the rest of the header did not
    pub header_mismatches: u64,
    /// Header matched but the body did not arrive in time
    pub torn_frames: u64,
    /// Full frame that failed validation or decoding
    pub malformed_frames: u64,
    pub channel_errors: u64,
}

/// Demultiplexes frames from one channel onto an ordered set of codecs
pub struct FrameDispatcher<C: ByteChannel> {
    channel: C,
    codecs: Vec<Codec>,
    timeouts: DispatcherTimeouts,
    stats: DispatcherStats,
    running: Arc<AtomicBool>,
}

impl<C: ByteChannel> FrameDispatcher<C> {
    /// Create a dispatcher with no codecs and default timeouts
    pub fn new(channel: C) -> Self {
        Self {
            channel,
            codecs: Vec::new(),
            timeouts: DispatcherTimeouts::default(),
            stats: DispatcherStats::default(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn with_timeouts(mut self, timeouts: DispatcherTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Share an externally owned running flag (e.g. one cleared by Ctrl+C)
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Append a codec. Earlier codecs win when headers overlap.
    pub fn add_codec(&mut self, codec: impl Into<Codec>) {
        let codec = codec.into();
        info!(
            "🔧 Registered {} codec ({} byte frames) on {}",
            codec.name(),
            codec.frame_length(),
            self.channel.name()
        );
        self.codecs.push(codec);
    }

    pub fn codecs(&self) -> &[Codec] {
        &self.codecs
    }

    pub fn stats(&self) -> DispatcherStats {
        self.stats
    }

    /// Get a reference to the running flag for external control
    pub fn get_running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> usize {
        match self.channel.read_blocking(buf, timeout) {
            Ok(n) => n,
            Err(e) => {
                warn!("Read error on {}: {}", self.channel.name(), e);
                self.stats.channel_errors += 1;
                0
            }
        }
    }

    /// Try to read and decode exactly one frame. Returns whether one was decoded.
    pub fn poll_once(&mut self) -> bool {
        self.poll_event().is_some()
    }

    /// Try to read and decode exactly one frame, returning the decoded event
    pub fn poll_event(&mut self) -> Option<FrameEvent> {
        let mut lead = [0u8; 1];
        if self.read(&mut lead, self.timeouts.sentinel) == 0 {
            self.stats.idle_polls += 1;
            return None;
        }

        let Some(index) = self.codecs.iter().position(|c| c.accepts_lead(lead[0])) else {
            trace!("Discarding unknown lead byte 0x{:02X}", lead[0]);
            self.stats.unknown_lead_bytes += 1;
            return None;
        };

        let header = self.codecs[index].header();
        let mut frame = vec![0u8; self.codecs[index].frame_length()];
        frame[0] = lead[0];

        for i in 1..header.len() {
            let got = self.read(&mut frame[i..=i], self.timeouts.sentinel);
            if got == 0 || frame[i] != header[i] {
                trace!(
                    "{} header mismatch at byte {}: {}",
                    self.codecs[index].name(),
                    i,
                    hex::encode(&frame[..=i])
                );
                self.stats.header_mismatches += 1;
                return None;
            }
        }

        let body_timeout = self.timeouts.body(&self.codecs[index]);
        let body_len = frame.len() - header.len();
        let got = self.read(&mut frame[header.len()..], body_timeout);
        if got < body_len {
            debug!(
                "Torn {} frame: {} of {} body bytes",
                self.codecs[index].name(),
                got,
                body_len
            );
            self.stats.torn_frames += 1;
            return None;
        }

        let codec = &mut self.codecs[index];
        if !codec.validate(&frame) {
            debug!("Malformed {} frame: {}", codec.name(), hex::encode(&frame));
            self.stats.malformed_frames += 1;
            return None;
        }

        match codec.decode(&frame) {
            Ok(event) => {
                self.stats.frames_decoded += 1;
                Some(event)
            }
            Err(e) => {
                debug!("Decode failed: {}", e);
                self.stats.malformed_frames += 1;
                None
            }
        }
    }

    /// Poll until the running flag is cleared, handing each event to `on_event`
    pub fn run(&mut self, mut on_event: impl FnMut(&FrameEvent)) -> DispatcherStats {
        info!("📡 Frame dispatcher started on {}", self.channel.name());

        while self.running.load(Ordering::SeqCst) {
            if let Some(event) = self.poll_event() {
                on_event(&event);
            }
        }

        let stats = self.stats;
        info!("📊 Frame dispatcher final stats:");
        info!("   Frames decoded: {}", stats.frames_decoded);
        info!("   Unknown lead bytes: {}", stats.unknown_lead_bytes);
        info!("   Header mismatches: {}", stats.header_mismatches);
        info!("   Torn frames: {}", stats.torn_frames);
        info!("   Malformed frames: {}", stats.malformed_frames);
        info!("   Channel errors: {}", stats.channel_errors);
        stats
    }
}
