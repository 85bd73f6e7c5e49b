//! Transmit Packetizer
//!
//! Drains encoded frames from the send chain, attaches the wallclock
//! time-to-play, and submits them to the link. Two policies keep latency
//! bounded: a backlog cap that discards oldest-first when the drain falls
//! behind, and a stale-drop that discards any frame which can no longer
//! cross the link and be decoded before its play time.
//!
//! The drain is re-invoked by either flow-control signal, more frames
//! from the chain or more space from the transport, and is safe to call
//! at any time.

use heapless::Deque;

use crate::ScoFwdConfig;
use crate::audio::AudioChain;
use crate::frame::{AirFrame, AudioFrame};
use crate::transport::{LinkTransport, TransportError};
use crate::wallclock::{Rtime, TimeBase, rtime_sub};

/// Headroom above the backlog bound so a burst is trimmed, not lost.
const QUEUE_CAP: usize = 8;

/// Counters kept across one streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct TxStats {
    /// Frames handed to the transport.
    pub sent: u32,
    /// Frames discarded because they could no longer arrive in time.
    pub dropped_stale: u32,
    /// Frames discarded to keep the unsent backlog bounded.
    pub dropped_backlog: u32,
}

/// The transmit side of the forwarding link.
#[derive(Debug)]
pub struct TxPacketizer {
    queue: Deque<AudioFrame, QUEUE_CAP>,
    min_transit_us: u32,
    max_frames_behind: usize,
    stats: TxStats,
}

impl TxPacketizer {
    /// Build a packetizer for the configured timing.
    #[must_use]
    pub fn new(config: &ScoFwdConfig) -> Self {
        Self {
            queue: Deque::new(),
            min_transit_us: config.packet_interval_us
                + config.decoder_offset_us
                + config.rx_processing_time_us,
            max_frames_behind: config.tx_max_frames_behind,
            stats: TxStats::default(),
        }
    }

    /// Session counters.
    #[must_use]
    pub fn stats(&self) -> TxStats {
        self.stats
    }

    /// Drop all queued frames and counters, for (re)entering the send
    /// state.
    pub fn reset(&mut self) {
        self.queue.clear();
        self.stats = TxStats::default();
    }

    /// Pull every available frame from the send chain and forward as many
    /// as timing and transport space allow.
    ///
    /// Frames the transport cannot take yet stay queued and go out on the
    /// next invocation.
    pub fn drain<A: AudioChain, T: LinkTransport>(
        &mut self,
        audio: &mut A,
        transport: &mut T,
        time_base: &TimeBase,
        now: Rtime,
    ) {
        while let Some(frame) = audio.next_frame() {
            if self.queue.is_full() {
                let _ = self.queue.pop_front();
                self.stats.dropped_backlog += 1;
            }
            // capacity freed above
            let _ = self.queue.push_back(frame);
        }

        while self.queue.len() > self.max_frames_behind {
            let _ = self.queue.pop_front();
            self.stats.dropped_backlog += 1;
        }

        while let Some(frame) = self.queue.front() {
            if rtime_sub(frame.ttp, now) < self.min_transit_us as i32 {
                defmt::debug!(
                    "tx: stale frame, ttp-now {=i32}us < {=u32}us",
                    rtime_sub(frame.ttp, now),
                    self.min_transit_us
                );
                let _ = self.queue.pop_front();
                self.stats.dropped_stale += 1;
                continue;
            }
            let Some(wall_ttp) = time_base.local_to_wall(frame.ttp) else {
                panic!("time base unbound while sending");
            };
            let air = AirFrame::from_audio(frame, wall_ttp);
            match transport.try_send(&air.to_bytes()) {
                Ok(()) => {
                    let _ = self.queue.pop_front();
                    self.stats.sent += 1;
                }
                Err(TransportError::NoSpace) => {
                    defmt::trace!("tx: no space, {=usize} frames held", self.queue.len());
                    break;
                }
                Err(TransportError::NotConnected) => {
                    defmt::warn!("tx: link gone, discarding {=usize} frames", self.queue.len());
                    self.queue.clear();
                    break;
                }
            }
        }
    }
}
