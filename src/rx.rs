//! Receive Reconstructor
//!
//! Rebuilds the forwarded stream on the receiving earbud: converts each
//! air frame's wallclock time-to-play back to local time, discards frames
//! too late to decode, synthesizes concealment frames for every missed
//! slot, and keeps a rolling loss window that raises a single audio-lost
//! edge when reception disappears entirely.
//!
//! Concealment has two triggers. A real frame arriving ahead of the
//! expected slot back-fills every slot it skipped (catch-up), and a
//! deadline kept just ahead of each expected slot fires when nothing
//! arrives at all, so silence on the link still produces a frame cadence
//! for the decoder.

use crate::ScoFwdConfig;
use crate::audio::AudioChain;
use crate::frame::{AirFrame, ForwardedFrame, FrameError};
use crate::wallclock::{Rtime, TimeBase, rtime_add, rtime_lt, rtime_sub};

/// Rolling receive-quality view over the last 32 slots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct PacketStats {
    /// Lost or synthesized slots within the window.
    pub lost_packets: u32,
    /// Bitmap of the last 32 outcomes, 1 = lost.
    pub packet_history: u32,
    /// A consecutive run of losses has saturated the window.
    pub audio_missing: bool,
}

impl PacketStats {
    fn record(&mut self, good: bool) {
        self.lost_packets -= u32::from(self.packet_history & 0x8000_0000 != 0);
        self.lost_packets += u32::from(!good);
        self.packet_history = (self.packet_history << 1) | u32::from(!good);
    }

    fn window_saturated(&self) -> bool {
        self.packet_history == u32::MAX
    }
}

/// What a receive step produced, beyond frames delivered to the chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, defmt::Format)]
pub struct RxOutcome {
    /// The audio-lost edge fired during this step.
    pub audio_lost: bool,
}

/// The receive side of the forwarding link.
#[derive(Debug)]
pub struct RxReconstructor {
    interval_us: u32,
    margin_us: u32,
    floor_us: u32,
    uncompensated_offset_us: u32,
    late_offset_us: u32,
    ttp_delay_us: u32,
    /// Time-to-play of the last accepted (real or synthesized) frame;
    /// `None` until the first frame of a session baselines the cursor.
    last_ttp: Option<Rtime>,
    stats: PacketStats,
    /// Local time at which to synthesize if nothing real arrives.
    deadline: Option<Rtime>,
}

impl RxReconstructor {
    /// Build a reconstructor for the configured timing.
    #[must_use]
    pub fn new(config: &ScoFwdConfig) -> Self {
        Self {
            interval_us: config.packet_interval_us,
            margin_us: config.packet_interval_us / 2,
            floor_us: config.rx_processing_time_us,
            uncompensated_offset_us: config.decoder_uncompensated_offset_us,
            late_offset_us: config.rx_processing_time_us * 3 / 2,
            ttp_delay_us: config.ttp_delay_us,
            last_ttp: None,
            stats: PacketStats::default(),
            deadline: None,
        }
    }

    /// Rolling loss statistics.
    #[must_use]
    pub fn stats(&self) -> PacketStats {
        self.stats
    }

    /// Local time the concealment deadline is set for, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Rtime> {
        self.deadline
    }

    /// Clear cursor, statistics and deadline, for (re)entering the
    /// receive state. The first frame after this is accepted
    /// unconditionally as the new baseline.
    pub fn reset(&mut self) {
        self.last_ttp = None;
        self.stats = PacketStats::default();
        self.deadline = None;
    }

    fn next_expected(&self) -> Option<Rtime> {
        self.last_ttp.map(|t| rtime_add(t, self.interval_us as i32))
    }

    /// A time-to-play is acceptable unless it falls more than half an
    /// interval before the next expected slot (duplicate or stray).
    fn ttp_is_expected(&self, ttp: Rtime) -> bool {
        match self.next_expected() {
            Some(expected) => !rtime_lt(ttp, rtime_add(expected, -(self.margin_us as i32))),
            None => true,
        }
    }

    /// Arm the deadline ahead of the next expected slot. Targets too far
    /// from now in either direction are not armed.
    fn arm_deadline(&mut self, now: Rtime) {
        let Some(next) = self.next_expected() else {
            self.deadline = None;
            return;
        };
        let target = rtime_add(next, -(self.late_offset_us as i32));
        let delay = rtime_sub(target, now);
        self.deadline = (delay.unsigned_abs() < self.ttp_delay_us).then_some(target);
    }

    fn record_loss<A: AudioChain>(&mut self, audio: &mut A, ttp: Rtime) -> bool {
        audio.deliver_frame(ForwardedFrame::missing(ttp));
        self.last_ttp = Some(ttp);
        self.stats.record(false);
        if self.stats.window_saturated() && !self.stats.audio_missing {
            self.stats.audio_missing = true;
            // A dead link needs no further synthesis; the next real frame
            // re-baselines the cursor.
            self.last_ttp = None;
            self.deadline = None;
            defmt::warn!("rx: audio missing after {=u32} lost slots", self.stats.lost_packets);
            return true;
        }
        false
    }

    /// Synthesize concealment frames for every expected slot strictly
    /// earlier than `ttp` (by more than half an interval).
    fn catch_up<A: AudioChain>(&mut self, audio: &mut A, ttp: Rtime) -> bool {
        let mut audio_lost = false;
        while let Some(next) = self.next_expected() {
            if !rtime_lt(rtime_add(next, self.margin_us as i32), ttp) {
                break;
            }
            defmt::debug!("rx: catch-up fake at {=u32}", next);
            audio_lost |= self.record_loss(audio, next);
        }
        audio_lost
    }

    /// Process one received air packet.
    ///
    /// # Errors
    ///
    /// [`FrameError`] when the packet does not parse; malformed packets
    /// change no state.
    pub fn on_air_packet<A: AudioChain>(
        &mut self,
        data: &[u8],
        audio: &mut A,
        time_base: &TimeBase,
        now: Rtime,
    ) -> Result<RxOutcome, FrameError> {
        let air = AirFrame::from_bytes(data)?;
        let Some(ttp) = time_base.wall_to_local(air.ttp, now) else {
            defmt::warn!("rx: frame with time base unbound");
            return Ok(RxOutcome::default());
        };
        // the decoder's analysis latency shifts its effective output
        // earlier than the wire value
        let ttp = rtime_add(ttp, -(self.uncompensated_offset_us as i32));
        let future = rtime_sub(ttp, now);

        if future < self.floor_us as i32 {
            defmt::debug!("rx: late frame, future {=i32}us", future);
            return Ok(RxOutcome::default());
        }

        let mut outcome = RxOutcome {
            audio_lost: self.catch_up(audio, ttp),
        };

        if self.ttp_is_expected(ttp) {
            self.stats.record(true);
            if !self.stats.window_saturated() {
                self.stats.audio_missing = false;
            }
            self.last_ttp = Some(ttp);
            audio.deliver_frame(ForwardedFrame::reconstructed(ttp, &air.payload));
        } else {
            defmt::debug!("rx: unexpected frame at {=u32}", ttp);
            outcome.audio_lost = false;
        }

        self.arm_deadline(now);
        Ok(outcome)
    }

    /// The concealment deadline fired: synthesize exactly one frame for
    /// the next expected slot and re-arm.
    pub fn on_deadline<A: AudioChain>(&mut self, audio: &mut A, now: Rtime) -> RxOutcome {
        let Some(next) = self.next_expected() else {
            defmt::debug!("rx: deadline with no expected slot");
            return RxOutcome::default();
        };
        let audio_lost = self.record_loss(audio, next);
        self.arm_deadline(now);
        RxOutcome { audio_lost }
    }
}
