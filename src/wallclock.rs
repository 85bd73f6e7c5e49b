//! Shared Time Base
//!
//! Audio frames cross the forwarding link carrying a time-to-play expressed
//! in a wallclock shared by both earbuds. This module holds the local time
//! helpers, the 24-bit wire representation of the wallclock, and the
//! [`TimeBase`] correlation that converts between the two.
//!
//! All ordering on times uses signed wrapping differences, never absolute
//! comparison, so values remain correct across counter wraparound.

/// Local monotonic time in microseconds. Wraps every ~71.6 minutes.
pub type Rtime = u32;

/// Signed difference `a - b` between two local times.
#[must_use]
pub fn rtime_sub(a: Rtime, b: Rtime) -> i32 {
    a.wrapping_sub(b) as i32
}

/// Advance a local time by a (possibly negative) number of microseconds.
#[must_use]
pub fn rtime_add(t: Rtime, delta: i32) -> Rtime {
    t.wrapping_add(delta as u32)
}

/// `true` if `a` is after `b` in wraparound ordering.
#[must_use]
pub fn rtime_gt(a: Rtime, b: Rtime) -> bool {
    rtime_sub(a, b) > 0
}

/// `true` if `a` is before `b` in wraparound ordering.
#[must_use]
pub fn rtime_lt(a: Rtime, b: Rtime) -> bool {
    rtime_sub(a, b) < 0
}

/// A source of local monotonic time.
///
/// The production implementation is [`SystemClock`]; tests substitute a
/// fake so timing behaviour can be driven deterministically.
pub trait Clock {
    /// Current local time in microseconds.
    fn now(&self) -> Rtime;
}

/// [`Clock`] backed by `embassy-time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Rtime {
        embassy_time::Instant::now().as_micros() as Rtime
    }
}

/// A 24-bit wallclock value as carried over the air.
///
/// The wire form wraps every ~16.8 seconds, so all comparisons are made by
/// sign-extended 24-bit difference relative to a nearby reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct WallClock24(u32);

impl WallClock24 {
    /// Mask selecting the 24 valid bits.
    pub const MASK: u32 = 0x00FF_FFFF;

    /// Create from a raw value, truncating to 24 bits.
    #[must_use]
    pub fn new(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    /// The raw 24-bit value.
    #[must_use]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Signed 24-bit difference `self - other`, in the range
    /// `-2^23 ..= 2^23 - 1` microseconds.
    #[must_use]
    pub fn diff(self, other: Self) -> i32 {
        ((self.0.wrapping_sub(other.0) << 8) as i32) >> 8
    }

    /// Serialize to the 3-byte big-endian wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; 3] {
        [
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        ]
    }

    /// Parse from the 3-byte big-endian wire form.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from(bytes[0]) << 16 | u32::from(bytes[1]) << 8 | u32::from(bytes[2]))
    }
}

/// Correlation between local time and the shared wallclock, as supplied by
/// the transport for the link the forwarding session runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct WallclockCorrelation {
    /// `wallclock = local + offset_us` (wrapping).
    pub offset_us: u32,
}

/// Converts between local time and the shared wallclock.
///
/// Must be enabled before any time-to-play is exchanged and disabled the
/// moment forwarding stops; a stale correlation corrupts the next session.
#[derive(Debug, Default)]
pub struct TimeBase {
    correlation: Option<WallclockCorrelation>,
}

impl TimeBase {
    /// Create a disabled time base.
    #[must_use]
    pub fn new() -> Self {
        Self { correlation: None }
    }

    /// Bind the time base to a link correlation.
    pub fn enable(&mut self, correlation: WallclockCorrelation) {
        self.correlation = Some(correlation);
    }

    /// Drop the correlation.
    pub fn disable(&mut self) {
        self.correlation = None;
    }

    /// `true` while a correlation is bound.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.correlation.is_some()
    }

    /// Convert a local time to its 24-bit wallclock wire form.
    ///
    /// Returns `None` while disabled.
    #[must_use]
    pub fn local_to_wall(&self, local: Rtime) -> Option<WallClock24> {
        let c = self.correlation?;
        Some(WallClock24::new(local.wrapping_add(c.offset_us)))
    }

    /// Reconstruct the full local time for a received 24-bit wallclock
    /// value, resolved to the instant nearest `now`.
    ///
    /// Returns `None` while disabled.
    #[must_use]
    pub fn wall_to_local(&self, wall: WallClock24, now: Rtime) -> Option<Rtime> {
        let wall_now = self.local_to_wall(now)?;
        Some(rtime_add(now, wall.diff(wall_now)))
    }
}
