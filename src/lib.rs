#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod audio;
pub mod constants;
pub mod frame;
mod link;
#[cfg(test)]
mod mock;
pub mod ota;
pub mod profile;
pub mod rx;
pub mod session;
pub mod telephony;
pub mod transport;
pub mod tx;
pub mod wallclock;

use crate::constants::{
    DECODER_PROCESSING_OFFSET_US, DECODER_UNCOMPENSATED_OFFSET_US, PACKET_INTERVAL_US,
    RX_CHAIN_PRE_DELAY, RX_PROCESSING_TIME_US, SCOFWD_SERVICE_CLASS, SDP_SEARCH_RETRIES,
    TTP_DELAY_US, TX_MAX_FRAMES_BEHIND,
};

pub use profile::{ScoFwd, ScoFwdEvent, ScoFwdIndication};
pub use wallclock::SystemClock;

/// Handle identifying a client waiting on a connect or disconnect
/// confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ClientId(pub u8);

/// Which earbud of the pair this device is. A deployment property, set
/// once at startup; used only to break connection collisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum DeviceRole {
    /// The left earbud. Accepts the inbound attempt on a collision.
    Left,
    /// The right earbud. Rejects the inbound attempt on a collision.
    Right,
}

/// Role this device holds on the transport link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum LinkRole {
    /// Scheduling-preferred side; required before audio is sent.
    Central,
    /// Follower side.
    Peripheral,
}

/// Result delivered with connect and disconnect confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ScoFwdStatus {
    /// The operation completed.
    Success,
    /// The operation failed; the link is idle.
    Failed,
    /// The operation was superseded by the opposite request.
    Cancelled,
}

/// Errors returned by the public operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ScoFwdError {
    /// The waiter list for this confirmation is full.
    TooManyWaiters,
    /// The deferred-operation queue is full.
    TooManyDeferredOps,
}

/// Timing and policy configuration for a forwarding session.
///
/// The defaults match a 7.5 ms wideband frame cadence over a BR/EDR ACL
/// link; the timing fields are tuned per codec and radio, so embedders
/// with a different decode pipeline supply their own values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub struct ScoFwdConfig {
    /// Which earbud this device is, for collision tie-breaking.
    pub role: DeviceRole,
    /// Interval between successive audio frames, µs.
    pub packet_interval_us: u32,
    /// Receive-side processing floor, µs; frames closer than this to
    /// their play time are late.
    pub rx_processing_time_us: u32,
    /// Decoder pipeline latency contributing to minimum transit time, µs.
    pub decoder_offset_us: u32,
    /// Decoder latency not compensated inside the decoder, subtracted
    /// from each received time-to-play, µs.
    pub decoder_uncompensated_offset_us: u32,
    /// End-to-end time-to-play delay, µs; also bounds how far from now a
    /// concealment deadline may be armed.
    pub ttp_delay_us: u32,
    /// Unsent-frame backlog bound on the transmit side.
    pub tx_max_frames_behind: usize,
    /// Service search retries before a connect attempt fails.
    pub sdp_search_retries: u8,
    /// Well-known 16-bit service class of the peer's forwarding service.
    pub service_class: u16,
    /// Start-up ticks handed to the receive chain.
    pub rx_chain_pre_delay: u8,
}

impl Default for ScoFwdConfig {
    fn default() -> Self {
        Self {
            role: DeviceRole::Left,
            packet_interval_us: PACKET_INTERVAL_US,
            rx_processing_time_us: RX_PROCESSING_TIME_US,
            decoder_offset_us: DECODER_PROCESSING_OFFSET_US,
            decoder_uncompensated_offset_us: DECODER_UNCOMPENSATED_OFFSET_US,
            ttp_delay_us: TTP_DELAY_US,
            tx_max_frames_behind: TX_MAX_FRAMES_BEHIND,
            sdp_search_retries: SDP_SEARCH_RETRIES,
            service_class: SCOFWD_SERVICE_CLASS,
            rx_chain_pre_delay: RX_CHAIN_PRE_DELAY,
        }
    }
}
