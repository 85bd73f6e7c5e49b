//! `scofwd` Constants
//!
//! Default timing and framing values for the forwarding link. Everything
//! timing-related here is also a field of [`crate::ScoFwdConfig`]; these are
//! the defaults for a 7.5 ms mSBC frame cadence on a BR/EDR ACL link.

/// Interval between successive audio frames in microseconds.
pub const PACKET_INTERVAL_US: u32 = 7_500;

/// Time the receive side needs to get a frame through its processing path,
/// in microseconds. A frame whose time-to-play is closer than this is late.
pub const RX_PROCESSING_TIME_US: u32 = 8_000;

/// Latency the receiving decoder adds between frame input and sample output,
/// in microseconds. Part of the minimum transit time budget.
pub const DECODER_PROCESSING_OFFSET_US: u32 = 6_063;

/// Portion of the decoder latency *not* compensated inside the decoder
/// itself, subtracted from each received time-to-play. Zero for decoders
/// that self-compensate.
pub const DECODER_UNCOMPENSATED_OFFSET_US: u32 = 0;

/// Default end-to-end time-to-play delay in microseconds.
pub const TTP_DELAY_US: u32 = 70_000;

/// Limit on the number of unsent frames the transmit packetiser will leave
/// queued. Anything beyond this is discarded oldest-first.
pub const TX_MAX_FRAMES_BEHIND: usize = 3;

/// Number of times a failed service search is retried before the connect
/// attempt is reported as failed.
pub const SDP_SEARCH_RETRIES: u8 = 2;

/// Well-known service class identifier used to discover the peer's
/// forwarding service port.
pub const SCOFWD_SERVICE_CLASS: u16 = 0x1043;

/// Start-up delay, in scheduler messages, handed to the receive audio chain
/// so any competing stream has time to suspend.
pub const RX_CHAIN_PRE_DELAY: u8 = 2;

/// Bitpool used by the asynchronous wideband encoder. 22 keeps a forwarded
/// frame within a single-slot packet; quality is close to wideband SCO.
pub const MSBC_BITPOOL: usize = 22;

/// Octets produced by the wideband encoder for one audio frame.
pub const AUDIO_FRAME_OCTETS: usize = ((11 + (15 * MSBC_BITPOOL + 7) / 8) / 2) * 2;

/// Octets of fixed codec header stripped from each frame before it goes to
/// air and reconstructed on receive.
pub const STRIPPED_HEADER_SIZE: usize = 5;

/// Octets of audio payload actually carried over the air per frame.
pub const STRIPPED_AUDIO_FRAME_OCTETS: usize = AUDIO_FRAME_OCTETS - STRIPPED_HEADER_SIZE;

/// Size of the over-the-air frame header: a 24-bit wallclock time-to-play.
pub const AIR_FRAME_HEADER_SIZE: usize = 3;

/// Total octets of one frame over the air.
pub const AIR_FRAME_OCTETS: usize = AIR_FRAME_HEADER_SIZE + STRIPPED_AUDIO_FRAME_OCTETS;

/// Number of received/synthesized outcomes tracked in the rolling loss
/// window. Saturating the window with losses raises the audio-lost edge.
pub const LOSS_WINDOW: u8 = 32;

/// Maximum clients that can wait on a connect or disconnect confirmation.
pub const MAX_WAITERS: usize = 4;

/// Maximum operations that can be deferred while the state machine is in a
/// locked (transitional) state.
pub const MAX_DEFERRED_OPS: usize = 4;

/// Capacity of the outbound indication queue.
pub const MAX_INDICATIONS: usize = 8;
