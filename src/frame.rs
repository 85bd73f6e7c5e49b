//! Audio Frame Codec
//!
//! Frames arrive from the local encoder as fixed-size mSBC frames with a
//! largely constant 5-octet codec header. The transmit side strips that
//! header and prepends a 3-octet wallclock time-to-play before the frame
//! goes to air; the receive side reverses both steps. Synthesized
//! concealment frames reuse the same receive-side representation with a
//! missing marker instead of payload.

use heapless::Vec;

use crate::constants::{
    AIR_FRAME_HEADER_SIZE, AIR_FRAME_OCTETS, AUDIO_FRAME_OCTETS, STRIPPED_AUDIO_FRAME_OCTETS,
    STRIPPED_HEADER_SIZE,
};
use crate::wallclock::{Rtime, WallClock24};

/// Fixed codec header prepended to every reconstructed frame.
///
/// Real encoder output varies only in the second octet (sequence bits), so
/// a single representative header keeps the decoder in sync.
pub const RECONSTRUCTED_HEADER: [u8; STRIPPED_HEADER_SIZE] = [0x01, 0x18, 0xAD, 0x00, 0x00];

/// Errors raised by the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum FrameError {
    /// Encoder output is not one whole frame of the expected size.
    BadLength,
    /// Encoder output does not start with a recognizable codec header.
    BadHeader,
    /// Air data is shorter than the frame header.
    Truncated,
}

/// One encoded audio frame with its local time-to-play, as produced by the
/// local encoder path on the sending device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Local time at which this frame's first sample should play.
    pub ttp: Rtime,
    /// Complete encoder output including the codec header.
    pub payload: Vec<u8, AUDIO_FRAME_OCTETS>,
}

impl AudioFrame {
    /// Validate raw encoder output and wrap it as a frame.
    ///
    /// # Errors
    ///
    /// `BadLength` if `data` is not exactly one frame, `BadHeader` if the
    /// codec header octets are not in their expected shape.
    pub fn from_encoder(ttp: Rtime, data: &[u8]) -> Result<Self, FrameError> {
        if data.len() != AUDIO_FRAME_OCTETS {
            return Err(FrameError::BadLength);
        }
        if !header_is_valid(&data[..STRIPPED_HEADER_SIZE]) {
            return Err(FrameError::BadHeader);
        }
        let mut payload = Vec::new();
        // length checked above
        let _ = payload.extend_from_slice(data);
        Ok(Self { ttp, payload })
    }

    /// The frame body with the codec header stripped.
    #[must_use]
    pub fn stripped(&self) -> &[u8] {
        &self.payload[STRIPPED_HEADER_SIZE..]
    }
}

/// Only the sequence bits of the second header octet vary between frames.
fn header_is_valid(header: &[u8]) -> bool {
    header[0] == 0x01
        && matches!(header[1], 0x08 | 0x38 | 0xC8 | 0xF8)
        && header[2] == 0xAD
        && header[3] == 0x00
        && header[4] == 0x00
}

/// One frame as carried over the forwarding link: a 24-bit big-endian
/// wallclock time-to-play followed by the stripped frame body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirFrame {
    /// Time-to-play in the shared wallclock.
    pub ttp: WallClock24,
    /// Frame body without the codec header.
    pub payload: Vec<u8, STRIPPED_AUDIO_FRAME_OCTETS>,
}

impl AirFrame {
    /// Build the air form of a local [`AudioFrame`].
    #[must_use]
    pub fn from_audio(frame: &AudioFrame, ttp: WallClock24) -> Self {
        let mut payload = Vec::new();
        let _ = payload.extend_from_slice(frame.stripped());
        Self { ttp, payload }
    }

    /// Parse a received air packet.
    ///
    /// The body may be shorter than a full frame (the final frame of a
    /// burst can be truncated by the transport); only the header length is
    /// mandatory.
    ///
    /// # Errors
    ///
    /// `Truncated` if `data` is shorter than the frame header, `BadLength`
    /// if the body exceeds one frame.
    pub fn from_bytes(data: &[u8]) -> Result<Self, FrameError> {
        if data.len() < AIR_FRAME_HEADER_SIZE {
            return Err(FrameError::Truncated);
        }
        let ttp = WallClock24::from_bytes([data[0], data[1], data[2]]);
        let body = &data[AIR_FRAME_HEADER_SIZE..];
        let mut payload = Vec::new();
        payload
            .extend_from_slice(body)
            .map_err(|()| FrameError::BadLength)?;
        Ok(Self { ttp, payload })
    }

    /// Serialize to the wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8, AIR_FRAME_OCTETS> {
        let mut out = Vec::new();
        let _ = out.extend_from_slice(&self.ttp.to_bytes());
        let _ = out.extend_from_slice(&self.payload);
        out
    }
}

/// A frame handed to the receive-side audio chain, either reconstructed
/// from air data or synthesized to conceal a loss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardedFrame {
    /// Local time at which this frame should play.
    pub ttp: Rtime,
    /// `None` marks a concealment frame; the decoder substitutes packet
    /// loss concealment output for the missing body.
    pub payload: Option<Vec<u8, AUDIO_FRAME_OCTETS>>,
}

impl ForwardedFrame {
    /// Reconstruct a playable frame from a received air frame body,
    /// re-attaching the codec header.
    #[must_use]
    pub fn reconstructed(ttp: Rtime, body: &[u8]) -> Self {
        let mut payload = Vec::new();
        let _ = payload.extend_from_slice(&RECONSTRUCTED_HEADER);
        let _ = payload.extend_from_slice(body);
        Self {
            ttp,
            payload: Some(payload),
        }
    }

    /// A concealment frame for a lost slot.
    #[must_use]
    pub fn missing(ttp: Rtime) -> Self {
        Self { ttp, payload: None }
    }

    /// `true` for concealment frames.
    #[must_use]
    pub fn is_missing(&self) -> bool {
        self.payload.is_none()
    }
}
