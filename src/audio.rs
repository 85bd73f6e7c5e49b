//! Audio Chain Seam
//!
//! The DSP chain that encodes the live call audio (send side) or plays
//! the forwarded stream (receive side) lives outside this core. The core
//! only starts and stops the chains, pulls encoded frames from the send
//! chain, and pushes reconstructed or concealment frames into the receive
//! chain.

use crate::frame::{AudioFrame, ForwardedFrame};

/// The embedder's audio DSP chain manager.
pub trait AudioChain {
    /// Bring up the encode-and-forward chain on the sending device.
    fn start_send_chain(&mut self, mic_forward: bool);

    /// Tear the send chain down.
    fn stop_send_chain(&mut self);

    /// Bring up the receive-and-play chain. `pre_delay` start-up ticks
    /// give a competing stream time to suspend before audio starts.
    fn start_receive_chain(&mut self, volume: u8, mic_forward: bool, pre_delay: u8);

    /// Tear the receive chain down.
    fn stop_receive_chain(&mut self);

    /// Apply a new playback volume to the receive chain.
    fn set_volume(&mut self, volume: u8);

    /// Pause or resume the microphone-forwarding leg of a running chain.
    fn set_mic_forward_active(&mut self, active: bool);

    /// Pull the next encoded frame from the send chain, if one is ready.
    /// The core drains until this returns `None`.
    fn next_frame(&mut self) -> Option<AudioFrame>;

    /// Hand a reconstructed or concealment frame to the receive chain.
    fn deliver_frame(&mut self, frame: ForwardedFrame);
}
