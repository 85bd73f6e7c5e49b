//! Transport Seam
//!
//! The forwarding core sits above a connection-oriented, ordered packet
//! channel to the peer earbud plus a side channel for marshalled control
//! messages. Both are supplied by the embedder through the traits here;
//! their asynchronous completions come back in as [`crate::ScoFwdEvent`]s.

use heapless::Vec;

use crate::constants::AIR_FRAME_OCTETS;
use crate::ota::OtaMessage;
use crate::wallclock::WallclockCorrelation;

/// Errors surfaced by the audio transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TransportError {
    /// No buffer space; retry when a space notification arrives.
    NoSpace,
    /// The link is not up.
    NotConnected,
}

/// The point-to-point audio link to the peer.
///
/// Connect, accept and disconnect are requests; their outcomes arrive
/// later as `ConnectCfm`/`ConnectInd`/`DisconnectCfm` events, as do "more
/// data" and "more space" notifications for the packet path.
pub trait LinkTransport {
    /// Look up the peer's forwarding service port for a well-known 16-bit
    /// service class. Completes with a `ServiceSearchCfm` event.
    fn start_service_search(&mut self, service_class: u16);

    /// Open the link to the peer's discovered port.
    fn connect(&mut self, remote_port: u16);

    /// Answer an inbound connect indication.
    fn respond_connect(&mut self, accept: bool);

    /// Close the link.
    fn disconnect(&mut self);

    /// Submit one air packet.
    ///
    /// # Errors
    ///
    /// [`TransportError::NoSpace`] when the send buffer is full — the
    /// caller retries on the next space notification — or
    /// [`TransportError::NotConnected`] if the link has gone.
    fn try_send(&mut self, packet: &[u8]) -> Result<(), TransportError>;

    /// Take the next received air packet, if one is pending.
    fn try_recv(&mut self) -> Option<Vec<u8, AIR_FRAME_OCTETS>>;

    /// Ask to become the scheduling-preferred side of the link. Completes
    /// with a `RoleChanged` event.
    fn request_preferred_role(&mut self);

    /// Permit or forbid role switches on the link. Forbidden while audio
    /// is streaming; a switch mid-stream glitches every in-flight frame.
    fn allow_role_switch(&mut self, allowed: bool);

    /// Wallclock correlation for the connected link, if the link is up.
    fn wallclock_correlation(&self) -> Option<WallclockCorrelation>;
}

/// The marshalled control-message channel to the peer.
///
/// Sends are fire-and-forget; the delivery result arrives later as an
/// `OtaTxResult` event and is logged, never blocking further sends.
pub trait PeerSignalling {
    /// Queue one control message for the peer.
    fn send(&mut self, msg: OtaMessage);
}
