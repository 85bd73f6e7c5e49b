//! Link Session State
//!
//! A [`LinkSession`] is the single forwarding association with the peer
//! earbud: the state machine position, the discovered service port, the
//! waiter lists for connect/disconnect confirmations, and the queue of
//! operations deferred while a transition is in flight.

use heapless::{Deque, Vec};

use crate::constants::{MAX_DEFERRED_OPS, MAX_WAITERS, SDP_SEARCH_RETRIES};
use crate::{ClientId, ScoFwdError};

/// Forwarding link state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, defmt::Format)]
pub enum ScoFwdState {
    /// Ready for connections, none in progress.
    #[default]
    Idle,
    /// Searching the peer's service record for its port.
    ServiceSearch,
    /// Transport connect in progress (either direction).
    Connecting,
    /// Link up, no audio traffic.
    Connected,
    /// Forwarding chain active, not yet streaming either direction.
    ConnectedActive,
    /// Receiving forwarded audio from the peer.
    ConnectedActiveReceive,
    /// Ready to send, waiting for confirmation of the scheduling-preferred
    /// link role before audio flows.
    ConnectedActiveSendPendingRoleAck,
    /// Sending forwarded audio to the peer.
    ConnectedActiveSend,
    /// Transport close in progress.
    Disconnecting,
}

impl ScoFwdState {
    /// `true` while a transition is in flight and operations that would
    /// interleave with it must be deferred.
    #[must_use]
    pub fn is_locked(self) -> bool {
        matches!(
            self,
            Self::ServiceSearch | Self::Connecting | Self::Disconnecting
        )
    }

    /// `true` once the transport link to the peer is up.
    #[must_use]
    pub fn is_connected(self) -> bool {
        matches!(
            self,
            Self::Connected
                | Self::ConnectedActive
                | Self::ConnectedActiveReceive
                | Self::ConnectedActiveSendPendingRoleAck
                | Self::ConnectedActiveSend
        )
    }

    /// `true` while audio is flowing in either direction.
    #[must_use]
    pub fn is_streaming(self) -> bool {
        matches!(
            self,
            Self::ConnectedActiveReceive
                | Self::ConnectedActiveSendPendingRoleAck
                | Self::ConnectedActiveSend
        )
    }

    /// `true` while this device is the sending side.
    #[must_use]
    pub fn is_sending(self) -> bool {
        matches!(
            self,
            Self::ConnectedActiveSendPendingRoleAck | Self::ConnectedActiveSend
        )
    }
}

/// An operation queued while the state machine was locked, replayed in
/// order once the transition completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum DeferredOp {
    /// Connect request from a client.
    Connect(ClientId),
    /// Disconnect request from a client.
    Disconnect(ClientId),
    /// Start forwarding once the link settles.
    EnableForwarding,
    /// Stop forwarding once the link settles.
    DisableForwarding,
}

/// The one forwarding association with the peer device.
#[derive(Debug, Default)]
pub struct LinkSession {
    /// Current state machine position.
    pub state: ScoFwdState,
    /// Peer's service port, once discovery has produced it.
    pub remote_port: Option<u16>,
    /// Outbound connect attempts not yet confirmed. Incremented per
    /// attempt, decremented per confirm; underflow is an invariant
    /// violation.
    pub pending_connects: u16,
    /// Clients awaiting a connect confirmation.
    pub connect_waiters: Vec<ClientId, MAX_WAITERS>,
    /// Clients awaiting a disconnect confirmation.
    pub disconnect_waiters: Vec<ClientId, MAX_WAITERS>,
    /// Operations deferred while the state machine was locked.
    pub deferred: Deque<DeferredOp, MAX_DEFERRED_OPS>,
    /// Service searches remaining before the connect attempt fails.
    pub sdp_retries_left: u8,
    /// Peer has an incoming, unanswered call.
    pub peer_incoming_call: bool,
    /// Volume the receive chain starts at, pushed by the sending side.
    pub forward_volume: u8,
}

impl LinkSession {
    /// Fresh session in `Idle`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sdp_retries_left: SDP_SEARCH_RETRIES,
            ..Self::default()
        }
    }

    /// Record a client waiting on connect completion.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError::TooManyWaiters`] when the waiter list is full.
    pub fn add_connect_waiter(&mut self, client: ClientId) -> Result<(), ScoFwdError> {
        if self.connect_waiters.contains(&client) {
            return Ok(());
        }
        self.connect_waiters
            .push(client)
            .map_err(|_| ScoFwdError::TooManyWaiters)
    }

    /// Record a client waiting on disconnect completion.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError::TooManyWaiters`] when the waiter list is full.
    pub fn add_disconnect_waiter(&mut self, client: ClientId) -> Result<(), ScoFwdError> {
        if self.disconnect_waiters.contains(&client) {
            return Ok(());
        }
        self.disconnect_waiters
            .push(client)
            .map_err(|_| ScoFwdError::TooManyWaiters)
    }

    /// Queue an operation to be replayed when the current transition
    /// completes.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError::TooManyDeferredOps`] when the queue is full.
    pub fn defer(&mut self, op: DeferredOp) -> Result<(), ScoFwdError> {
        self.deferred
            .push_back(op)
            .map_err(|_| ScoFwdError::TooManyDeferredOps)
    }

    /// Remove every queued operation superseded by a new request,
    /// returning the clients whose operations were cancelled. A connect
    /// supersedes queued disconnects and vice versa.
    pub fn cancel_opposite(&mut self, connecting: bool) -> Vec<ClientId, MAX_DEFERRED_OPS> {
        let mut cancelled = Vec::new();
        let mut kept = Deque::new();
        while let Some(op) = self.deferred.pop_front() {
            match op {
                DeferredOp::Disconnect(client) if connecting => {
                    let _ = cancelled.push(client);
                }
                DeferredOp::Connect(client) if !connecting => {
                    let _ = cancelled.push(client);
                }
                other => {
                    let _ = kept.push_back(other);
                }
            }
        }
        self.deferred = kept;
        cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitional_states_are_locked() {
        use ScoFwdState::*;
        for state in [ServiceSearch, Connecting, Disconnecting] {
            assert!(state.is_locked());
        }
        for state in [
            Idle,
            Connected,
            ConnectedActive,
            ConnectedActiveReceive,
            ConnectedActiveSendPendingRoleAck,
            ConnectedActiveSend,
        ] {
            assert!(!state.is_locked());
        }
    }

    #[test]
    fn streaming_is_unidirectional() {
        use ScoFwdState::*;
        // no state is both sending and receiving
        for state in [
            Idle,
            ServiceSearch,
            Connecting,
            Connected,
            ConnectedActive,
            ConnectedActiveReceive,
            ConnectedActiveSendPendingRoleAck,
            ConnectedActiveSend,
            Disconnecting,
        ] {
            let receiving = state == ConnectedActiveReceive;
            assert!(!(state.is_sending() && receiving));
            assert_eq!(state.is_streaming(), state.is_sending() || receiving);
        }
    }

    #[test]
    fn waiters_deduplicate() {
        let mut session = LinkSession::new();
        session.add_connect_waiter(ClientId(1)).unwrap();
        session.add_connect_waiter(ClientId(1)).unwrap();
        assert_eq!(session.connect_waiters.len(), 1);
    }

    #[test]
    fn opposite_deferred_ops_are_cancelled() {
        let mut session = LinkSession::new();
        session.defer(DeferredOp::Disconnect(ClientId(1))).unwrap();
        session.defer(DeferredOp::EnableForwarding).unwrap();
        session.defer(DeferredOp::Disconnect(ClientId(2))).unwrap();
        let cancelled = session.cancel_opposite(true);
        assert_eq!(cancelled.as_slice(), &[ClientId(1), ClientId(2)]);
        assert_eq!(session.deferred.len(), 1);
        assert_eq!(session.deferred.front(), Some(&DeferredOp::EnableForwarding));
    }
}
