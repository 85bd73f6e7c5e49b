//! Forwarding Profile Facade
//!
//! [`ScoFwd`] owns one forwarding session end to end: the link state
//! machine, the shared time base, the transmit packetizer and the receive
//! reconstructor, plus the embedder-supplied transport, audio chain,
//! peer signalling and call control collaborators.
//!
//! The core is single-threaded and message-driven. Everything that can
//! happen is a [`ScoFwdEvent`]; each event handler runs to completion and
//! queues [`ScoFwdIndication`]s for the embedder. [`run`] drives the
//! whole thing from an `embassy-sync` channel, racing the receive-side
//! concealment deadline against the next event.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Timer};
use heapless::{Deque, Vec};

use crate::audio::AudioChain;
use crate::constants::MAX_INDICATIONS;
use crate::ota::{MAX_OTA_MESSAGE_SIZE, OtaMessage};
use crate::rx::RxReconstructor;
use crate::session::{DeferredOp, LinkSession, ScoFwdState};
use crate::telephony::CallControl;
use crate::transport::{LinkTransport, PeerSignalling};
use crate::tx::TxPacketizer;
use crate::wallclock::{Clock, Rtime, TimeBase, rtime_sub};
use crate::{ClientId, LinkRole, ScoFwdConfig, ScoFwdError, ScoFwdStatus};

/// Everything that can happen to a forwarding session.
///
/// Transport, signalling and call-control callbacks are translated into
/// these by the embedder and fed through one channel, which gives the
/// strict per-source FIFO the handlers rely on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScoFwdEvent {
    /// A client asks for the forwarding link to be brought up.
    ConnectPeer(ClientId),
    /// A client asks for the forwarding link to be torn down.
    DisconnectPeer(ClientId),
    /// Forwarding of the live call audio was requested; start once the
    /// link allows it.
    EnableForwarding,
    /// Forwarding of the call audio should stop.
    DisableForwarding,
    /// Service discovery completed, with the peer's port on success.
    ServiceSearchCfm {
        /// Remote service port, `None` when the search failed.
        port: Option<u16>,
    },
    /// An outbound or accepted connect attempt completed.
    ConnectCfm {
        /// Whether the link is up.
        success: bool,
    },
    /// The peer is trying to connect to us.
    ConnectInd,
    /// A requested disconnect completed.
    DisconnectCfm,
    /// The link dropped without a requested disconnect.
    LinkLost,
    /// The transport role for the link changed.
    RoleChanged(LinkRole),
    /// The transport has received packets to collect.
    DataReceived,
    /// The transport has send buffer space again.
    SpaceAvailable,
    /// The send chain has frames to collect.
    MoreFrames,
    /// A marshalled control message arrived from the peer.
    OtaData(Vec<u8, MAX_OTA_MESSAGE_SIZE>),
    /// Delivery result for an earlier control message send.
    OtaTxResult {
        /// Whether the peer acknowledged the message.
        delivered: bool,
    },
    /// An incoming call started ringing on this device.
    IncomingCallStarted,
    /// The incoming call on this device stopped ringing.
    IncomingCallEnded,
    /// The local call volume changed.
    VolumeChanged(u8),
    /// Relay an answer of the incoming call.
    CallAccept,
    /// Relay a rejection of the incoming call.
    CallReject,
    /// Relay a hangup of the current call.
    CallHangup,
    /// Relay a voice-dial request.
    CallVoiceDial,
    /// Relay the start of a volume ramp.
    VolumeStart(i8),
    /// Relay the end of a volume ramp.
    VolumeStop(i8),
    /// Enable or disable microphone forwarding.
    MicForwarding(bool),
    /// The concealment deadline elapsed.
    DeadlineElapsed,
}

/// Notifications queued for the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum ScoFwdIndication {
    /// A connect request completed.
    ConnectCfm {
        /// The requesting client.
        client: ClientId,
        /// How the request ended.
        status: ScoFwdStatus,
    },
    /// A disconnect request completed.
    DisconnectCfm {
        /// The requesting client.
        client: ClientId,
        /// How the request ended.
        status: ScoFwdStatus,
    },
    /// Forwarded audio has disappeared; a whole loss window of
    /// consecutive slots went missing.
    AudioMissing,
}

/// One SCO forwarding session.
pub struct ScoFwd<T, A, P, C, K>
where
    T: LinkTransport,
    A: AudioChain,
    P: PeerSignalling,
    C: CallControl,
    K: Clock,
{
    pub(crate) config: ScoFwdConfig,
    pub(crate) session: LinkSession,
    pub(crate) time_base: TimeBase,
    pub(crate) tx: TxPacketizer,
    pub(crate) rx: RxReconstructor,
    pub(crate) transport: T,
    pub(crate) audio: A,
    pub(crate) signalling: P,
    pub(crate) calls: C,
    pub(crate) clock: K,
    pub(crate) indications: Deque<ScoFwdIndication, MAX_INDICATIONS>,
    /// Local call audio is up and wants forwarding.
    pub(crate) forwarding_requested: bool,
    /// An incoming call is ringing on this device.
    pub(crate) local_incoming_call: bool,
    /// Microphone forwarding requested for the next chain start.
    pub(crate) mic_forward: bool,
}

impl<T, A, P, C, K> ScoFwd<T, A, P, C, K>
where
    T: LinkTransport,
    A: AudioChain,
    P: PeerSignalling,
    C: CallControl,
    K: Clock,
{
    /// Create an idle session around the embedder's collaborators.
    pub fn new(
        config: ScoFwdConfig,
        transport: T,
        audio: A,
        signalling: P,
        calls: C,
        clock: K,
    ) -> Self {
        Self {
            session: LinkSession::new(),
            time_base: TimeBase::new(),
            tx: TxPacketizer::new(&config),
            rx: RxReconstructor::new(&config),
            config,
            transport,
            audio,
            signalling,
            calls,
            clock,
            indications: Deque::new(),
            forwarding_requested: false,
            local_incoming_call: false,
            mic_forward: false,
        }
    }

    /// Current state machine position.
    #[must_use]
    pub fn state(&self) -> ScoFwdState {
        self.session.state
    }

    /// Current local time.
    #[must_use]
    pub fn now(&self) -> Rtime {
        self.clock.now()
    }

    /// Local time the receive-side concealment deadline is set for.
    #[must_use]
    pub fn rx_deadline(&self) -> Option<Rtime> {
        self.rx.deadline()
    }

    /// `true` while the forwarding link is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.session.state.is_connected()
    }

    /// `true` while call audio is crossing the link in either direction.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.session.state.is_streaming()
    }

    /// `true` while this device forwards its call audio to the peer.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.session.state.is_sending()
    }

    /// `true` while this device plays forwarded audio from the peer.
    #[must_use]
    pub fn is_receiving(&self) -> bool {
        self.session.state == ScoFwdState::ConnectedActiveReceive
    }

    /// `true` while an incoming call is ringing on either earbud.
    #[must_use]
    pub fn is_call_incoming(&self) -> bool {
        self.local_incoming_call || self.session.peer_incoming_call
    }

    /// Take the next queued notification.
    pub fn next_indication(&mut self) -> Option<ScoFwdIndication> {
        self.indications.pop_front()
    }

    pub(crate) fn indicate(&mut self, indication: ScoFwdIndication) {
        if self.indications.push_back(indication).is_err() {
            defmt::warn!("indication queue full, dropping {:?}", indication);
        }
    }

    /// Bring the forwarding link up. The outcome arrives later as a
    /// [`ScoFwdIndication::ConnectCfm`] for `client`; a request made
    /// while already connected confirms immediately.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError`] when the waiter or deferred-operation capacity is
    /// exhausted.
    pub fn connect_peer(&mut self, client: ClientId) -> Result<(), ScoFwdError> {
        defmt::debug!("connect_peer from {:?} in {:?}", client, self.session.state);
        if self.session.state.is_connected() {
            self.indicate(ScoFwdIndication::ConnectCfm {
                client,
                status: ScoFwdStatus::Success,
            });
            return Ok(());
        }
        for cancelled in self.session.cancel_opposite(true) {
            self.indicate(ScoFwdIndication::DisconnectCfm {
                client: cancelled,
                status: ScoFwdStatus::Cancelled,
            });
        }
        match self.session.state {
            ScoFwdState::Idle => {
                self.session.add_connect_waiter(client)?;
                self.start_service_search();
            }
            ScoFwdState::ServiceSearch | ScoFwdState::Connecting => {
                // an attempt is in flight; ride on it
                self.session.add_connect_waiter(client)?;
            }
            ScoFwdState::Disconnecting => {
                self.session.defer(DeferredOp::Connect(client))?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Tear the forwarding link down. The outcome arrives later as a
    /// [`ScoFwdIndication::DisconnectCfm`] for `client`; a request made
    /// while already idle confirms immediately.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError`] when the waiter or deferred-operation capacity is
    /// exhausted.
    pub fn disconnect_peer(&mut self, client: ClientId) -> Result<(), ScoFwdError> {
        defmt::debug!("disconnect_peer from {:?} in {:?}", client, self.session.state);
        for cancelled in self.session.cancel_opposite(false) {
            self.indicate(ScoFwdIndication::ConnectCfm {
                client: cancelled,
                status: ScoFwdStatus::Cancelled,
            });
        }
        match self.session.state {
            ScoFwdState::Idle => {
                self.indicate(ScoFwdIndication::DisconnectCfm {
                    client,
                    status: ScoFwdStatus::Success,
                });
            }
            ScoFwdState::ServiceSearch | ScoFwdState::Connecting => {
                self.session.defer(DeferredOp::Disconnect(client))?;
            }
            ScoFwdState::Disconnecting => {
                self.session.add_disconnect_waiter(client)?;
            }
            _ => {
                self.session.add_disconnect_waiter(client)?;
                self.set_state(ScoFwdState::Disconnecting);
                self.transport.disconnect();
            }
        }
        Ok(())
    }

    /// Start forwarding the live call audio to the peer once the link
    /// allows it.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError::TooManyDeferredOps`] when the link is mid-transition
    /// and the deferral queue is full.
    pub fn enable_forwarding(&mut self) -> Result<(), ScoFwdError> {
        self.forwarding_requested = true;
        match self.session.state {
            state if state.is_locked() => self.session.defer(DeferredOp::EnableForwarding),
            ScoFwdState::Connected | ScoFwdState::ConnectedActive => {
                self.set_state(ScoFwdState::ConnectedActiveSendPendingRoleAck);
                Ok(())
            }
            state => {
                defmt::debug!("forwarding requested in {:?}, waiting for link", state);
                Ok(())
            }
        }
    }

    /// Stop forwarding call audio.
    ///
    /// # Errors
    ///
    /// [`ScoFwdError::TooManyDeferredOps`] when the link is mid-transition
    /// and the deferral queue is full.
    pub fn disable_forwarding(&mut self) -> Result<(), ScoFwdError> {
        self.forwarding_requested = false;
        if self.session.state.is_locked() {
            return self.session.defer(DeferredOp::DisableForwarding);
        }
        if self.session.state.is_sending() {
            self.set_state(ScoFwdState::ConnectedActive);
        }
        Ok(())
    }

    /// Answer the incoming call, relaying to the peer when the call
    /// lives there.
    pub fn call_accept(&mut self) {
        if self.session.peer_incoming_call && self.session.state.is_connected() {
            self.signalling.send(OtaMessage::CallAnswer);
        } else {
            self.calls.accept_call();
        }
    }

    /// Reject the incoming call, relaying to the peer when the call
    /// lives there.
    pub fn call_reject(&mut self) {
        if self.session.peer_incoming_call && self.session.state.is_connected() {
            self.signalling.send(OtaMessage::CallReject);
        } else {
            self.calls.reject_call();
        }
    }

    /// Hang up the current call, relaying to the peer when the call
    /// lives there.
    pub fn call_hangup(&mut self) {
        if self.session.state == ScoFwdState::ConnectedActiveReceive {
            self.signalling.send(OtaMessage::CallHangup);
        } else {
            self.calls.hangup_call();
        }
    }

    /// Start a voice dial, relaying to the peer when this device has no
    /// handset link.
    pub fn call_voice_dial(&mut self) {
        if self.session.state == ScoFwdState::ConnectedActiveReceive {
            self.signalling.send(OtaMessage::CallVoiceDial);
        } else {
            self.calls.voice_dial();
        }
    }

    /// Begin a volume ramp, relaying to the peer when the call lives
    /// there.
    pub fn volume_start(&mut self, steps: i8) {
        if self.session.state == ScoFwdState::ConnectedActiveReceive {
            self.signalling.send(OtaMessage::VolumeStart { steps });
        } else {
            self.calls.volume_start(steps);
        }
    }

    /// End a volume ramp, relaying to the peer when the call lives
    /// there.
    pub fn volume_stop(&mut self, steps: i8) {
        if self.session.state == ScoFwdState::ConnectedActiveReceive {
            self.signalling.send(OtaMessage::VolumeStop { steps });
        } else {
            self.calls.volume_stop(steps);
        }
    }

    /// Confirmation of this device's role on the link. Sending starts
    /// only once this device is the scheduling-preferred side.
    pub fn notify_role_changed(&mut self, role: LinkRole) {
        defmt::debug!("link role now {:?} in {:?}", role, self.session.state);
        if self.session.state == ScoFwdState::ConnectedActiveSendPendingRoleAck
            && role == LinkRole::Central
        {
            self.set_state(ScoFwdState::ConnectedActiveSend);
        }
    }

    /// Enable or disable forwarding of the peer's microphone.
    pub fn set_mic_forwarding(&mut self, enabled: bool) {
        self.mic_forward = enabled;
        if self.session.state.is_streaming() {
            self.signalling.send(if enabled {
                OtaMessage::MicFwdStart
            } else {
                OtaMessage::MicFwdStop
            });
            self.audio.set_mic_forward_active(enabled);
        }
    }

    /// Dispatch one event. Runs to completion; notifications appear via
    /// [`Self::next_indication`].
    pub fn handle_event(&mut self, event: ScoFwdEvent) {
        match event {
            ScoFwdEvent::ConnectPeer(client) => {
                if let Err(e) = self.connect_peer(client) {
                    defmt::warn!("connect_peer: {:?}", e);
                }
            }
            ScoFwdEvent::DisconnectPeer(client) => {
                if let Err(e) = self.disconnect_peer(client) {
                    defmt::warn!("disconnect_peer: {:?}", e);
                }
            }
            ScoFwdEvent::EnableForwarding => {
                if let Err(e) = self.enable_forwarding() {
                    defmt::warn!("enable_forwarding: {:?}", e);
                }
            }
            ScoFwdEvent::DisableForwarding => {
                if let Err(e) = self.disable_forwarding() {
                    defmt::warn!("disable_forwarding: {:?}", e);
                }
            }
            ScoFwdEvent::ServiceSearchCfm { port } => self.handle_service_search_cfm(port),
            ScoFwdEvent::ConnectCfm { success } => self.handle_connect_cfm(success),
            ScoFwdEvent::ConnectInd => self.handle_connect_ind(),
            ScoFwdEvent::DisconnectCfm => self.handle_disconnect_cfm(),
            ScoFwdEvent::LinkLost => self.handle_link_lost(),
            ScoFwdEvent::RoleChanged(role) => self.notify_role_changed(role),
            ScoFwdEvent::DataReceived => self.drain_received_audio(),
            ScoFwdEvent::MoreFrames | ScoFwdEvent::SpaceAvailable => self.drain_outgoing_audio(),
            ScoFwdEvent::OtaData(data) => self.handle_ota_data(&data),
            ScoFwdEvent::OtaTxResult { delivered } => {
                if !delivered {
                    defmt::warn!("control message delivery failed");
                }
            }
            ScoFwdEvent::IncomingCallStarted => {
                self.local_incoming_call = true;
                if self.session.state.is_connected() {
                    self.signalling.send(OtaMessage::IncomingCall);
                }
            }
            ScoFwdEvent::IncomingCallEnded => {
                self.local_incoming_call = false;
                if self.session.state.is_connected() {
                    self.signalling.send(OtaMessage::IncomingEnded);
                }
            }
            ScoFwdEvent::VolumeChanged(level) => {
                self.session.forward_volume = level;
                if self.session.state.is_sending() {
                    self.signalling.send(OtaMessage::VolumePush { level });
                }
            }
            ScoFwdEvent::CallAccept => self.call_accept(),
            ScoFwdEvent::CallReject => self.call_reject(),
            ScoFwdEvent::CallHangup => self.call_hangup(),
            ScoFwdEvent::CallVoiceDial => self.call_voice_dial(),
            ScoFwdEvent::VolumeStart(steps) => self.volume_start(steps),
            ScoFwdEvent::VolumeStop(steps) => self.volume_stop(steps),
            ScoFwdEvent::MicForwarding(enabled) => self.set_mic_forwarding(enabled),
            ScoFwdEvent::DeadlineElapsed => self.handle_deadline(),
        }
    }
}

/// Drive a session from an event channel, forwarding notifications to an
/// indication channel.
///
/// Races the next event against the receive-side concealment deadline;
/// when the deadline wins, a concealment step runs exactly as if a
/// [`ScoFwdEvent::DeadlineElapsed`] had been queued.
pub async fn run<T, A, P, C, K, M, const N: usize>(
    scofwd: &mut ScoFwd<T, A, P, C, K>,
    events: Receiver<'_, M, ScoFwdEvent, N>,
    indications: Sender<'_, M, ScoFwdIndication, N>,
) -> !
where
    T: LinkTransport,
    A: AudioChain,
    P: PeerSignalling,
    C: CallControl,
    K: Clock,
    M: RawMutex,
{
    loop {
        match scofwd.rx_deadline() {
            Some(deadline) => {
                let delay_us = rtime_sub(deadline, scofwd.now()).max(0) as u64;
                match select(events.receive(), Timer::after(Duration::from_micros(delay_us)))
                    .await
                {
                    Either::First(event) => scofwd.handle_event(event),
                    Either::Second(()) => scofwd.handle_event(ScoFwdEvent::DeadlineElapsed),
                }
            }
            None => {
                let event = events.receive().await;
                scofwd.handle_event(event);
            }
        }
        while let Some(indication) = scofwd.next_indication() {
            indications.send(indication).await;
        }
    }
}
