//! Link State Machine
//!
//! State transitions and the handlers for transport, discovery and
//! control-channel events. Entry and exit actions hang off
//! [`ScoFwd::set_state`]: the send and receive sub-states own the time
//! base binding and the audio chains, so every path in or out of them
//! releases those resources exactly once.

use crate::DeviceRole;
use crate::audio::AudioChain;
use crate::ota::OtaMessage;
use crate::profile::{ScoFwd, ScoFwdIndication};
use crate::session::{DeferredOp, ScoFwdState};
use crate::telephony::CallControl;
use crate::transport::{LinkTransport, PeerSignalling};
use crate::wallclock::Clock;
use crate::ScoFwdStatus;

impl<T, A, P, C, K> ScoFwd<T, A, P, C, K>
where
    T: LinkTransport,
    A: AudioChain,
    P: PeerSignalling,
    C: CallControl,
    K: Clock,
{
    /// Move the state machine, running exit and entry actions for the
    /// states being left and entered.
    pub(crate) fn set_state(&mut self, new: ScoFwdState) {
        let old = self.session.state;
        if old == new {
            return;
        }
        defmt::info!("link state {:?} -> {:?}", old, new);

        if old == ScoFwdState::ConnectedActiveReceive {
            self.exit_receive();
        }
        if old.is_sending() && !new.is_sending() {
            self.exit_send(old);
        }

        self.session.state = new;

        match new {
            ScoFwdState::Idle => self.enter_idle(),
            ScoFwdState::Connected => self.enter_connected(),
            ScoFwdState::ConnectedActiveSendPendingRoleAck => {
                // ask the peer to bring its receive chain up, and give it
                // the volume to start at, before any audio flows
                self.signalling.send(OtaMessage::Setup);
                self.signalling.send(OtaMessage::VolumePush {
                    level: self.session.forward_volume,
                });
                self.transport.request_preferred_role();
            }
            ScoFwdState::ConnectedActiveSend => {
                if !old.is_sending() {
                    self.signalling.send(OtaMessage::Setup);
                    self.signalling.send(OtaMessage::VolumePush {
                        level: self.session.forward_volume,
                    });
                }
                self.start_send_audio();
            }
            ScoFwdState::ConnectedActiveReceive => self.enter_receive(),
            _ => {}
        }
    }

    fn enter_idle(&mut self) {
        self.session.remote_port = None;
        self.session.peer_incoming_call = false;
        self.replay_deferred();
    }

    fn enter_connected(&mut self) {
        self.notify_connect_waiters(ScoFwdStatus::Success);
        if self.local_incoming_call {
            self.signalling.send(OtaMessage::IncomingCall);
        }
        if self.forwarding_requested {
            self.set_state(ScoFwdState::ConnectedActiveSendPendingRoleAck);
        }
        self.replay_deferred();
    }

    fn start_send_audio(&mut self) {
        let Some(correlation) = self.transport.wallclock_correlation() else {
            panic!("no wallclock correlation on connected link");
        };
        self.time_base.enable(correlation);
        self.tx.reset();
        self.transport.allow_role_switch(false);
        self.audio.start_send_chain(self.mic_forward);
    }

    fn exit_send(&mut self, old: ScoFwdState) {
        self.signalling.send(OtaMessage::Teardown);
        if old == ScoFwdState::ConnectedActiveSend {
            self.audio.stop_send_chain();
            self.time_base.disable();
            self.tx.reset();
            self.transport.allow_role_switch(true);
        }
    }

    fn enter_receive(&mut self) {
        let Some(correlation) = self.transport.wallclock_correlation() else {
            panic!("no wallclock correlation on connected link");
        };
        self.time_base.enable(correlation);
        self.rx.reset();
        self.audio.start_receive_chain(
            self.session.forward_volume,
            self.mic_forward,
            self.config.rx_chain_pre_delay,
        );
    }

    fn exit_receive(&mut self) {
        self.rx.reset();
        self.audio.stop_receive_chain();
        self.time_base.disable();
    }

    fn replay_deferred(&mut self) {
        while !self.session.state.is_locked() {
            let Some(op) = self.session.deferred.pop_front() else {
                break;
            };
            defmt::debug!("replaying deferred {:?}", op);
            let result = match op {
                DeferredOp::Connect(client) => self.connect_peer(client),
                DeferredOp::Disconnect(client) => self.disconnect_peer(client),
                DeferredOp::EnableForwarding => self.enable_forwarding(),
                DeferredOp::DisableForwarding => self.disable_forwarding(),
            };
            if let Err(e) = result {
                defmt::warn!("deferred op failed: {:?}", e);
            }
        }
    }

    fn notify_connect_waiters(&mut self, status: ScoFwdStatus) {
        let waiters = core::mem::take(&mut self.session.connect_waiters);
        for &client in &waiters {
            self.indicate(ScoFwdIndication::ConnectCfm { client, status });
        }
    }

    fn notify_disconnect_waiters(&mut self, status: ScoFwdStatus) {
        let waiters = core::mem::take(&mut self.session.disconnect_waiters);
        for &client in &waiters {
            self.indicate(ScoFwdIndication::DisconnectCfm { client, status });
        }
    }

    pub(crate) fn start_service_search(&mut self) {
        self.session.sdp_retries_left = self.config.sdp_search_retries;
        self.set_state(ScoFwdState::ServiceSearch);
        self.transport.start_service_search(self.config.service_class);
    }

    pub(crate) fn handle_service_search_cfm(&mut self, port: Option<u16>) {
        if self.session.state != ScoFwdState::ServiceSearch {
            defmt::warn!("service search confirm in {:?}, ignored", self.session.state);
            return;
        }
        match port {
            Some(port) => {
                self.session.remote_port = Some(port);
                self.set_state(ScoFwdState::Connecting);
                self.session.pending_connects += 1;
                self.transport.connect(port);
            }
            None if self.session.sdp_retries_left > 0 => {
                self.session.sdp_retries_left -= 1;
                defmt::debug!(
                    "service search failed, {=u8} retries left",
                    self.session.sdp_retries_left
                );
                self.transport.start_service_search(self.config.service_class);
            }
            None => {
                defmt::warn!("service search exhausted");
                self.notify_connect_waiters(ScoFwdStatus::Failed);
                self.set_state(ScoFwdState::Idle);
            }
        }
    }

    pub(crate) fn handle_connect_ind(&mut self) {
        match self.session.state {
            ScoFwdState::Idle => {
                self.session.pending_connects += 1;
                self.transport.respond_connect(true);
                self.set_state(ScoFwdState::Connecting);
            }
            ScoFwdState::ServiceSearch | ScoFwdState::Connecting => {
                // crossover with our own attempt; only one side may accept
                if self.config.role == DeviceRole::Left {
                    defmt::info!("connect crossover, accepting inbound");
                    self.session.pending_connects += 1;
                    self.transport.respond_connect(true);
                    self.set_state(ScoFwdState::Connecting);
                } else {
                    defmt::info!("connect crossover, rejecting inbound");
                    self.transport.respond_connect(false);
                }
            }
            state => {
                defmt::warn!("connect indication in {:?}, rejected", state);
                self.transport.respond_connect(false);
            }
        }
    }

    pub(crate) fn handle_connect_cfm(&mut self, success: bool) {
        let Some(remaining) = self.session.pending_connects.checked_sub(1) else {
            panic!("connect confirm without a pending attempt");
        };
        self.session.pending_connects = remaining;
        if success {
            if self.session.state.is_connected() {
                defmt::debug!("duplicate connect confirm, link already up");
                return;
            }
            self.set_state(ScoFwdState::Connected);
        } else if remaining == 0 && !self.session.state.is_connected() {
            defmt::warn!("connect failed");
            self.notify_connect_waiters(ScoFwdStatus::Failed);
            self.set_state(ScoFwdState::Idle);
        }
    }

    pub(crate) fn handle_disconnect_cfm(&mut self) {
        if self.session.state == ScoFwdState::Disconnecting {
            self.notify_disconnect_waiters(ScoFwdStatus::Success);
            self.set_state(ScoFwdState::Idle);
        } else {
            defmt::warn!("disconnect confirm in {:?}", self.session.state);
            if self.session.state.is_connected() {
                self.set_state(ScoFwdState::Idle);
            }
        }
    }

    pub(crate) fn handle_link_lost(&mut self) {
        defmt::warn!("link lost in {:?}", self.session.state);
        if self.session.state.is_connected() || self.session.state == ScoFwdState::Disconnecting {
            self.notify_disconnect_waiters(ScoFwdStatus::Success);
            self.set_state(ScoFwdState::Idle);
        }
    }

    pub(crate) fn drain_outgoing_audio(&mut self) {
        if self.session.state != ScoFwdState::ConnectedActiveSend {
            return;
        }
        let now = self.clock.now();
        self.tx
            .drain(&mut self.audio, &mut self.transport, &self.time_base, now);
    }

    pub(crate) fn drain_received_audio(&mut self) {
        if self.session.state != ScoFwdState::ConnectedActiveReceive {
            while self.transport.try_recv().is_some() {}
            defmt::debug!("received audio in {:?}, discarded", self.session.state);
            return;
        }
        let now = self.clock.now();
        while let Some(packet) = self.transport.try_recv() {
            match self
                .rx
                .on_air_packet(&packet, &mut self.audio, &self.time_base, now)
            {
                Ok(outcome) => {
                    if outcome.audio_lost {
                        self.indicate(ScoFwdIndication::AudioMissing);
                    }
                }
                Err(e) => defmt::warn!("bad air packet: {:?}", e),
            }
        }
    }

    pub(crate) fn handle_deadline(&mut self) {
        if self.session.state != ScoFwdState::ConnectedActiveReceive {
            return;
        }
        let now = self.clock.now();
        if self.rx.on_deadline(&mut self.audio, now).audio_lost {
            self.indicate(ScoFwdIndication::AudioMissing);
        }
    }

    pub(crate) fn handle_ota_data(&mut self, data: &[u8]) {
        match OtaMessage::from_bytes(data) {
            Ok(msg) => self.handle_ota(msg),
            Err(e) => defmt::warn!("bad control message: {:?}", e),
        }
    }

    fn handle_ota(&mut self, msg: OtaMessage) {
        defmt::debug!("control message {:?} in {:?}", msg, self.session.state);
        match msg {
            OtaMessage::Setup => match self.session.state {
                ScoFwdState::Connected | ScoFwdState::ConnectedActive => {
                    self.set_state(ScoFwdState::ConnectedActiveReceive);
                }
                state => defmt::warn!("setup in {:?}, ignored", state),
            },
            OtaMessage::Teardown => {
                if self.session.state == ScoFwdState::ConnectedActiveReceive {
                    self.set_state(ScoFwdState::Connected);
                } else {
                    defmt::warn!("teardown in {:?}, ignored", self.session.state);
                }
            }
            OtaMessage::IncomingCall => self.session.peer_incoming_call = true,
            OtaMessage::IncomingEnded => self.session.peer_incoming_call = false,
            OtaMessage::MicSetup => self.mic_forward = true,
            OtaMessage::VolumePush { level } => {
                self.session.forward_volume = level;
                if self.session.state == ScoFwdState::ConnectedActiveReceive {
                    self.audio.set_volume(level);
                }
            }
            OtaMessage::VolumeStart { steps } => self.calls.volume_start(steps),
            OtaMessage::VolumeStop { steps } => self.calls.volume_stop(steps),
            OtaMessage::CallAnswer => self.calls.accept_call(),
            OtaMessage::CallReject => self.calls.reject_call(),
            OtaMessage::CallHangup => self.calls.hangup_call(),
            OtaMessage::CallVoiceDial => self.calls.voice_dial(),
            OtaMessage::MicFwdStart => self.audio.set_mic_forward_active(true),
            OtaMessage::MicFwdStop => self.audio.set_mic_forward_active(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{SCOFWD_SERVICE_CLASS, SDP_SEARCH_RETRIES};
    use crate::mock::{FakeClock, MockAudioChain, MockCallControl, MockSignalling, MockTransport, encoder_frame};
    use crate::profile::ScoFwdEvent;
    use crate::{ClientId, LinkRole, ScoFwdConfig};
    use heapless::Vec;

    type TestScoFwd = ScoFwd<MockTransport, MockAudioChain, MockSignalling, MockCallControl, FakeClock>;

    const NOW: u32 = 1_000_000;
    const PORT: u16 = 0x0081;

    fn scofwd(role: DeviceRole) -> TestScoFwd {
        let config = ScoFwdConfig { role, ..ScoFwdConfig::default() };
        ScoFwd::new(
            config,
            MockTransport::connected(),
            MockAudioChain::default(),
            MockSignalling::default(),
            MockCallControl::default(),
            FakeClock::at(NOW),
        )
    }

    fn connect(sf: &mut TestScoFwd, client: ClientId) {
        sf.connect_peer(client).unwrap();
        sf.handle_event(ScoFwdEvent::ServiceSearchCfm { port: Some(PORT) });
        sf.handle_event(ScoFwdEvent::ConnectCfm { success: true });
        assert_eq!(sf.state(), ScoFwdState::Connected);
    }

    fn ota(msg: OtaMessage) -> ScoFwdEvent {
        let mut data = Vec::new();
        data.extend_from_slice(&msg.to_bytes()).unwrap();
        ScoFwdEvent::OtaData(data)
    }

    fn drain_indications(sf: &mut TestScoFwd) -> Vec<ScoFwdIndication, 8> {
        let mut out = Vec::new();
        while let Some(ind) = sf.next_indication() {
            out.push(ind).unwrap();
        }
        out
    }

    #[test]
    fn connect_runs_discovery_then_transport_connect() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.connect_peer(ClientId(1)).unwrap();
        assert_eq!(sf.state(), ScoFwdState::ServiceSearch);
        assert_eq!(sf.transport.searches.as_slice(), &[SCOFWD_SERVICE_CLASS]);

        sf.handle_event(ScoFwdEvent::ServiceSearchCfm { port: Some(PORT) });
        assert_eq!(sf.state(), ScoFwdState::Connecting);
        assert_eq!(sf.transport.connects.as_slice(), &[PORT]);

        sf.handle_event(ScoFwdEvent::ConnectCfm { success: true });
        assert_eq!(sf.state(), ScoFwdState::Connected);
        assert_eq!(
            drain_indications(&mut sf).as_slice(),
            &[ScoFwdIndication::ConnectCfm {
                client: ClientId(1),
                status: ScoFwdStatus::Success,
            }]
        );
    }

    #[test]
    fn discovery_retries_then_reports_failure() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.connect_peer(ClientId(1)).unwrap();
        for _ in 0..=SDP_SEARCH_RETRIES {
            sf.handle_event(ScoFwdEvent::ServiceSearchCfm { port: None });
        }
        assert_eq!(sf.transport.searches.len(), 1 + SDP_SEARCH_RETRIES as usize);
        assert_eq!(sf.state(), ScoFwdState::Idle);
        assert_eq!(
            drain_indications(&mut sf).as_slice(),
            &[ScoFwdIndication::ConnectCfm {
                client: ClientId(1),
                status: ScoFwdStatus::Failed,
            }]
        );
    }

    #[test]
    fn connect_while_connected_confirms_immediately() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        drain_indications(&mut sf);
        sf.connect_peer(ClientId(2)).unwrap();
        assert_eq!(
            drain_indications(&mut sf).as_slice(),
            &[ScoFwdIndication::ConnectCfm {
                client: ClientId(2),
                status: ScoFwdStatus::Success,
            }]
        );
    }

    #[test]
    fn left_accepts_inbound_during_crossover() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.connect_peer(ClientId(1)).unwrap();
        sf.handle_event(ScoFwdEvent::ServiceSearchCfm { port: Some(PORT) });
        sf.handle_event(ScoFwdEvent::ConnectInd);
        assert_eq!(sf.transport.connect_responses.as_slice(), &[true]);
        // both attempts confirm; the first brings the link up
        sf.handle_event(ScoFwdEvent::ConnectCfm { success: true });
        assert_eq!(sf.state(), ScoFwdState::Connected);
        sf.handle_event(ScoFwdEvent::ConnectCfm { success: false });
        assert_eq!(sf.state(), ScoFwdState::Connected);
        assert_eq!(sf.session.pending_connects, 0);
    }

    #[test]
    fn right_rejects_inbound_during_crossover() {
        let mut sf = scofwd(DeviceRole::Right);
        sf.connect_peer(ClientId(1)).unwrap();
        sf.handle_event(ScoFwdEvent::ServiceSearchCfm { port: Some(PORT) });
        sf.handle_event(ScoFwdEvent::ConnectInd);
        assert_eq!(sf.transport.connect_responses.as_slice(), &[false]);
        // its own outbound attempt still completes
        sf.handle_event(ScoFwdEvent::ConnectCfm { success: true });
        assert_eq!(sf.state(), ScoFwdState::Connected);
    }

    #[test]
    fn inbound_connect_from_idle_is_accepted() {
        let mut sf = scofwd(DeviceRole::Right);
        sf.handle_event(ScoFwdEvent::ConnectInd);
        assert_eq!(sf.transport.connect_responses.as_slice(), &[true]);
        sf.handle_event(ScoFwdEvent::ConnectCfm { success: true });
        assert_eq!(sf.state(), ScoFwdState::Connected);
    }

    #[test]
    #[should_panic(expected = "connect confirm without a pending attempt")]
    fn connect_confirm_without_attempt_is_fatal() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.handle_connect_cfm(true);
    }

    #[test]
    fn disconnect_tears_the_link_down() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        drain_indications(&mut sf);
        sf.disconnect_peer(ClientId(1)).unwrap();
        assert_eq!(sf.state(), ScoFwdState::Disconnecting);
        assert_eq!(sf.transport.disconnects, 1);
        sf.handle_event(ScoFwdEvent::DisconnectCfm);
        assert_eq!(sf.state(), ScoFwdState::Idle);
        assert_eq!(
            drain_indications(&mut sf).as_slice(),
            &[ScoFwdIndication::DisconnectCfm {
                client: ClientId(1),
                status: ScoFwdStatus::Success,
            }]
        );
    }

    #[test]
    fn connect_during_disconnect_is_deferred_and_replayed() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.disconnect_peer(ClientId(1)).unwrap();
        sf.connect_peer(ClientId(2)).unwrap();
        assert_eq!(sf.state(), ScoFwdState::Disconnecting);

        sf.handle_event(ScoFwdEvent::DisconnectCfm);
        // the deferred connect restarted discovery
        assert_eq!(sf.state(), ScoFwdState::ServiceSearch);
        assert_eq!(sf.transport.searches.len(), 2);
    }

    #[test]
    fn new_connect_cancels_queued_disconnect() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.connect_peer(ClientId(1)).unwrap();
        // disconnect queued behind the in-flight connect
        sf.disconnect_peer(ClientId(2)).unwrap();
        drain_indications(&mut sf);
        sf.connect_peer(ClientId(3)).unwrap();
        assert_eq!(
            drain_indications(&mut sf).as_slice(),
            &[ScoFwdIndication::DisconnectCfm {
                client: ClientId(2),
                status: ScoFwdStatus::Cancelled,
            }]
        );
    }

    #[test]
    fn link_loss_returns_to_idle_and_releases_chains() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.enable_forwarding().unwrap();
        sf.notify_role_changed(LinkRole::Central);
        assert!(sf.audio.send_chain_running);

        sf.handle_event(ScoFwdEvent::LinkLost);
        assert_eq!(sf.state(), ScoFwdState::Idle);
        assert!(!sf.audio.send_chain_running);
        assert!(!sf.time_base.is_enabled());
    }

    #[test]
    fn forwarding_waits_for_the_preferred_role() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.enable_forwarding().unwrap();
        assert_eq!(sf.state(), ScoFwdState::ConnectedActiveSendPendingRoleAck);
        // receive chain setup is requested before audio flows
        assert_eq!(
            sf.signalling.sent.as_slice(),
            &[OtaMessage::Setup, OtaMessage::VolumePush { level: 0 }]
        );
        assert_eq!(sf.transport.role_requests, 1);
        assert!(!sf.audio.send_chain_running);

        sf.notify_role_changed(LinkRole::Peripheral);
        assert_eq!(sf.state(), ScoFwdState::ConnectedActiveSendPendingRoleAck);

        sf.notify_role_changed(LinkRole::Central);
        assert_eq!(sf.state(), ScoFwdState::ConnectedActiveSend);
        assert!(sf.audio.send_chain_running);
        assert!(sf.time_base.is_enabled());
        // role switches are held off while audio streams
        assert_eq!(sf.transport.role_switches.as_slice(), &[false]);
    }

    #[test]
    fn send_drain_forwards_frames_from_the_chain() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.enable_forwarding().unwrap();
        sf.notify_role_changed(LinkRole::Central);

        sf.audio.frames.push_back(encoder_frame(NOW + 70_000)).unwrap();
        sf.audio.frames.push_back(encoder_frame(NOW + 77_500)).unwrap();
        sf.handle_event(ScoFwdEvent::MoreFrames);
        assert_eq!(sf.transport.sent.len(), 2);
    }

    #[test]
    fn disable_forwarding_stops_the_stream() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.enable_forwarding().unwrap();
        sf.notify_role_changed(LinkRole::Central);
        sf.signalling.sent.clear();

        sf.disable_forwarding().unwrap();
        assert_eq!(sf.state(), ScoFwdState::ConnectedActive);
        assert_eq!(sf.signalling.sent.as_slice(), &[OtaMessage::Teardown]);
        assert!(!sf.audio.send_chain_running);
        assert!(!sf.time_base.is_enabled());
        assert_eq!(sf.transport.role_switches.as_slice(), &[false, true]);
    }

    #[test]
    fn audio_events_drive_forwarding() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ScoFwdEvent::EnableForwarding);
        assert!(sf.state().is_sending());
        sf.handle_event(ScoFwdEvent::DisableForwarding);
        assert_eq!(sf.state(), ScoFwdState::ConnectedActive);
    }

    #[test]
    fn forwarding_starts_on_connect_when_audio_is_already_up() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.handle_event(ScoFwdEvent::EnableForwarding);
        assert_eq!(sf.state(), ScoFwdState::Idle);
        sf.connect_peer(ClientId(1)).unwrap();
        sf.handle_event(ScoFwdEvent::ServiceSearchCfm { port: Some(PORT) });
        sf.handle_event(ScoFwdEvent::ConnectCfm { success: true });
        assert_eq!(sf.state(), ScoFwdState::ConnectedActiveSendPendingRoleAck);
    }

    #[test]
    fn setup_brings_the_receive_chain_up() {
        let mut sf = scofwd(DeviceRole::Right);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::VolumePush { level: 9 }));
        sf.handle_event(ota(OtaMessage::Setup));
        assert_eq!(sf.state(), ScoFwdState::ConnectedActiveReceive);
        assert!(sf.audio.receive_chain_running);
        assert_eq!(sf.audio.volume, 9);
        assert_eq!(sf.audio.pre_delay, sf.config.rx_chain_pre_delay);
        assert!(sf.time_base.is_enabled());

        sf.handle_event(ota(OtaMessage::Teardown));
        assert_eq!(sf.state(), ScoFwdState::Connected);
        assert!(!sf.audio.receive_chain_running);
        assert!(!sf.time_base.is_enabled());
        assert!(sf.rx_deadline().is_none());
    }

    #[test]
    fn received_packets_reach_the_receive_chain() {
        let mut sf = scofwd(DeviceRole::Right);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::Setup));

        let frame = encoder_frame(NOW + 40_000);
        let wall = crate::wallclock::WallClock24::new(NOW + 40_000);
        let air = crate::frame::AirFrame::from_audio(&frame, wall);
        sf.transport.rx_queue.push_back(air.to_bytes()).unwrap();
        sf.handle_event(ScoFwdEvent::DataReceived);

        assert_eq!(sf.audio.delivered.len(), 1);
        assert_eq!(sf.audio.delivered[0].ttp, NOW + 40_000);
        assert!(sf.rx_deadline().is_some());
    }

    #[test]
    fn volume_push_while_receiving_applies_immediately() {
        let mut sf = scofwd(DeviceRole::Right);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::Setup));
        sf.handle_event(ota(OtaMessage::VolumePush { level: 14 }));
        assert_eq!(sf.audio.volume, 14);
        assert_eq!(sf.session.forward_volume, 14);
    }

    #[test]
    fn local_volume_change_is_pushed_while_sending() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.enable_forwarding().unwrap();
        sf.notify_role_changed(LinkRole::Central);
        sf.signalling.sent.clear();

        sf.handle_event(ScoFwdEvent::VolumeChanged(11));
        assert_eq!(
            sf.signalling.sent.as_slice(),
            &[OtaMessage::VolumePush { level: 11 }]
        );

        // recorded but not relayed once sending stops
        sf.disable_forwarding().unwrap();
        sf.signalling.sent.clear();
        sf.handle_event(ScoFwdEvent::VolumeChanged(4));
        assert!(sf.signalling.sent.is_empty());
        assert_eq!(sf.session.forward_volume, 4);
    }

    #[test]
    fn mic_setup_arms_the_next_chain_start() {
        let mut sf = scofwd(DeviceRole::Right);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::MicSetup));
        sf.handle_event(ota(OtaMessage::Setup));
        assert!(sf.audio.receive_chain_running);
        assert!(sf.audio.mic_forward);
    }

    #[test]
    fn call_actions_relay_over_the_link_for_a_peer_call() {
        let mut sf = scofwd(DeviceRole::Right);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::IncomingCall));
        sf.call_accept();
        assert_eq!(sf.signalling.sent.as_slice(), &[OtaMessage::CallAnswer]);
        assert_eq!(sf.calls.accepts, 0);

        sf.handle_event(ota(OtaMessage::IncomingEnded));
        sf.call_accept();
        assert_eq!(sf.calls.accepts, 1);
    }

    #[test]
    fn relayed_call_actions_reach_local_call_control() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::CallAnswer));
        sf.handle_event(ota(OtaMessage::CallHangup));
        sf.handle_event(ota(OtaMessage::VolumeStart { steps: -2 }));
        sf.handle_event(ota(OtaMessage::VolumeStop { steps: -2 }));
        assert_eq!(sf.calls.accepts, 1);
        assert_eq!(sf.calls.hangups, 1);
        assert_eq!(sf.calls.ramps.as_slice(), &[(true, -2), (false, -2)]);
    }

    #[test]
    fn volume_ramp_relays_while_receiving() {
        let mut sf = scofwd(DeviceRole::Right);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ota(OtaMessage::Setup));
        sf.volume_start(1);
        sf.volume_stop(1);
        assert_eq!(
            sf.signalling.sent.as_slice(),
            &[
                OtaMessage::VolumeStart { steps: 1 },
                OtaMessage::VolumeStop { steps: 1 },
            ]
        );
        assert_eq!(sf.calls.ramps.len(), 0);
    }

    #[test]
    fn incoming_call_state_relays_to_the_peer() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.handle_event(ScoFwdEvent::IncomingCallStarted);
        assert!(sf.is_call_incoming());
        sf.handle_event(ScoFwdEvent::IncomingCallEnded);
        assert!(!sf.is_call_incoming());
        assert_eq!(
            sf.signalling.sent.as_slice(),
            &[OtaMessage::IncomingCall, OtaMessage::IncomingEnded]
        );
    }

    #[test]
    fn ringing_call_is_pushed_to_the_peer_on_connect() {
        let mut sf = scofwd(DeviceRole::Left);
        sf.handle_event(ScoFwdEvent::IncomingCallStarted);
        assert!(sf.signalling.sent.is_empty());
        connect(&mut sf, ClientId(1));
        assert_eq!(sf.signalling.sent.as_slice(), &[OtaMessage::IncomingCall]);
    }

    #[test]
    fn mic_forward_toggle_relays_and_pauses() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        sf.enable_forwarding().unwrap();
        sf.notify_role_changed(LinkRole::Central);
        sf.signalling.sent.clear();

        sf.set_mic_forwarding(true);
        assert_eq!(sf.signalling.sent.as_slice(), &[OtaMessage::MicFwdStart]);
        assert!(sf.audio.mic_forward);
        sf.set_mic_forwarding(false);
        assert!(!sf.audio.mic_forward);
    }

    #[test]
    fn malformed_control_message_is_ignored() {
        let mut sf = scofwd(DeviceRole::Left);
        connect(&mut sf, ClientId(1));
        let mut data = Vec::new();
        data.push(0x7F).unwrap();
        sf.handle_event(ScoFwdEvent::OtaData(data));
        assert_eq!(sf.state(), ScoFwdState::Connected);
    }
}
