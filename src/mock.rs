//! Test doubles for the collaborator seams, shared by the module tests.

use core::cell::Cell;

use heapless::{Deque, Vec};

use crate::audio::AudioChain;
use crate::constants::AIR_FRAME_OCTETS;
use crate::frame::{AudioFrame, ForwardedFrame};
use crate::ota::OtaMessage;
use crate::telephony::CallControl;
use crate::transport::{LinkTransport, PeerSignalling, TransportError};
use crate::wallclock::{Clock, Rtime, WallclockCorrelation};

/// Manually advanced clock.
#[derive(Debug, Default)]
pub struct FakeClock {
    now: Cell<Rtime>,
}

impl FakeClock {
    pub fn at(now: Rtime) -> Self {
        Self { now: Cell::new(now) }
    }

    pub fn set(&self, now: Rtime) {
        self.now.set(now);
    }

    pub fn advance(&self, delta_us: u32) {
        self.now.set(self.now.get().wrapping_add(delta_us));
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Rtime {
        self.now.get()
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    pub sent: Vec<Vec<u8, AIR_FRAME_OCTETS>, 16>,
    /// Sends accepted before `NoSpace`; `usize::MAX` for unlimited.
    pub space: usize,
    pub rx_queue: Deque<Vec<u8, AIR_FRAME_OCTETS>, 16>,
    pub connected: bool,
    pub searches: Vec<u16, 8>,
    pub connects: Vec<u16, 8>,
    pub connect_responses: Vec<bool, 8>,
    pub disconnects: usize,
    pub role_requests: usize,
    pub role_switches: Vec<bool, 8>,
    pub correlation: Option<WallclockCorrelation>,
}

impl MockTransport {
    pub fn connected() -> Self {
        Self {
            space: usize::MAX,
            connected: true,
            correlation: Some(WallclockCorrelation { offset_us: 0 }),
            ..Self::default()
        }
    }
}

impl LinkTransport for MockTransport {
    fn start_service_search(&mut self, service_class: u16) {
        self.searches.push(service_class).unwrap();
    }

    fn connect(&mut self, remote_port: u16) {
        self.connects.push(remote_port).unwrap();
    }

    fn respond_connect(&mut self, accept: bool) {
        self.connect_responses.push(accept).unwrap();
    }

    fn disconnect(&mut self) {
        self.disconnects += 1;
    }

    fn try_send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if self.space == 0 {
            return Err(TransportError::NoSpace);
        }
        if self.space != usize::MAX {
            self.space -= 1;
        }
        let mut copy = Vec::new();
        copy.extend_from_slice(packet).unwrap();
        self.sent.push(copy).unwrap();
        Ok(())
    }

    fn try_recv(&mut self) -> Option<Vec<u8, AIR_FRAME_OCTETS>> {
        self.rx_queue.pop_front()
    }

    fn request_preferred_role(&mut self) {
        self.role_requests += 1;
    }

    fn allow_role_switch(&mut self, allowed: bool) {
        self.role_switches.push(allowed).unwrap();
    }

    fn wallclock_correlation(&self) -> Option<WallclockCorrelation> {
        self.correlation
    }
}

#[derive(Debug, Default)]
pub struct MockSignalling {
    pub sent: Vec<OtaMessage, 16>,
}

impl PeerSignalling for MockSignalling {
    fn send(&mut self, msg: OtaMessage) {
        self.sent.push(msg).unwrap();
    }
}

#[derive(Debug, Default)]
pub struct MockAudioChain {
    pub frames: Deque<AudioFrame, 16>,
    pub delivered: Vec<ForwardedFrame, 64>,
    pub send_chain_running: bool,
    pub receive_chain_running: bool,
    pub volume: u8,
    pub mic_forward: bool,
    pub pre_delay: u8,
}

impl AudioChain for MockAudioChain {
    fn start_send_chain(&mut self, mic_forward: bool) {
        self.send_chain_running = true;
        self.mic_forward = mic_forward;
    }

    fn stop_send_chain(&mut self) {
        self.send_chain_running = false;
    }

    fn start_receive_chain(&mut self, volume: u8, mic_forward: bool, pre_delay: u8) {
        self.receive_chain_running = true;
        self.volume = volume;
        self.mic_forward = mic_forward;
        self.pre_delay = pre_delay;
    }

    fn stop_receive_chain(&mut self) {
        self.receive_chain_running = false;
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume;
    }

    fn set_mic_forward_active(&mut self, active: bool) {
        self.mic_forward = active;
    }

    fn next_frame(&mut self) -> Option<AudioFrame> {
        self.frames.pop_front()
    }

    fn deliver_frame(&mut self, frame: ForwardedFrame) {
        self.delivered.push(frame).unwrap();
    }
}

#[derive(Debug, Default)]
pub struct MockCallControl {
    pub accepts: usize,
    pub rejects: usize,
    pub hangups: usize,
    pub voice_dials: usize,
    pub ramps: Vec<(bool, i8), 8>,
}

impl CallControl for MockCallControl {
    fn accept_call(&mut self) {
        self.accepts += 1;
    }

    fn reject_call(&mut self) {
        self.rejects += 1;
    }

    fn hangup_call(&mut self) {
        self.hangups += 1;
    }

    fn voice_dial(&mut self) {
        self.voice_dials += 1;
    }

    fn volume_start(&mut self, steps: i8) {
        self.ramps.push((true, steps)).unwrap();
    }

    fn volume_stop(&mut self, steps: i8) {
        self.ramps.push((false, steps)).unwrap();
    }
}

/// One valid encoder frame with an arbitrary body.
pub fn encoder_frame(ttp: Rtime) -> AudioFrame {
    let mut data = [0u8; crate::constants::AUDIO_FRAME_OCTETS];
    data[0] = 0x01;
    data[1] = 0x08;
    data[2] = 0xAD;
    for (i, b) in data[crate::constants::STRIPPED_HEADER_SIZE..]
        .iter_mut()
        .enumerate()
    {
        *b = i as u8;
    }
    AudioFrame::from_encoder(ttp, &data).unwrap()
}
