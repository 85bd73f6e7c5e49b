//! Control Sub-Protocol
//!
//! Small control messages multiplexed over the peer-signalling transport,
//! separate from the audio data path. The sending earbud uses the `0x01`
//! tag group to drive the receiver's chain and relay call/volume state;
//! the receiving earbud uses the `0x41` tag group to relay user actions
//! back to the earbud that owns the call.

use heapless::Vec;

/// Errors raised by the control message codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OtaError {
    /// Message was empty.
    Empty,
    /// Unrecognized message tag.
    UnknownTag(u8),
    /// Payload length does not match the tag.
    BadLength,
}

/// A control message exchanged between the earbuds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum OtaMessage {
    /// Forwarded audio is about to start; the peer should bring up its
    /// receive chain.
    Setup,
    /// Forwarded audio is about to end; the peer should tear its receive
    /// chain down.
    Teardown,
    /// There is an incoming call on this device.
    IncomingCall,
    /// The incoming call has terminated.
    IncomingEnded,
    /// Microphone path has been set up remotely.
    MicSetup,
    /// New playback volume for the forwarded stream.
    VolumePush {
        /// Absolute volume level.
        level: u8,
    },
    /// The peer started a volume ramp.
    VolumeStart {
        /// Signed step direction/size.
        steps: i8,
    },
    /// The peer stopped a volume ramp.
    VolumeStop {
        /// Signed step direction/size.
        steps: i8,
    },
    /// The peer requests the incoming call be answered.
    CallAnswer,
    /// The peer requests the incoming call be rejected.
    CallReject,
    /// The peer requests the current call be hung up.
    CallHangup,
    /// The peer requests a voice dial.
    CallVoiceDial,
    /// Start forwarding the peer's microphone.
    MicFwdStart,
    /// Stop forwarding the peer's microphone.
    MicFwdStop,
}

// Sender-to-receiver tag group.
const TAG_SETUP: u8 = 0x01;
const TAG_TEARDOWN: u8 = 0x02;
const TAG_INCOMING_CALL: u8 = 0x03;
const TAG_INCOMING_ENDED: u8 = 0x04;
const TAG_MIC_SETUP: u8 = 0x05;
const TAG_VOLUME_PUSH: u8 = 0x06;

// Receiver-to-sender tag group.
const TAG_VOLUME_START: u8 = 0x41;
const TAG_VOLUME_STOP: u8 = 0x42;
const TAG_CALL_ANSWER: u8 = 0x43;
const TAG_CALL_REJECT: u8 = 0x44;
const TAG_CALL_HANGUP: u8 = 0x45;
const TAG_CALL_VOICE_DIAL: u8 = 0x46;
const TAG_MICFWD_START: u8 = 0x48;
const TAG_MICFWD_STOP: u8 = 0x49;

/// Longest encoded control message.
pub const MAX_OTA_MESSAGE_SIZE: usize = 2;

impl OtaMessage {
    /// Serialize to the wire form: a tag octet plus an optional argument.
    #[must_use]
    pub fn to_bytes(self) -> Vec<u8, MAX_OTA_MESSAGE_SIZE> {
        let mut out = Vec::new();
        match self {
            Self::Setup => {
                let _ = out.push(TAG_SETUP);
            }
            Self::Teardown => {
                let _ = out.push(TAG_TEARDOWN);
            }
            Self::IncomingCall => {
                let _ = out.push(TAG_INCOMING_CALL);
            }
            Self::IncomingEnded => {
                let _ = out.push(TAG_INCOMING_ENDED);
            }
            Self::MicSetup => {
                let _ = out.push(TAG_MIC_SETUP);
            }
            Self::VolumePush { level } => {
                let _ = out.push(TAG_VOLUME_PUSH);
                let _ = out.push(level);
            }
            Self::VolumeStart { steps } => {
                let _ = out.push(TAG_VOLUME_START);
                let _ = out.push(steps as u8);
            }
            Self::VolumeStop { steps } => {
                let _ = out.push(TAG_VOLUME_STOP);
                let _ = out.push(steps as u8);
            }
            Self::CallAnswer => {
                let _ = out.push(TAG_CALL_ANSWER);
            }
            Self::CallReject => {
                let _ = out.push(TAG_CALL_REJECT);
            }
            Self::CallHangup => {
                let _ = out.push(TAG_CALL_HANGUP);
            }
            Self::CallVoiceDial => {
                let _ = out.push(TAG_CALL_VOICE_DIAL);
            }
            Self::MicFwdStart => {
                let _ = out.push(TAG_MICFWD_START);
            }
            Self::MicFwdStop => {
                let _ = out.push(TAG_MICFWD_STOP);
            }
        }
        out
    }

    /// Parse from the wire form.
    ///
    /// # Errors
    ///
    /// `Empty` for a zero-length message, `UnknownTag` for an unassigned
    /// tag, `BadLength` when the argument octet is missing or extra octets
    /// trail a message.
    pub fn from_bytes(data: &[u8]) -> Result<Self, OtaError> {
        let (&tag, args) = data.split_first().ok_or(OtaError::Empty)?;
        let msg = match (tag, args) {
            (TAG_SETUP, []) => Self::Setup,
            (TAG_TEARDOWN, []) => Self::Teardown,
            (TAG_INCOMING_CALL, []) => Self::IncomingCall,
            (TAG_INCOMING_ENDED, []) => Self::IncomingEnded,
            (TAG_MIC_SETUP, []) => Self::MicSetup,
            (TAG_VOLUME_PUSH, &[level]) => Self::VolumePush { level },
            (TAG_VOLUME_START, &[steps]) => Self::VolumeStart { steps: steps as i8 },
            (TAG_VOLUME_STOP, &[steps]) => Self::VolumeStop { steps: steps as i8 },
            (TAG_CALL_ANSWER, []) => Self::CallAnswer,
            (TAG_CALL_REJECT, []) => Self::CallReject,
            (TAG_CALL_HANGUP, []) => Self::CallHangup,
            (TAG_CALL_VOICE_DIAL, []) => Self::CallVoiceDial,
            (TAG_MICFWD_START, []) => Self::MicFwdStart,
            (TAG_MICFWD_STOP, []) => Self::MicFwdStop,
            (
                TAG_SETUP..=TAG_VOLUME_PUSH
                | TAG_VOLUME_START..=TAG_CALL_VOICE_DIAL
                | TAG_MICFWD_START
                | TAG_MICFWD_STOP,
                _,
            ) => return Err(OtaError::BadLength),
            _ => return Err(OtaError::UnknownTag(tag)),
        };
        Ok(msg)
    }
}
