//! Call Control Seam
//!
//! The HFP call state machine runs on the earbud that owns the call. The
//! peer relays user actions (answer, reject, hangup, voice dial, volume
//! ramps) over the control channel; this trait is where those relayed
//! actions land on the owning side.

/// The embedder's call state machine.
pub trait CallControl {
    /// Answer the incoming call.
    fn accept_call(&mut self);

    /// Reject the incoming call.
    fn reject_call(&mut self);

    /// Hang up the current call.
    fn hangup_call(&mut self);

    /// Start a voice dial.
    fn voice_dial(&mut self);

    /// Begin a volume ramp of `steps` per tick.
    fn volume_start(&mut self, steps: i8);

    /// End a volume ramp.
    fn volume_stop(&mut self, steps: i8);
}
