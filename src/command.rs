use crate::params::ParamId;

/// An automation instruction sent from the control thread to the render thread.
///
/// Events carry no absolute timestamp: the render side applies each one at the
/// first block boundary after it is popped, measured against its own frame
/// clock. A ramp always starts from the lane's live interpolated value at that
/// moment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamEvent {
    pub param: ParamId,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Step change.
    SetValue(f32),
    /// Linear ramp to `target` over `frames`, cancelling any in-flight ramp.
    RampTo { target: f32, frames: u64 },
    /// Freeze the lane at its live value.
    Hold,
}

impl ParamEvent {
    pub fn set(param: ParamId, value: f32) -> Self {
        Self { param, kind: EventKind::SetValue(value) }
    }

    pub fn ramp(param: ParamId, target: f32, frames: u64) -> Self {
        Self { param, kind: EventKind::RampTo { target, frames } }
    }

    pub fn hold(param: ParamId) -> Self {
        Self { param, kind: EventKind::Hold }
    }
}
