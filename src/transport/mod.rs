//! Transport: the record/play state machine driving the media tools.

mod context;
mod session;
mod state;
pub mod transcript;

pub use context::{PlaybackEvent, TransportContext, TransportSettings};
pub use session::{Session, StatusSnapshot};
pub use state::{StateKind, StateOps};
pub use transcript::{CommandLog, MemoryCommandLog, NullCommandLog, WriterCommandLog};

use crate::defaults;
use crate::timeline::Millis;

/// Where a `seek` should go, relative to the current timecode or the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekTarget {
    Absolute(Millis),
    Forward(Millis),
    Backward(Millis),
    FromEnd(Millis),
}

impl SeekTarget {
    pub fn resolve(self, current: Millis, total: Millis) -> Millis {
        match self {
            SeekTarget::Absolute(target) => target,
            SeekTarget::Forward(delta) => current.saturating_add(delta),
            SeekTarget::Backward(delta) => current.saturating_sub(delta),
            SeekTarget::FromEnd(back) => total.saturating_sub(back),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SpeedChange {
    Absolute(f64),
    Relative(f64),
}

impl SpeedChange {
    pub fn apply(self, current: f64) -> f64 {
        let target = match self {
            SpeedChange::Absolute(value) => value,
            SpeedChange::Relative(delta) => current + delta,
        };
        clamp_speed(target)
    }
}

/// Clamps the magnitude into the accepted range, keeping the direction.
///
/// Zero and NaN become the slowest forward speed.
pub fn clamp_speed(speed: f64) -> f64 {
    if speed.is_nan() || speed == 0.0 {
        return defaults::MIN_SPEED;
    }
    let magnitude = speed.abs().clamp(defaults::MIN_SPEED, defaults::MAX_SPEED);
    magnitude.copysign(speed)
}
