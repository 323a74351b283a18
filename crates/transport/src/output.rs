use crate::AudioArc;

/// Identity of one sounding instance of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub u64);

/// Monotonic playback clock, in seconds.
///
/// The unit matches `AudioArc::duration_secs`, so group offsets computed from
/// it can be used directly as seek positions.
pub trait Clock {
    fn now(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("output command queue is full")]
    QueueFull,

    #[error("output unavailable: {0}")]
    Unavailable(String),
}

/// Something that can render sounding instances of decoded buffers.
///
/// Implementations are cheap handles; clones refer to the same output.
pub trait Output: Clock + Clone {
    /// Start a new instance of `audio` at `position_secs` into the buffer.
    fn start(&self, audio: &AudioArc, position_secs: f64) -> Result<InstanceId, OutputError>;

    /// Stop an instance. Stopped instances never report a natural end.
    /// Unknown or already finished ids are ignored.
    fn stop(&self, instance: InstanceId);

    /// Instances that reached the end of their buffer since the last call.
    fn drain_ended(&self) -> Vec<InstanceId>;
}
