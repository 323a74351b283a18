//! Per-part playback state.

use quartet_transport::{AudioArc, InstanceId, Output, OutputError, Part};

/// Called with the new playing flag after every [`TrackState::set_playing`].
pub type UpdateFn = Box<dyn FnMut(Part, bool) + Send>;

/// How a part starts sounding relative to the rest of the composition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartMode {
    /// Start from the top, unsynchronized.
    Solo,
    /// Start from the top and become the phase reference of a new group.
    Lead,
    /// Join a running group that started at the given clock time, seeking
    /// in by however long the group has been playing.
    Follow(Option<f64>),
}

/// A live rendering of a buffer, owned exclusively by one [`TrackState`].
///
/// Dropping it stops the instance. An instance that already ended on its own
/// is disarmed first so nothing is sent for it.
pub struct SoundingInstance<O: Output> {
    id: InstanceId,
    output: O,
    armed: bool,
}

impl<O: Output> SoundingInstance<O> {
    fn start(output: &O, audio: &AudioArc, position_secs: f64) -> Result<Self, OutputError> {
        let id = output.start(audio, position_secs)?;
        Ok(Self {
            id,
            output: output.clone(),
            armed: true,
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<O: Output> Drop for SoundingInstance<O> {
    fn drop(&mut self) {
        if self.armed {
            self.output.stop(self.id);
        }
    }
}

pub struct TrackState<O: Output> {
    part: Part,
    audio: Option<AudioArc>,
    loading: bool,
    playing: bool,
    active: Option<SoundingInstance<O>>,
    on_update: Option<UpdateFn>,
}

impl<O: Output> TrackState<O> {
    pub fn new(part: Part, audio: Option<AudioArc>, loading: bool) -> Self {
        Self {
            part,
            audio,
            loading,
            playing: false,
            active: None,
            on_update: None,
        }
    }

    /// The virtual "all parts" state. It never owns audio.
    pub fn aggregate() -> Self {
        Self::new(Part::All, None, false)
    }

    pub fn with_updates(mut self, on_update: UpdateFn) -> Self {
        self.on_update = Some(on_update);
        self
    }

    pub fn part(&self) -> Part {
        self.part
    }

    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    pub fn is_load_ended(&self) -> bool {
        !self.loading
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.active.as_ref().map(SoundingInstance::id)
    }

    /// Start or stop this part.
    ///
    /// Returns the clock time the part started at when it became the lead of a
    /// new group, `None` otherwise. Parts without audio only flip their flag.
    /// A part whose instance the output refuses to start stays stopped.
    pub fn set_playing(&mut self, play: bool, mode: StartMode, output: &O) -> Option<f64> {
        self.playing = play;
        let mut group_start = None;

        if play {
            if let Some(audio) = &self.audio {
                // the superseded instance must be gone before its successor exists
                drop(self.active.take());

                let now = output.now();
                let position = match mode {
                    StartMode::Solo | StartMode::Lead => 0.0,
                    StartMode::Follow(offset) => offset.map_or(0.0, |start| (now - start).max(0.0)),
                };

                match SoundingInstance::start(output, audio, position) {
                    Ok(instance) => {
                        log::debug!("{} started at {position:.3}s as {:?}", self.part, instance.id());
                        self.active = Some(instance);
                        if mode == StartMode::Lead {
                            group_start = Some(now);
                        }
                    }
                    Err(err) => {
                        log::warn!("{} could not start: {err}", self.part);
                        self.playing = false;
                    }
                }
            }
        } else if let Some(instance) = self.active.take() {
            log::debug!("{} stopped {:?}", self.part, instance.id());
            drop(instance);
        }

        if let Some(on_update) = self.on_update.as_mut() {
            on_update(self.part, self.playing);
        }
        group_start
    }

    /// Release the instance `id` after it reached its natural end.
    /// Returns false when `id` is not this part's live instance.
    pub(crate) fn finish(&mut self, id: InstanceId) -> bool {
        match self.active.take() {
            Some(instance) if instance.id() == id => {
                instance.disarm();
                true
            }
            other => {
                self.active = other;
                false
            }
        }
    }
}
