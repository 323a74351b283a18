use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use basedrop::Shared;
use cpal::{FromSample, SizedSample};
use quartet_transport::{AudioArc, InstanceId};

/// Hard cap on simultaneously sounding instances, so the audio thread never allocates.
pub const MAX_VOICES: usize = 32;

/// End notices held back while the status ring is full.
const UNDELIVERED_CAPACITY: usize = MAX_VOICES * 2;

pub enum Command {
    Start {
        instance: InstanceId,
        audio: Shared<AudioArc>,
        start_frame: usize,
    },
    Stop {
        instance: InstanceId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ended(InstanceId),
}

struct Voice {
    instance: InstanceId,
    audio: Shared<AudioArc>,
    frame: usize,
}

impl Voice {
    fn finished(&self) -> bool {
        self.frame >= self.audio.frames()
    }
}

/// Audio-thread side of the engine: owns the sounding voices and renders them.
pub struct Mixer {
    voices: Vec<Voice>,
    commands: rtrb::Consumer<Command>,
    status: rtrb::Producer<Status>,
    /// Oldest first. Only once this is full as well is a notice lost.
    undelivered: Vec<InstanceId>,
    frames_rendered: Arc<AtomicU64>,
    output_channels: usize,
}

impl Mixer {
    pub fn new(
        commands: rtrb::Consumer<Command>,
        status: rtrb::Producer<Status>,
        frames_rendered: Arc<AtomicU64>,
        output_channels: usize,
    ) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            commands,
            status,
            undelivered: Vec::with_capacity(UNDELIVERED_CAPACITY),
            frames_rendered,
            output_channels: output_channels.max(1),
        }
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    /// Fill one interleaved output buffer.
    pub fn render<T>(&mut self, data: &mut [T])
    where
        T: SizedSample + FromSample<f32>,
    {
        self.flush_undelivered();
        self.apply_commands();

        let channels = self.output_channels;
        for frame in data.chunks_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let mut mixed = 0.0f32;
                for voice in &self.voices {
                    if !voice.finished() {
                        mixed += voice.audio.sample_for_output(voice.frame, ch);
                    }
                }
                *sample = T::from_sample(mixed);
            }
            for voice in &mut self.voices {
                if !voice.finished() {
                    voice.frame += 1;
                }
            }
        }

        self.retire_finished();

        let frames = (data.len() / channels) as u64;
        self.frames_rendered.fetch_add(frames, Ordering::Release);
    }

    fn apply_commands(&mut self) {
        while let Ok(cmd) = self.commands.pop() {
            match cmd {
                Command::Start {
                    instance,
                    audio,
                    start_frame,
                } => {
                    if self.voices.len() < MAX_VOICES {
                        self.voices.push(Voice {
                            instance,
                            audio,
                            frame: start_frame,
                        });
                    } else {
                        // no room; report it so the owner stops waiting on it
                        self.report_ended(instance);
                    }
                }
                Command::Stop { instance } => {
                    self.voices.retain(|v| v.instance != instance);
                }
            }
        }
    }

    fn retire_finished(&mut self) {
        let mut i = 0;
        while i < self.voices.len() {
            if self.voices[i].finished() {
                let voice = self.voices.remove(i);
                self.report_ended(voice.instance);
            } else {
                i += 1;
            }
        }
    }

    fn report_ended(&mut self, instance: InstanceId) {
        let delivered =
            self.undelivered.is_empty() && self.status.push(Status::Ended(instance)).is_ok();
        if !delivered && self.undelivered.len() < self.undelivered.capacity() {
            self.undelivered.push(instance);
        }
    }

    fn flush_undelivered(&mut self) {
        let status = &mut self.status;
        let mut open = true;
        self.undelivered.retain(|&instance| {
            open = open && status.push(Status::Ended(instance)).is_ok();
            !open
        });
    }
}
