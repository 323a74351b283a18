mod mixer;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use basedrop::{Collector, Handle, Shared};
use cpal::{
    FromSample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use quartet_transport::{AudioArc, Clock, InstanceId, Output, OutputError};

pub use mixer::{Command, MAX_VOICES, Mixer, Status};

const COMMAND_CAPACITY: usize = 256;
const STATUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Output device name; the host default when `None` or not found.
    pub output_device: Option<String>,
}

/// Control-side handle to the mixer. Cheap to clone; all clones drive the
/// same stream and read the same clock.
#[derive(Clone)]
pub struct EngineOutput {
    inner: Arc<OutputInner>,
}

struct OutputInner {
    commands: Mutex<rtrb::Producer<Command>>,
    status: Mutex<rtrb::Consumer<Status>>,
    frames_rendered: Arc<AtomicU64>,
    next_instance: AtomicU64,
    sample_rate: u32,
    handle: Handle,
}

impl EngineOutput {
    /// Wire up a control handle and the mixer it drives.
    pub fn new(handle: Handle, sample_rate: u32, output_channels: usize) -> (Self, Mixer) {
        let (command_tx, command_rx) = rtrb::RingBuffer::<Command>::new(COMMAND_CAPACITY);
        let (status_tx, status_rx) = rtrb::RingBuffer::<Status>::new(STATUS_CAPACITY);
        let frames_rendered = Arc::new(AtomicU64::new(0));

        let mixer = Mixer::new(
            command_rx,
            status_tx,
            frames_rendered.clone(),
            output_channels,
        );
        let output = Self {
            inner: Arc::new(OutputInner {
                commands: Mutex::new(command_tx),
                status: Mutex::new(status_rx),
                frames_rendered,
                next_instance: AtomicU64::new(1),
                sample_rate,
                handle,
            }),
        };
        (output, mixer)
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    fn commands(&self) -> MutexGuard<'_, rtrb::Producer<Command>> {
        self.inner
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, cmd: Command) -> Result<(), OutputError> {
        self.commands()
            .push(cmd)
            .map_err(|_| OutputError::QueueFull)
    }
}

impl Clock for EngineOutput {
    fn now(&self) -> f64 {
        let frames = self.inner.frames_rendered.load(Ordering::Acquire);
        frames as f64 / self.inner.sample_rate as f64
    }
}

impl Output for EngineOutput {
    fn start(&self, audio: &AudioArc, position_secs: f64) -> Result<InstanceId, OutputError> {
        let instance = InstanceId(self.inner.next_instance.fetch_add(1, Ordering::Relaxed));
        let start_frame = (position_secs.max(0.0) * self.inner.sample_rate as f64) as usize;

        self.push(Command::Start {
            instance,
            audio: Shared::new(&self.inner.handle, audio.clone()),
            start_frame,
        })?;
        Ok(instance)
    }

    fn stop(&self, instance: InstanceId) {
        if self.push(Command::Stop { instance }).is_err() {
            log::warn!("command queue full, could not stop {instance:?}");
        }
    }

    fn drain_ended(&self) -> Vec<InstanceId> {
        let mut status = self
            .inner
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut ended = Vec::new();
        while let Ok(Status::Ended(instance)) = status.pop() {
            ended.push(instance);
        }
        ended
    }
}

pub struct AudioEngineHandle {
    output: EngineOutput,
    collector: Collector,
    _stream: cpal::Stream,
}

impl AudioEngineHandle {
    pub fn output(&self) -> &EngineOutput {
        &self.output
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    /// Reclaim buffers the audio thread has released. Call regularly from the
    /// control thread.
    pub fn collect(&mut self) {
        self.collector.collect();
    }
}

pub fn start(config: &EngineConfig) -> anyhow::Result<AudioEngineHandle> {
    let collector = Collector::new();

    let host = cpal::default_host();
    let device = select_device(&host, config.output_device.as_deref())?;
    let stream_config = device.default_output_config()?;

    log::info!(
        "output device {:?}: {} Hz, {} channels, {}",
        device.name().unwrap_or_default(),
        stream_config.sample_rate().0,
        stream_config.channels(),
        stream_config.sample_format()
    );

    let (output, mixer) = EngineOutput::new(
        collector.handle(),
        stream_config.sample_rate().0,
        stream_config.channels() as usize,
    );

    let stream = match stream_config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &stream_config.into(), mixer)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &stream_config.into(), mixer)?,
        sample_format => anyhow::bail!("unsupported sample format '{sample_format}'"),
    };

    stream.play()?;

    Ok(AudioEngineHandle {
        output,
        collector,
        _stream: stream,
    })
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> anyhow::Result<cpal::Device> {
    if let Some(wanted) = name {
        let found = host
            .output_devices()?
            .find(|d| d.name().map(|n| n == wanted).unwrap_or(false));
        match found {
            Some(device) => return Ok(device),
            None => log::warn!("output device '{wanted}' not found, using default"),
        }
    }

    host.default_output_device()
        .ok_or_else(|| anyhow::anyhow!("no output device found"))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| mixer.render(data),
        |err| log::error!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}
