//! Device output through cpal.
//!
//! `cpal::Stream` may not leave the thread that built it, so each output
//! gets a dedicated owner thread. The control side talks to it over a
//! channel and keeps only the sender, which makes [`CpalOutput`] `Send`.

use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, StreamConfig};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::{AudioBackend, AudioOutput};
use crate::error::{EngineError, Result};
use crate::render::RenderNode;

enum OutputCommand {
    Resume(Sender<Result<()>>),
    Suspend,
    Close,
}

/// Opens the default (or a named) output device.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    pub device_name: Option<String>,
    pub preferred_sample_rate: Option<u32>,
}

impl CpalBackend {
    pub fn new(preferred_sample_rate: Option<u32>) -> Self {
        Self { device_name: None, preferred_sample_rate }
    }

    pub fn with_device(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Names of the available output devices.
    pub fn device_names() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host
            .output_devices()
            .map_err(|e| EngineError::OutputUnavailable(e.to_string()))?;
        Ok(devices.filter_map(|d| d.name().ok()).collect())
    }
}

pub struct CpalOutput {
    commands: Option<Sender<OutputCommand>>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl AudioBackend for CpalBackend {
    type Output = CpalOutput;

    fn open<F>(&self, build: F) -> Result<CpalOutput>
    where
        F: FnOnce(u32) -> RenderNode + Send + 'static,
    {
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let (cmd_tx, cmd_rx) = unbounded();
        let backend = self.clone();
        let thread = std::thread::Builder::new()
            .name("audio-output".into())
            .spawn(move || run_output_thread(backend, build, ready_tx, cmd_rx))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => Ok(CpalOutput {
                commands: Some(cmd_tx),
                thread: Some(thread),
                sample_rate,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(EngineError::OutputUnavailable("output thread exited during setup".into()))
            }
        }
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&mut self) -> Result<()> {
        let Some(commands) = &self.commands else {
            return Err(EngineError::Disposed);
        };
        let (reply_tx, reply_rx) = bounded(1);
        commands
            .send(OutputCommand::Resume(reply_tx))
            .map_err(|_| EngineError::ResumeFailed("output thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| EngineError::ResumeFailed("output thread is gone".into()))?
    }

    fn suspend(&mut self) {
        if let Some(commands) = &self.commands {
            if commands.send(OutputCommand::Suspend).is_err() {
                warn!("suspend requested after the output thread exited");
            }
        }
    }

    fn close(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(OutputCommand::Close);
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

fn pick_device(backend: &CpalBackend) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(name) = &backend.device_name {
        let devices = host
            .output_devices()
            .map_err(|e| EngineError::OutputUnavailable(e.to_string()))?;
        for d in devices {
            if d.name().map(|n| n == *name).unwrap_or(false) {
                return Ok(d);
            }
        }
        return Err(EngineError::OutputUnavailable(format!("requested device not found: {name}")));
    }
    host.default_output_device()
        .ok_or_else(|| EngineError::OutputUnavailable("no output device available".into()))
}

fn choose_config(device: &cpal::Device, desired_rate: Option<u32>) -> Result<(StreamConfig, SampleFormat)> {
    let supported = device
        .default_output_config()
        .map_err(|e| EngineError::OutputUnavailable(e.to_string()))?;
    let sample_format = supported.sample_format();
    let mut config: StreamConfig = supported.config();

    // Use the requested rate when the device supports it at the default layout.
    if let Some(desired) = desired_rate.filter(|r| *r != config.sample_rate.0) {
        match device.supported_output_configs() {
            Ok(mut ranges) => {
                if let Some(range) = ranges.find(|r| {
                    r.channels() == config.channels
                        && r.sample_format() == sample_format
                        && r.min_sample_rate().0 <= desired
                        && desired <= r.max_sample_rate().0
                }) {
                    config = range.with_sample_rate(cpal::SampleRate(desired)).config();
                } else {
                    warn!("sample rate {desired} not supported, using {}", config.sample_rate.0);
                }
            }
            Err(e) => warn!("could not query supported output configs ({e}); using default"),
        }
    }
    Ok((config, sample_format))
}

/// Interleaved samples rendered per pass inside the device callback.
const SCRATCH_LEN: usize = 8192;

fn build_stream<T>(device: &cpal::Device, config: &StreamConfig, mut node: RenderNode) -> Result<cpal::Stream>
where
    T: Sample + SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = config.channels as usize;
    let mut scratch = [0.0f32; SCRATCH_LEN];
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_output(&mut node, &mut scratch, data, channels);
            },
            |err| error!("audio stream error: {err}"),
            None,
        )
        .map_err(|e| EngineError::OutputUnavailable(e.to_string()))
}

/// Render into a device buffer of any length through a fixed scratch
/// buffer, whole frames at a time. Never allocates.
fn fill_output<T>(node: &mut RenderNode, scratch: &mut [f32], data: &mut [T], channels: usize)
where
    T: Sample + FromSample<f32>,
{
    let chunk = if channels == 0 { 0 } else { (scratch.len() / channels) * channels };
    if chunk == 0 {
        data.fill(T::EQUILIBRIUM);
        return;
    }
    for out in data.chunks_mut(chunk) {
        let buf = &mut scratch[..out.len()];
        node.render_interleaved(buf, channels);
        for (o, s) in out.iter_mut().zip(buf.iter()) {
            *o = T::from_sample(s.clamp(-1.0, 1.0));
        }
    }
}

fn open_stream<F>(backend: &CpalBackend, build: F) -> Result<(cpal::Stream, u32)>
where
    F: FnOnce(u32) -> RenderNode,
{
    let device = pick_device(backend)?;
    let (config, sample_format) = choose_config(&device, backend.preferred_sample_rate)?;
    let sample_rate = config.sample_rate.0;
    let node = build(sample_rate);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(&device, &config, node)?,
        SampleFormat::I16 => build_stream::<i16>(&device, &config, node)?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, node)?,
        other => {
            return Err(EngineError::OutputUnavailable(format!(
                "unsupported device sample format: {other:?}"
            )))
        }
    };
    // Some hosts start streams on creation.
    if let Err(e) = stream.pause() {
        debug!("initial pause not supported: {e}");
    }
    info!(
        "audio output ready: {} ({} Hz, {} ch, {:?})",
        device.name().unwrap_or_else(|_| "unknown".into()),
        sample_rate,
        config.channels,
        sample_format
    );
    Ok((stream, sample_rate))
}

fn run_output_thread<F>(
    backend: CpalBackend,
    build: F,
    ready: Sender<Result<u32>>,
    commands: Receiver<OutputCommand>,
) where
    F: FnOnce(u32) -> RenderNode,
{
    let stream = match open_stream(&backend, build) {
        Ok((stream, sample_rate)) => {
            let _ = ready.send(Ok(sample_rate));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    // Keep the stream alive until closed or the handle is dropped.
    for cmd in commands.iter() {
        match cmd {
            OutputCommand::Resume(reply) => {
                let res = stream
                    .play()
                    .map_err(|e| EngineError::ResumeFailed(e.to_string()));
                let _ = reply.send(res);
            }
            OutputCommand::Suspend => {
                if let Err(e) = stream.pause() {
                    warn!("failed to pause audio stream: {e}");
                }
            }
            OutputCommand::Close => break,
        }
    }
    drop(stream);
    debug!("audio output thread finished");
}
