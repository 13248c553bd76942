//! Audio-callback side of the engine.
//!
//! A `RenderNode` is moved into the output callback and owned by it for the
//! rest of its life. Per block it drains the event ring, resolves the
//! automation lanes and runs the generator; afterwards it publishes how many
//! frames it has produced. None of this allocates or blocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ringbuf::traits::Consumer;
use ringbuf::HeapCons;

use crate::automation::{AutomationBank, MAX_BLOCK};
use crate::command::ParamEvent;
use crate::config::EngineConfig;
use crate::generator::{OscillatorState, SignalGenerator};
use crate::params::{ParamId, ParamValues};

/// Count of frames rendered so far, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct FrameClock(Arc<AtomicU64>);

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn publish(&self, frames: u64) {
        self.0.store(frames, Ordering::Release);
    }
}

pub struct RenderNode {
    generator: SignalGenerator,
    automation: AutomationBank,
    events: HeapCons<ParamEvent>,
    clock: FrameClock,
    frame: u64,
    block_size: usize,
    left: Box<[f32; MAX_BLOCK]>,
    right: Box<[f32; MAX_BLOCK]>,
}

impl RenderNode {
    pub fn new(
        sample_rate: u32,
        initial: &ParamValues,
        config: &EngineConfig,
        events: HeapCons<ParamEvent>,
        clock: FrameClock,
    ) -> Self {
        let generator = SignalGenerator::new(
            sample_rate as f32,
            config.noise_color,
            config.dither_scale,
            config.seed,
        );
        Self {
            generator,
            automation: AutomationBank::new(initial),
            events,
            clock,
            frame: 0,
            block_size: config.block_size.clamp(1, MAX_BLOCK),
            left: Box::new([0.0; MAX_BLOCK]),
            right: Box::new([0.0; MAX_BLOCK]),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.generator.sample_rate()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frame
    }

    /// Live automation value of `id` at the current frame.
    pub fn param_value(&self, id: ParamId) -> f32 {
        self.automation.value_at(id, self.frame)
    }

    pub fn oscillator_state(&self) -> OscillatorState {
        self.generator.phases()
    }

    fn drain_events(&mut self) {
        while let Some(event) = self.events.try_pop() {
            self.automation.apply(event, self.frame);
        }
    }

    /// Apply queued events at the current frame without rendering. Rendering
    /// does this at the start of every block; zero-length renders do not.
    pub fn apply_pending_events(&mut self) {
        self.drain_events();
    }

    /// Resolve automation and run the generator for one block of `n <= block_size`
    /// frames into the node's own scratch buffers.
    fn render_block(&mut self, n: usize) {
        self.drain_events();
        let params = self.automation.resolve(self.frame, n);
        self.generator
            .process(&params, &mut self.left[..n], &mut self.right[..n]);
        self.frame += n as u64;
    }

    /// Render into separate left/right buffers.
    pub fn render_stereo(&mut self, left: &mut [f32], right: &mut [f32]) {
        let total = left.len().min(right.len());
        let mut offset = 0;
        while offset < total {
            let n = (total - offset).min(self.block_size);
            self.render_block(n);
            left[offset..offset + n].copy_from_slice(&self.left[..n]);
            right[offset..offset + n].copy_from_slice(&self.right[..n]);
            offset += n;
        }
        self.clock.publish(self.frame);
    }

    /// Render into an interleaved buffer with `channels` channels.
    ///
    /// Mono devices get the mid signal; channels past the second repeat it.
    pub fn render_interleaved(&mut self, data: &mut [f32], channels: usize) {
        if channels == 0 {
            return;
        }
        let frames = data.len() / channels;
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(self.block_size);
            self.render_block(n);
            let out = &mut data[done * channels..(done + n) * channels];
            for (i, frame) in out.chunks_exact_mut(channels).enumerate() {
                let (l, r) = (self.left[i], self.right[i]);
                match frame {
                    [mono] => *mono = 0.5 * (l + r),
                    [fl, fr, rest @ ..] => {
                        *fl = l;
                        *fr = r;
                        rest.fill(0.5 * (l + r));
                    }
                    [] => {}
                }
            }
            done += n;
        }
        // trailing partial frame, if any
        data[frames * channels..].fill(0.0);
        self.clock.publish(self.frame);
    }
}
