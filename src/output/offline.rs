//! Headless output driven by the caller.
//!
//! Nothing runs on its own here: the caller pulls audio with
//! [`OfflineBackend::render`]. While the output is suspended the pull
//! returns silence and the node does not advance, which mirrors a device
//! that stops invoking its callback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{AudioBackend, AudioOutput};
use crate::error::{EngineError, Result};
use crate::params::ParamId;
use crate::render::RenderNode;

#[derive(Default)]
struct Shared {
    node: Mutex<Option<RenderNode>>,
    running: AtomicBool,
    fail_resume: AtomicBool,
    opens: AtomicUsize,
    resumes: AtomicUsize,
    suspends: AtomicUsize,
}

/// Backend handle. Clones share the same output, so a test can keep one
/// clone and give another to the controller.
#[derive(Clone)]
pub struct OfflineBackend {
    sample_rate: u32,
    unavailable: Option<String>,
    shared: Arc<Shared>,
}

pub struct OfflineOutput {
    sample_rate: u32,
    shared: Arc<Shared>,
}

impl OfflineBackend {
    pub fn new(sample_rate: u32) -> Self {
        Self { sample_rate, unavailable: None, shared: Arc::default() }
    }

    /// A backend whose `open` always fails.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self { sample_rate: 48_000, unavailable: Some(reason.into()), shared: Arc::default() }
    }

    /// Make every subsequent resume fail (or succeed again).
    pub fn set_fail_resume(&self, fail: bool) {
        self.shared.fail_resume.store(fail, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.shared.resumes.load(Ordering::SeqCst)
    }

    pub fn suspend_count(&self) -> usize {
        self.shared.suspends.load(Ordering::SeqCst)
    }

    pub fn is_resumed(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_open(&self) -> bool {
        self.shared.node.lock().is_some()
    }

    /// Pull `frames` stereo frames.
    pub fn render(&self, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        if self.is_resumed() {
            if let Some(node) = self.shared.node.lock().as_mut() {
                node.render_stereo(&mut left, &mut right);
            }
        }
        (left, right)
    }

    /// Render `frames` frames and throw the audio away.
    pub fn advance(&self, frames: usize) {
        const CHUNK: usize = 4096;
        let mut left = vec![0.0; CHUNK];
        let mut right = vec![0.0; CHUNK];
        let mut remaining = frames;
        while remaining > 0 && self.is_resumed() {
            let n = remaining.min(CHUNK);
            match self.shared.node.lock().as_mut() {
                Some(node) => node.render_stereo(&mut left[..n], &mut right[..n]),
                None => break,
            }
            remaining -= n;
        }
    }

    /// Apply queued parameter events without advancing, the way a device
    /// callback would at its next block. Does nothing while suspended.
    pub fn flush_events(&self) {
        if !self.is_resumed() {
            return;
        }
        if let Some(node) = self.shared.node.lock().as_mut() {
            node.apply_pending_events();
        }
    }

    /// Live automation value inside the node.
    pub fn param_value(&self, id: ParamId) -> Option<f32> {
        self.shared.node.lock().as_ref().map(|n| n.param_value(id))
    }

    pub fn frames_rendered(&self) -> Option<u64> {
        self.shared.node.lock().as_ref().map(|n| n.frames_rendered())
    }
}

impl AudioBackend for OfflineBackend {
    type Output = OfflineOutput;

    fn open<F>(&self, build: F) -> Result<OfflineOutput>
    where
        F: FnOnce(u32) -> RenderNode + Send + 'static,
    {
        if let Some(reason) = &self.unavailable {
            return Err(EngineError::OutputUnavailable(reason.clone()));
        }
        let node = build(self.sample_rate);
        *self.shared.node.lock() = Some(node);
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.opens.fetch_add(1, Ordering::SeqCst);
        Ok(OfflineOutput { sample_rate: self.sample_rate, shared: Arc::clone(&self.shared) })
    }
}

impl AudioOutput for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn resume(&mut self) -> Result<()> {
        if self.shared.fail_resume.load(Ordering::SeqCst) {
            return Err(EngineError::ResumeFailed("resume refused".into()));
        }
        if self.shared.node.lock().is_none() {
            return Err(EngineError::Disposed);
        }
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn suspend(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.suspends.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.node.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::command::ParamEvent;
    use crate::params::ParamValues;
    use crate::render::FrameClock;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    fn open(backend: &OfflineBackend) -> OfflineOutput {
        backend
            .open(|sr| {
                let (_prod, cons) = HeapRb::new(8).split();
                RenderNode::new(sr, &ParamValues::default(), &EngineConfig::default(), cons, FrameClock::new())
            })
            .unwrap()
    }

    #[test]
    fn suspended_output_renders_silence_without_advancing() {
        let backend = OfflineBackend::new(8_000);
        let mut out = open(&backend);
        let (l, _) = backend.render(100);
        assert!(l.iter().all(|s| *s == 0.0));
        assert_eq!(backend.frames_rendered(), Some(0));

        out.resume().unwrap();
        let (l, _) = backend.render(100);
        assert!(l.iter().any(|s| *s != 0.0));
        assert_eq!(backend.frames_rendered(), Some(100));

        out.suspend();
        backend.advance(1000);
        assert_eq!(backend.frames_rendered(), Some(100));
    }

    #[test]
    fn flush_applies_events_only_while_resumed() {
        let backend = OfflineBackend::new(8_000);
        let (mut prod, cons) = HeapRb::<ParamEvent>::new(8).split();
        let mut out = backend
            .open(move |sr| {
                RenderNode::new(sr, &ParamValues::default(), &EngineConfig::default(), cons, FrameClock::new())
            })
            .unwrap();
        prod.try_push(ParamEvent::set(ParamId::BeatHz, 25.0)).unwrap();
        backend.flush_events();
        assert_eq!(backend.param_value(ParamId::BeatHz), Some(10.0));

        out.resume().unwrap();
        backend.render(0);
        assert_eq!(backend.param_value(ParamId::BeatHz), Some(10.0));
        backend.flush_events();
        assert_eq!(backend.param_value(ParamId::BeatHz), Some(25.0));
        assert_eq!(backend.frames_rendered(), Some(0));
    }

    #[test]
    fn close_releases_the_node() {
        let backend = OfflineBackend::new(8_000);
        let mut out = open(&backend);
        assert!(backend.is_open());
        out.close();
        assert!(!backend.is_open());
        assert!(matches!(out.resume(), Err(EngineError::Disposed)));
    }

    #[test]
    fn unavailable_backend_fails_to_open() {
        let backend = OfflineBackend::unavailable("no device");
        let res = backend.open(|_| unreachable!());
        assert!(matches!(res, Err(EngineError::OutputUnavailable(_))));
        assert_eq!(backend.open_count(), 0);
    }
}
