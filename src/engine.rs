//! The engine: owner of the graph endpoint and the pull clock.

use std::sync::Arc;

use tracing::error;

use crate::bus::{BusConfig, InputBus, NodeLayout, RawNode, Topology};
use crate::graph::{self, NodeCore, NULL_VTABLE};
use crate::handle::{Resource, ResourceHandle};
use crate::vfs::Vfs;

/// Engine construction parameters. The defaults are a stereo graph at
/// 48 kHz pulled in 10 ms periods.
#[derive(Clone)]
pub struct EngineConfig {
    pub channels: u32,
    pub sample_rate: u32,
    /// Frames evaluated per graph period; also the per-bus scratch
    /// capacity of every node constructed against this engine.
    pub period_size_in_frames: u32,
    /// File system consulted when sounds are opened by path. Sounds
    /// opened by path fail without one.
    pub vfs: Option<Arc<Vfs>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            sample_rate: 48_000,
            period_size_in_frames: 480,
            vfs: None,
        }
    }
}

/// Engine-side resource: the endpoint node everything audible routes
/// into, plus the period counter driving once-per-period evaluation.
pub struct EngineCore {
    endpoint: NodeCore,
    channels: u32,
    sample_rate: u32,
    period_size_in_frames: u32,
    period: u64,
    vfs: Option<Arc<Vfs>>,
}

impl Default for EngineCore {
    fn default() -> Self {
        Self {
            endpoint: NodeCore::default(),
            channels: 0,
            sample_rate: 0,
            period_size_in_frames: 0,
            period: 0,
            vfs: None,
        }
    }
}

impl Resource for EngineCore {
    fn destruct(&mut self) {
        self.endpoint.detach_all();
    }
}

/// The audio engine. Owns the endpoint node; nodes are constructed
/// against it and route their output (directly or through groups) into
/// [`Engine::endpoint_bus`].
///
/// [`Engine::read`] is the only way samples leave the graph; the caller
/// decides where they go (an output device, a file, a test buffer).
///
/// Drop order matters at teardown: detach or drop the nodes built
/// against an engine before dropping the engine itself.
pub struct Engine {
    handle: ResourceHandle<EngineCore>,
}

impl Engine {
    pub fn new() -> Self {
        Self {
            handle: ResourceHandle::empty(),
        }
    }

    /// Builds the endpoint from `config`. Returns `false` (with the
    /// handle emptied) when the configuration is rejected.
    pub fn init(&mut self, config: EngineConfig) -> bool {
        let status = self.handle.emplace(|core| {
            if config.channels == 0 || config.sample_rate == 0 {
                return Err(crate::error::EngineError::InvalidArgs);
            }
            let layout =
                NodeLayout::with_bus_config(BusConfig::new().with_input(config.channels));
            core.endpoint.construct(
                NULL_VTABLE,
                &layout,
                config.period_size_in_frames,
                true,
            )?;
            core.channels = config.channels;
            core.sample_rate = config.sample_rate;
            core.period_size_in_frames = config.period_size_in_frames;
            core.vfs = config.vfs.clone();
            Ok(())
        });
        match status {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "engine init failed");
                self.handle.discard();
                false
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        !self.handle.is_empty()
    }

    pub fn channels(&self) -> u32 {
        self.handle.get().map_or(0, |c| c.channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.handle.get().map_or(0, |c| c.sample_rate)
    }

    pub fn sample_rate_f64(&self) -> f64 {
        self.sample_rate() as f64
    }

    /// Frames per graph period. Nodes size their scratch to this at
    /// construction.
    pub fn processing_size_in_frames(&self) -> u32 {
        self.handle.get().map_or(0, |c| c.period_size_in_frames)
    }

    pub(crate) fn vfs(&self) -> Option<Arc<Vfs>> {
        self.handle.get().and_then(|c| c.vfs.clone())
    }

    /// The endpoint's input bus, the final mix point of the graph.
    pub fn endpoint_bus(&self) -> InputBus {
        self.input_bus(0)
    }

    /// Pulls interleaved samples out of the graph into `out`, advancing
    /// the period clock once per full or partial period. `out` is
    /// consumed in whole frames; returns the number of frames written.
    pub fn read(&mut self, out: &mut [f32]) -> u64 {
        let core = match self.handle.get_mut() {
            Some(core) => core,
            None => {
                out.fill(0.0);
                return 0;
            }
        };
        let channels = core.channels as usize;
        let period_frames = core.period_size_in_frames;
        let endpoint = &mut core.endpoint as *mut NodeCore;

        let total_frames = out.len() / channels;
        let mut done = 0usize;
        while done < total_frames {
            let chunk = ((total_frames - done) as u32).min(period_frames);
            core.period += 1;
            let start = done * channels;
            let end = start + chunk as usize * channels;
            graph::read_graph(endpoint, core.period, chunk, &mut out[start..end]);
            done += chunk as usize;
        }
        done as u64
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology for Engine {
    fn raw(&self) -> RawNode {
        match self.handle.get() {
            Some(core) => RawNode(&core.endpoint as *const NodeCore as *mut NodeCore),
            None => RawNode(core::ptr::null_mut()),
        }
    }
}
