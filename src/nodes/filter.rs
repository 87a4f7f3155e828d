//! Low-pass and high-pass filter nodes.
//!
//! Both run the same cascaded one-pole core; the high-pass output is the
//! input minus the low-passed signal. Cutoff changes retune the live
//! filter without resetting channel state, so sweeps are click-free.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use tracing::error;

use crate::bus::{NodeLayout, RawNode, Routing, Topology};
use crate::callback::ProcessCallbackData;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::graph::{node_flags, NodeCore, NodeVTable};
use crate::handle::{Resource, ResourceHandle};

/// Largest accepted filter order; `init` clamps to `1..=MAX_FILTER_ORDER`.
pub const MAX_FILTER_ORDER: u32 = 8;

#[repr(C)]
pub(crate) struct FilterCore {
    base: NodeCore,
    /// One-pole coefficient as f32 bits; retuned by `set_cutoff_frequency`.
    coeff_bits: AtomicU32,
    /// Cutoff in Hz as f64 bits, for readback.
    cutoff_bits: AtomicU64,
    sample_rate: u32,
    order: u32,
    channels: u32,
    high_pass: bool,
    /// Stage states, stage-major: `stages[stage * channels + channel]`.
    stages: Vec<f32>,
}

impl Default for FilterCore {
    fn default() -> Self {
        Self {
            base: NodeCore::default(),
            coeff_bits: AtomicU32::new(0),
            cutoff_bits: AtomicU64::new(0),
            sample_rate: 0,
            order: 0,
            channels: 0,
            high_pass: false,
            stages: Vec::new(),
        }
    }
}

impl Resource for FilterCore {
    fn destruct(&mut self) {
        self.base.detach_all();
    }
}

fn one_pole_coeff(cutoff_hz: f64, sample_rate: u32) -> f32 {
    let k = 1.0 - (-core::f64::consts::TAU * cutoff_hz / sample_rate as f64).exp();
    k.clamp(0.0, 1.0) as f32
}

unsafe fn filter_process(node: *mut NodeCore, data: &mut ProcessCallbackData) {
    let core = &mut *(node as *mut FilterCore);
    data.copy_inputs_to_outputs();

    let k = f32::from_bits(core.coeff_bits.load(Ordering::Acquire));
    let channels = core.channels as usize;
    let order = core.order as usize;

    let mut out = data.output_buffer(0);
    for frame in 0..out.frames() {
        let samples = out.frame_mut(frame);
        for ch in 0..channels.min(samples.len()) {
            let x = samples[ch];
            let mut lp = x;
            for stage in 0..order {
                let state = &mut core.stages[stage * channels + ch];
                *state += k * (lp - *state);
                lp = *state;
            }
            samples[ch] = if core.high_pass { x - lp } else { lp };
        }
    }
}

const FILTER_VTABLE: NodeVTable = NodeVTable {
    on_process: filter_process,
    on_required_input_frames: None,
    flags: node_flags::PASSTHROUGH,
};

struct FilterNode {
    handle: ResourceHandle<FilterCore>,
}

impl FilterNode {
    fn init(
        &mut self,
        engine: &Engine,
        channels: u32,
        cutoff_hz: f64,
        order: u32,
        high_pass: bool,
    ) -> bool {
        let cache_cap = engine.processing_size_in_frames();
        let sample_rate = engine.sample_rate();
        let status = self.handle.emplace(|core| {
            if channels == 0 || !(cutoff_hz > 0.0) || sample_rate == 0 {
                return Err(EngineError::InvalidArgs);
            }
            let order = order.clamp(1, MAX_FILTER_ORDER);
            core.sample_rate = sample_rate;
            core.order = order;
            core.channels = channels;
            core.high_pass = high_pass;
            core.stages = vec![0.0; (order * channels) as usize];
            core.coeff_bits.store(
                one_pole_coeff(cutoff_hz, sample_rate).to_bits(),
                Ordering::Release,
            );
            core.cutoff_bits
                .store(cutoff_hz.to_bits(), Ordering::Release);
            core.base
                .construct(FILTER_VTABLE, &NodeLayout::passthrough(channels), cache_cap, true)
        });
        match status {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, high_pass, "filter init failed");
                self.handle.discard();
                false
            }
        }
    }

    /// Retunes the filter in place, effective on the next period. The
    /// stored cutoff is updated even for out-of-nominal-range values;
    /// the derived coefficient saturates, keeping the filter stable.
    fn set_cutoff_frequency(&self, cutoff_hz: f64) -> bool {
        let core = match self.handle.get() {
            Some(core) => core,
            None => return false,
        };
        if !cutoff_hz.is_finite() {
            return false;
        }
        core.coeff_bits.store(
            one_pole_coeff(cutoff_hz, core.sample_rate).to_bits(),
            Ordering::Release,
        );
        core.cutoff_bits
            .store(cutoff_hz.to_bits(), Ordering::Release);
        true
    }

    fn cutoff_frequency(&self) -> f64 {
        self.handle
            .get()
            .map_or(0.0, |c| f64::from_bits(c.cutoff_bits.load(Ordering::Acquire)))
    }

    fn order(&self) -> u32 {
        self.handle.get().map_or(0, |c| c.order)
    }
}

macro_rules! filter_wrapper {
    ($(#[$doc:meta])* $name:ident, $high_pass:expr) => {
        $(#[$doc])*
        pub struct $name {
            inner: FilterNode,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    inner: FilterNode {
                        handle: ResourceHandle::empty(),
                    },
                }
            }

            /// One passthrough bus of `channels` channels. `order` is
            /// clamped to `1..=MAX_FILTER_ORDER`.
            pub fn init(
                &mut self,
                engine: &Engine,
                channels: u32,
                cutoff_hz: f64,
                order: u32,
            ) -> bool {
                self.inner.init(engine, channels, cutoff_hz, order, $high_pass)
            }

            pub fn set_cutoff_frequency(&self, cutoff_hz: f64) -> bool {
                self.inner.set_cutoff_frequency(cutoff_hz)
            }

            pub fn cutoff_frequency(&self) -> f64 {
                self.inner.cutoff_frequency()
            }

            pub fn order(&self) -> u32 {
                self.inner.order()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Topology for $name {
            fn raw(&self) -> RawNode {
                RawNode(self.inner.handle.as_ptr().cast::<NodeCore>())
            }
        }

        impl Routing for $name {}
    };
}

filter_wrapper!(
    /// Cascaded one-pole low-pass filter node.
    LpfNode,
    false
);
filter_wrapper!(
    /// High-pass filter node (input minus the low-passed signal).
    HpfNode,
    true
);
