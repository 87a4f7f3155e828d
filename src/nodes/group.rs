//! Submix node: gathers sources, applies a smoothed group volume, and
//! converts channel counts on the way through.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::error;

use crate::bus::{BusConfig, NodeLayout, RawNode, Routing, Topology};
use crate::callback::ProcessCallbackData;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::graph::{NodeCore, NodeVTable};
use crate::handle::{Resource, ResourceHandle};

/// Construction parameters for a [`GroupNode`].
#[derive(Clone, Copy, Debug)]
pub struct GroupSettings {
    pub num_in_channels: u32,
    pub num_out_channels: u32,
    /// Frames a full-scale volume change is spread over.
    pub volume_fade_frame_count: u32,
    /// Refuse `set_pitch` on this group.
    pub pitch_disabled: bool,
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            num_in_channels: 2,
            num_out_channels: 2,
            volume_fade_frame_count: 256,
            pitch_disabled: false,
        }
    }
}

#[repr(C)]
pub(crate) struct GroupCore {
    base: NodeCore,
    target_gain_bits: AtomicU32,
    pitch_bits: AtomicU32,
    /// Audio-thread-only ramp state.
    current_gain: f32,
    gain_step: f32,
    in_channels: u32,
    out_channels: u32,
    pitch_disabled: bool,
}

impl Default for GroupCore {
    fn default() -> Self {
        Self {
            base: NodeCore::default(),
            target_gain_bits: AtomicU32::new(0),
            pitch_bits: AtomicU32::new(0),
            current_gain: 0.0,
            gain_step: 0.0,
            in_channels: 0,
            out_channels: 0,
            pitch_disabled: false,
        }
    }
}

impl Resource for GroupCore {
    fn destruct(&mut self) {
        self.base.detach_all();
    }
}

unsafe fn group_process(node: *mut NodeCore, data: &mut ProcessCallbackData) {
    let core = &mut *(node as *mut GroupCore);
    let target = f32::from_bits(core.target_gain_bits.load(Ordering::Acquire));

    let input = data.input_buffer(0);
    let mut out = data.output_buffer(0);
    let in_channels = input.channels().max(1);

    for frame in 0..out.frames() {
        // Per-frame linear ramp toward the target gain.
        let delta = target - core.current_gain;
        if delta.abs() <= core.gain_step {
            core.current_gain = target;
        } else {
            core.current_gain += core.gain_step.copysign(delta);
        }

        let in_frame = if frame < input.frames() {
            input.frame(frame)
        } else {
            &[]
        };
        let out_frame = out.frame_mut(frame);
        for (ch, sample) in out_frame.iter_mut().enumerate() {
            // Upmix repeats source channels in order; downmix truncates.
            let src = in_frame
                .get(ch % in_channels as usize)
                .copied()
                .unwrap_or(0.0);
            *sample = src * core.current_gain;
        }
    }
}

const GROUP_VTABLE: NodeVTable = NodeVTable {
    on_process: group_process,
    on_required_input_frames: None,
    flags: 0,
};

/// A submix bus. Sounds and other nodes attach to its input; the group
/// applies its own volume (smoothed over `volume_fade_frame_count`
/// frames) and forwards the mix, converting channel counts when the
/// input and output shapes differ.
pub struct GroupNode {
    handle: ResourceHandle<GroupCore>,
}

impl GroupNode {
    pub fn new() -> Self {
        Self {
            handle: ResourceHandle::empty(),
        }
    }

    pub fn init(&mut self, engine: &Engine, settings: GroupSettings) -> bool {
        let cache_cap = engine.processing_size_in_frames();
        let status = self.handle.emplace(|core| {
            if settings.num_in_channels == 0
                || settings.num_out_channels == 0
                || settings.volume_fade_frame_count == 0
            {
                return Err(EngineError::InvalidArgs);
            }
            core.in_channels = settings.num_in_channels;
            core.out_channels = settings.num_out_channels;
            core.pitch_disabled = settings.pitch_disabled;
            core.target_gain_bits
                .store(1.0f32.to_bits(), Ordering::Release);
            core.pitch_bits.store(1.0f32.to_bits(), Ordering::Release);
            core.current_gain = 1.0;
            core.gain_step = 1.0 / settings.volume_fade_frame_count as f32;
            core.base.construct(
                GROUP_VTABLE,
                &NodeLayout::with_bus_config(
                    BusConfig::new()
                        .with_input(settings.num_in_channels)
                        .with_output(settings.num_out_channels),
                ),
                cache_cap,
                true,
            )
        });
        match status {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "group init failed");
                self.handle.discard();
                false
            }
        }
    }

    /// Group gain target; the audio thread ramps toward it instead of
    /// jumping. Rejects negative or NaN values.
    pub fn set_volume(&self, volume: f32) -> bool {
        if !(volume >= 0.0) {
            return false;
        }
        match self.handle.get() {
            Some(core) => {
                core.target_gain_bits
                    .store(volume.to_bits(), Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn volume(&self) -> f32 {
        self.handle
            .get()
            .map_or(0.0, |c| f32::from_bits(c.target_gain_bits.load(Ordering::Acquire)))
    }

    /// Stores the group pitch ratio for readback and downstream use.
    /// Rejects non-positive values and groups built with
    /// `pitch_disabled`. The group does not resample its throughput.
    pub fn set_pitch(&self, pitch: f32) -> bool {
        if !(pitch > 0.0) {
            return false;
        }
        match self.handle.get() {
            Some(core) if !core.pitch_disabled => {
                core.pitch_bits.store(pitch.to_bits(), Ordering::Release);
                true
            }
            _ => false,
        }
    }

    /// `0.0` when uninitialized.
    pub fn pitch(&self) -> f32 {
        self.handle
            .get()
            .map_or(0.0, |c| f32::from_bits(c.pitch_bits.load(Ordering::SeqCst)))
    }

    pub fn is_pitch_disabled(&self) -> bool {
        self.handle.get().map_or(false, |c| c.pitch_disabled)
    }
}

impl Default for GroupNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology for GroupNode {
    fn raw(&self) -> RawNode {
        RawNode(self.handle.as_ptr().cast::<NodeCore>())
    }
}

impl Routing for GroupNode {}
