//! Backend node graph: bus tables, attachment primitives, and the
//! per-period pull driver the engine runs on the audio thread.
//!
//! Everything in here is the engine side of the crate. Public wrappers own
//! a core through a `ResourceHandle` and talk to it through the free
//! functions below, all of which degrade to `0`/`false` when the owner is
//! absent so topology queries stay safe during teardown.
//!
//! Topology mutation (attach/detach/destruct) and graph traversal are
//! serialized by a single lock; this is the serialization guarantee the
//! public layer documents for callers.

use core::mem;
use core::ptr;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::bus::NodeLayout;
use crate::callback::{BusSpan, ProcessCallbackData};
use crate::error::{EngineError, Status};

/// Node behavior flags declared per node type.
pub mod node_flags {
    /// The node is constrained to exactly one input and one output bus.
    pub const PASSTHROUGH: u32 = 1 << 0;
    /// The node is processed even while stopped (silence otherwise).
    pub const CONTINUOUS_PROCESSING: u32 = 1 << 1;
}

/// Processing state of a node, checked cooperatively by the pull driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeState {
    Stopped = 0,
    Started = 1,
}

/// Per-node-type dispatch record.
///
/// Built once per node type and stored in every core of that type; the
/// pull driver calls through it on the audio thread.
#[derive(Clone, Copy)]
pub(crate) struct NodeVTable {
    /// Process one period. `node` points at the core; implementations for
    /// compound cores cast it back to their containing struct (the core
    /// must be the first field of a `repr(C)` struct for that to be sound).
    pub on_process: unsafe fn(node: *mut NodeCore, data: &mut ProcessCallbackData),
    /// How many input frames are needed to produce `output_frames`.
    pub on_required_input_frames: Option<unsafe fn(node: *mut NodeCore, output_frames: u32) -> u32>,
    pub flags: u32,
}

unsafe fn null_process(_node: *mut NodeCore, data: &mut ProcessCallbackData) {
    data.fill_output_with_silence();
}

pub(crate) const NULL_VTABLE: NodeVTable = NodeVTable {
    on_process: null_process,
    on_required_input_frames: None,
    flags: 0,
};

/// One end of a wire: a node and a bus index on it.
#[derive(Clone, Copy, PartialEq, Eq)]
struct Attachment {
    node: *mut NodeCore,
    bus: u32,
}

struct InputBusState {
    channels: u32,
    /// Sources currently attached to this input bus. Guarded by the
    /// topology lock.
    sources: Vec<Attachment>,
}

struct OutputBusState {
    channels: u32,
    /// f32 bits; read lock-free by the mixer.
    volume_bits: AtomicU32,
    /// Where this output bus currently feeds, if anywhere. Guarded by the
    /// topology lock.
    target: Option<Attachment>,
}

/// Engine-side node resource: bus tables plus preallocated scratch for the
/// pull driver. Constructed by [`NodeCore::construct`], unwired by
/// [`NodeCore::detach_all`] from the owning wrapper's destruct.
pub struct NodeCore {
    vtable: NodeVTable,
    state: AtomicU8,
    initialized: bool,
    inputs: Vec<InputBusState>,
    outputs: Vec<OutputBusState>,
    /// Frames of scratch per bus; processing never exceeds this.
    cache_cap: u32,
    input_scratch: Vec<f32>,
    output_scratch: Vec<f32>,
    in_spans: Vec<BusSpan>,
    out_spans: Vec<BusSpan>,
    /// Stamp of the period the output scratch currently holds.
    last_period: u64,
    /// Re-entrancy guard for the pull driver; a node reached again while
    /// it is being evaluated reads as silence instead of recursing.
    visiting: bool,
}

// Attachment pointers are only dereferenced under the topology lock, and
// wrappers own their cores exclusively.
unsafe impl Send for NodeCore {}

impl Default for NodeCore {
    fn default() -> Self {
        Self {
            vtable: NULL_VTABLE,
            state: AtomicU8::new(NodeState::Stopped as u8),
            initialized: false,
            inputs: Vec::new(),
            outputs: Vec::new(),
            cache_cap: 0,
            input_scratch: Vec::new(),
            output_scratch: Vec::new(),
            in_spans: Vec::new(),
            out_spans: Vec::new(),
            last_period: 0,
            visiting: false,
        }
    }
}

impl NodeCore {
    /// Builds bus tables and scratch from the declared layout. Bus counts
    /// and channel counts are immutable afterwards.
    pub(crate) fn construct(
        &mut self,
        vtable: NodeVTable,
        layout: &NodeLayout,
        cache_cap_frames: u32,
        start: bool,
    ) -> Status {
        let config = &layout.bus_config;
        if cache_cap_frames == 0 {
            return Err(EngineError::InvalidArgs);
        }
        if config.inputs.iter().chain(config.outputs.iter()).any(|&ch| ch == 0) {
            return Err(EngineError::InvalidArgs);
        }

        let mut in_offset = 0usize;
        for &channels in &config.inputs {
            self.inputs.push(InputBusState {
                channels,
                sources: Vec::new(),
            });
            self.in_spans.push(BusSpan {
                offset: in_offset,
                channels,
            });
            in_offset += channels as usize * cache_cap_frames as usize;
        }

        let mut out_offset = 0usize;
        for &channels in &config.outputs {
            self.outputs.push(OutputBusState {
                channels,
                volume_bits: AtomicU32::new(1.0f32.to_bits()),
                target: None,
            });
            self.out_spans.push(BusSpan {
                offset: out_offset,
                channels,
            });
            out_offset += channels as usize * cache_cap_frames as usize;
        }

        self.input_scratch = vec![0.0; in_offset];
        self.output_scratch = vec![0.0; out_offset];
        self.cache_cap = cache_cap_frames;
        self.vtable = vtable;
        self.initialized = true;
        self.state.store(
            if start {
                NodeState::Started as u8
            } else {
                NodeState::Stopped as u8
            },
            Ordering::Release,
        );
        Ok(())
    }

    /// Unwires this node from everything it feeds and everything feeding
    /// it. Called exactly once, from the owning wrapper's destruct.
    pub(crate) fn detach_all(&mut self) {
        let _guard = topology_lock();
        let this = self as *mut NodeCore;
        for bus in 0..self.outputs.len() {
            unsafe { detach_output_bus_locked(this, bus as u32) };
        }
        for input in &mut self.inputs {
            for source in input.sources.drain(..) {
                // Sources still point at us; clear their forward link so a
                // destroy-before-detach doesn't leave a dangling wire.
                unsafe {
                    let src = &mut *source.node;
                    src.outputs[source.bus as usize].target = None;
                }
            }
        }
    }
}

static TOPOLOGY: Mutex<()> = Mutex::new(());

fn topology_lock() -> MutexGuard<'static, ()> {
    TOPOLOGY
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `f` under the topology lock. For wrapper setters whose multi-word
/// state must not interleave with an in-flight pull.
pub(crate) fn with_topology_lock<R>(f: impl FnOnce() -> R) -> R {
    let _guard = topology_lock();
    f()
}

#[inline]
fn live<'a>(node: *const NodeCore) -> Option<&'a NodeCore> {
    // Callers guarantee non-null pointers reference live cores; null is
    // the "owner absent" degrade path.
    unsafe { node.as_ref().filter(|n| n.initialized) }
}

pub(crate) fn input_bus_count(node: *const NodeCore) -> u32 {
    live(node).map_or(0, |n| n.inputs.len() as u32)
}

pub(crate) fn output_bus_count(node: *const NodeCore) -> u32 {
    live(node).map_or(0, |n| n.outputs.len() as u32)
}

pub(crate) fn input_bus_channels(node: *const NodeCore, bus: u32) -> u32 {
    live(node)
        .and_then(|n| n.inputs.get(bus as usize))
        .map_or(0, |b| b.channels)
}

pub(crate) fn output_bus_channels(node: *const NodeCore, bus: u32) -> u32 {
    live(node)
        .and_then(|n| n.outputs.get(bus as usize))
        .map_or(0, |b| b.channels)
}

pub(crate) fn node_state(node: *const NodeCore) -> NodeState {
    match live(node).map(|n| n.state.load(Ordering::Acquire)) {
        Some(1) => NodeState::Started,
        _ => NodeState::Stopped,
    }
}

pub(crate) fn set_node_state(node: *const NodeCore, state: NodeState) -> bool {
    match live(node) {
        Some(n) => {
            n.state.store(state as u8, Ordering::Release);
            true
        }
        None => false,
    }
}

pub(crate) fn output_bus_volume(node: *const NodeCore, bus: u32) -> f32 {
    live(node)
        .and_then(|n| n.outputs.get(bus as usize))
        .map_or(0.0, |b| f32::from_bits(b.volume_bits.load(Ordering::Acquire)))
}

pub(crate) fn set_output_bus_volume(node: *const NodeCore, bus: u32, volume: f32) -> bool {
    if !(volume >= 0.0) {
        return false;
    }
    match live(node).and_then(|n| n.outputs.get(bus as usize)) {
        Some(b) => {
            b.volume_bits.store(volume.to_bits(), Ordering::Release);
            true
        }
        None => false,
    }
}

/// Wires `src`'s output bus into `dst`'s input bus, detaching whatever the
/// output bus previously fed. Compatibility checking is the caller's job
/// (`OutputBus::can_attach_to`); the structural parts are re-checked here
/// under the lock and the call refuses rather than corrupting the graph.
pub(crate) fn attach_output_bus(
    src: *mut NodeCore,
    src_bus: u32,
    dst: *mut NodeCore,
    dst_bus: u32,
) -> bool {
    if src.is_null() || dst.is_null() || ptr::eq(src, dst) {
        return false;
    }
    let _guard = topology_lock();
    unsafe {
        let src_channels = {
            let n = &*src;
            match n.outputs.get(src_bus as usize) {
                Some(b) => b.channels,
                None => return false,
            }
        };
        {
            let n = &*dst;
            match n.inputs.get(dst_bus as usize) {
                Some(b) if b.channels == src_channels => {}
                _ => return false,
            }
        }

        detach_output_bus_locked(src, src_bus);
        let dst_node = &mut *dst;
        dst_node.inputs[dst_bus as usize].sources.push(Attachment {
            node: src,
            bus: src_bus,
        });
        let src_node = &mut *src;
        src_node.outputs[src_bus as usize].target = Some(Attachment {
            node: dst,
            bus: dst_bus,
        });
    }
    true
}

pub(crate) fn detach_output_bus(src: *mut NodeCore, src_bus: u32) -> bool {
    if live(src).and_then(|n| n.outputs.get(src_bus as usize)).is_none() {
        return false;
    }
    let _guard = topology_lock();
    unsafe { detach_output_bus_locked(src, src_bus) };
    true
}

/// Caller holds the topology lock.
unsafe fn detach_output_bus_locked(src: *mut NodeCore, src_bus: u32) {
    let target = {
        let n = &mut *src;
        match n.outputs.get_mut(src_bus as usize) {
            Some(b) => b.target.take(),
            None => return,
        }
    };
    if let Some(target) = target {
        let wire = Attachment {
            node: src,
            bus: src_bus,
        };
        let dst = &mut *target.node;
        dst.inputs[target.bus as usize].sources.retain(|s| *s != wire);
    }
}

/// Pulls one period of the final mix out of the endpoint's single input
/// bus. `out` must hold `endpoint channels x frames` samples; `frames`
/// must not exceed the endpoint's cache capacity.
///
/// Holds the topology lock for the duration of the pull, which is what
/// serializes control-thread graph mutation against in-flight callbacks.
pub(crate) fn read_graph(endpoint: *mut NodeCore, period: u64, frames: u32, out: &mut [f32]) {
    let _guard = topology_lock();
    unsafe {
        debug_assert!(frames <= (*endpoint).cache_cap);
        gather_inputs(endpoint, period, frames);

        let n = &*endpoint;
        let span = n.in_spans[0];
        let count = span.channels as usize * frames as usize;
        out[..count].copy_from_slice(&n.input_scratch[span.offset..span.offset + count]);
    }
}

/// Evaluates `node` for `period` if it hasn't been already, leaving the
/// result in its output scratch. Re-entrant hits (cycles) return without
/// recursing. Caller holds the topology lock.
unsafe fn process_node(node: *mut NodeCore, period: u64, frames: u32) {
    {
        let n = &mut *node;
        if !n.initialized || n.last_period == period || n.visiting {
            return;
        }
        n.visiting = true;

        let started = n.state.load(Ordering::Acquire) == NodeState::Started as u8;
        if !started && n.vtable.flags & node_flags::CONTINUOUS_PROCESSING == 0 {
            n.output_scratch.fill(0.0);
            n.last_period = period;
            n.visiting = false;
            return;
        }
    }

    let vtable = (*node).vtable;
    let in_frames = match vtable.on_required_input_frames {
        Some(required) => required(node, frames).min((*node).cache_cap),
        None => frames,
    };

    gather_inputs(node, period, in_frames);

    // Move the scratch out of the core for the duration of the callback so
    // the process function may retake a unique borrow of its containing
    // struct without aliasing. Cycle hits observe the empty buffers as
    // silence in the meantime.
    let (input_scratch, mut output_scratch, in_spans, out_spans, has_inputs);
    {
        let n = &mut *node;
        input_scratch = mem::take(&mut n.input_scratch);
        output_scratch = mem::take(&mut n.output_scratch);
        in_spans = mem::take(&mut n.in_spans);
        out_spans = mem::take(&mut n.out_spans);
        has_inputs = !n.inputs.is_empty();
    }

    {
        let inputs = if has_inputs {
            Some(&input_scratch[..])
        } else {
            None
        };
        let mut data = ProcessCallbackData::new(
            inputs,
            &mut output_scratch[..],
            &in_spans,
            &out_spans,
            in_frames,
            frames,
        );
        (vtable.on_process)(node, &mut data);
    }

    let n = &mut *node;
    n.input_scratch = input_scratch;
    n.output_scratch = output_scratch;
    n.in_spans = in_spans;
    n.out_spans = out_spans;
    n.last_period = period;
    n.visiting = false;
}

/// Zeroes `node`'s input scratch and mixes every attached source's output
/// into it, evaluating sources first. Caller holds the topology lock; no
/// borrows of `node` are held across the recursion.
unsafe fn gather_inputs(node: *mut NodeCore, period: u64, frames: u32) {
    let bus_count = {
        let n = &mut *node;
        n.input_scratch.fill(0.0);
        n.inputs.len()
    };
    for bus in 0..bus_count {
        let source_count = {
            let n = &*node;
            n.inputs[bus].sources.len()
        };
        for i in 0..source_count {
            let source = {
                let n = &*node;
                n.inputs[bus].sources[i]
            };
            process_node(source.node, period, frames);
            mix_source(node, bus, source, frames);
        }
    }
}

/// Accumulates `source`'s output bus into `node`'s input bus, scaled by
/// the source bus volume. Skips sources whose scratch is not available
/// (mid-evaluation cycle hit), which reads as silence.
unsafe fn mix_source(node: *mut NodeCore, bus: usize, source: Attachment, frames: u32) {
    debug_assert!(!ptr::eq(node, source.node));

    let src = &*source.node;
    let src_span = match src.out_spans.get(source.bus as usize) {
        Some(span) => *span,
        None => return,
    };
    let count = src_span.channels as usize * frames as usize;
    if src.output_scratch.len() < src_span.offset + count {
        return;
    }
    let volume = f32::from_bits(
        src.outputs[source.bus as usize]
            .volume_bits
            .load(Ordering::Acquire),
    );

    let dst = &mut *node;
    let dst_span = dst.in_spans[bus];
    debug_assert_eq!(dst_span.channels, src_span.channels);

    let src_samples = &src.output_scratch[src_span.offset..src_span.offset + count];
    let dst_samples = &mut dst.input_scratch[dst_span.offset..dst_span.offset + count];
    for (d, s) in dst_samples.iter_mut().zip(src_samples) {
        *d += *s * volume;
    }
}
