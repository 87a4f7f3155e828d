//! User-defined nodes: bring a process function, get a graph citizen.

use tracing::error;

use crate::bus::{NodeLayout, RawNode, Routing, Topology};
use crate::callback::ProcessCallbackData;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::graph::{node_flags, NodeCore, NodeVTable};
use crate::handle::{Resource, ResourceHandle};

/// The processing behavior of a [`BaseNode`].
///
/// `process` runs on the audio thread once per period; it must stay
/// allocation-free and bounded. Declare shape constraints through
/// `FLAGS` (see [`crate::graph::node_flags`]).
pub trait ProcessNode: Send + 'static {
    const FLAGS: u32 = 0;

    fn process(&mut self, data: &mut ProcessCallbackData);

    /// Input frames needed to produce `output_frames`. Identity unless
    /// the node consumes at a different rate than it produces.
    fn required_input_frames(&mut self, output_frames: u32) -> u32 {
        output_frames
    }
}

#[repr(C)]
pub(crate) struct UserNodeCore<T: ProcessNode> {
    base: NodeCore,
    node: Option<T>,
}

impl<T: ProcessNode> Default for UserNodeCore<T> {
    fn default() -> Self {
        Self {
            base: NodeCore::default(),
            node: None,
        }
    }
}

impl<T: ProcessNode> Resource for UserNodeCore<T> {
    fn destruct(&mut self) {
        self.base.detach_all();
        self.node = None;
    }
}

unsafe fn user_process<T: ProcessNode>(node: *mut NodeCore, data: &mut ProcessCallbackData) {
    let core = &mut *(node as *mut UserNodeCore<T>);
    match core.node.as_mut() {
        Some(n) => n.process(data),
        None => data.fill_output_with_silence(),
    }
}

unsafe fn user_required_input_frames<T: ProcessNode>(
    node: *mut NodeCore,
    output_frames: u32,
) -> u32 {
    let core = &mut *(node as *mut UserNodeCore<T>);
    match core.node.as_mut() {
        Some(n) => n.required_input_frames(output_frames),
        None => output_frames,
    }
}

/// A graph node whose processing is supplied by a [`ProcessNode`] value.
pub struct BaseNode<T: ProcessNode> {
    handle: ResourceHandle<UserNodeCore<T>>,
}

impl<T: ProcessNode> BaseNode<T> {
    pub fn new() -> Self {
        Self {
            handle: ResourceHandle::empty(),
        }
    }

    /// Constructs the backend node with `layout` and starts it. A
    /// `PASSTHROUGH` node must declare exactly one input and one output
    /// bus with matching channel counts.
    pub fn init(&mut self, engine: &Engine, node: T, layout: NodeLayout) -> bool {
        let cache_cap = engine.processing_size_in_frames();
        let status = self.handle.emplace(|core| {
            if T::FLAGS & node_flags::PASSTHROUGH != 0 {
                let config = &layout.bus_config;
                let matched = config.inputs.len() == 1
                    && config.outputs.len() == 1
                    && config.inputs[0] == config.outputs[0];
                if !matched {
                    return Err(EngineError::InvalidArgs);
                }
            }
            core.node = Some(node);
            core.base.construct(
                NodeVTable {
                    on_process: user_process::<T>,
                    on_required_input_frames: Some(user_required_input_frames::<T>),
                    flags: T::FLAGS,
                },
                &layout,
                cache_cap,
                true,
            )
        });
        match status {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "base node init failed");
                self.handle.discard();
                false
            }
        }
    }

    pub fn node(&self) -> Option<&T> {
        self.handle.get().and_then(|c| c.node.as_ref())
    }

    pub fn node_mut(&mut self) -> Option<&mut T> {
        self.handle.get_mut().and_then(|c| c.node.as_mut())
    }
}

impl<T: ProcessNode> Default for BaseNode<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ProcessNode> Topology for BaseNode<T> {
    fn raw(&self) -> RawNode {
        RawNode(self.handle.as_ptr().cast::<NodeCore>())
    }
}

impl<T: ProcessNode> Routing for BaseNode<T> {}
