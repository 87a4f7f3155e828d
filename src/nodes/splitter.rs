//! Fan-out node: one input bus duplicated to several output buses.

use tracing::error;

use crate::bus::{BusConfig, NodeLayout, RawNode, Routing, Topology};
use crate::callback::ProcessCallbackData;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::graph::{NodeCore, NodeVTable};
use crate::handle::{Resource, ResourceHandle};

#[repr(C)]
#[derive(Default)]
pub(crate) struct SplitterCore {
    base: NodeCore,
}

impl Resource for SplitterCore {
    fn destruct(&mut self) {
        self.base.detach_all();
    }
}

unsafe fn splitter_process(_node: *mut NodeCore, data: &mut ProcessCallbackData) {
    for bus in 0..data.output_bus_count() {
        data.copy_bus(0, bus);
    }
}

const SPLITTER_VTABLE: NodeVTable = NodeVTable {
    on_process: splitter_process,
    on_required_input_frames: None,
    flags: 0,
};

/// Copies its single input to every output bus, identical frames on each.
/// Per-destination level differences are applied with the output bus
/// volumes, not here.
pub struct SplitterNode {
    handle: ResourceHandle<SplitterCore>,
}

impl SplitterNode {
    pub fn new() -> Self {
        Self {
            handle: ResourceHandle::empty(),
        }
    }

    /// One input bus and `output_bus_count` output buses, all of
    /// `channels` channels. Rejects zero for either.
    pub fn init(&mut self, engine: &Engine, channels: u32, output_bus_count: u32) -> bool {
        let cache_cap = engine.processing_size_in_frames();
        let status = self.handle.emplace(|core| {
            if channels == 0 || output_bus_count == 0 {
                return Err(EngineError::InvalidArgs);
            }
            let mut config = BusConfig::new().with_input(channels);
            for _ in 0..output_bus_count {
                config = config.with_output(channels);
            }
            core.base.construct(
                SPLITTER_VTABLE,
                &NodeLayout::with_bus_config(config),
                cache_cap,
                true,
            )
        });
        match status {
            Ok(()) => true,
            Err(e) => {
                error!(error = %e, "splitter init failed");
                self.handle.discard();
                false
            }
        }
    }
}

impl Default for SplitterNode {
    fn default() -> Self {
        Self::new()
    }
}

impl Topology for SplitterNode {
    fn raw(&self) -> RawNode {
        RawNode(self.handle.as_ptr().cast::<NodeCore>())
    }
}

impl Routing for SplitterNode {}
