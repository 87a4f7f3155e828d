//! Public routing surface: bus views, layout builders, and the topology
//! traits node wrappers implement.

use core::ptr;

use crate::graph::{self, NodeCore, NodeState};

/// Untyped view of a wrapper's backend node, used by the generic routing
/// machinery. Obtained from [`Topology::raw`]; null when the wrapper is
/// uninitialized.
#[derive(Clone, Copy)]
pub struct RawNode(pub(crate) *mut NodeCore);

impl RawNode {
    /// Identity comparison; two wrappers share a raw node only if one was
    /// moved from the other.
    pub fn same(self, other: RawNode) -> bool {
        ptr::eq(self.0, other.0)
    }
}

/// A non-owning view of one bus on one node.
///
/// Copyable and cheap; holding one does not keep the node alive. A bus
/// whose node has been destroyed or whose index is out of range degrades:
/// queries return `0` and mutations return `false`. The view must not be
/// used after the owning wrapper is dropped.
#[derive(Clone, Copy)]
pub struct Bus<const IS_INPUT: bool> {
    node: *mut NodeCore,
    index: u32,
}

/// An input bus view.
pub type InputBus = Bus<true>;
/// An output bus view.
pub type OutputBus = Bus<false>;

impl<const IS_INPUT: bool> Bus<IS_INPUT> {
    pub(crate) fn new(node: *mut NodeCore, index: u32) -> Self {
        Self { node, index }
    }

    /// A bus attached to nothing. All queries return `0`.
    pub fn detached() -> Self {
        Self::new(ptr::null_mut(), 0)
    }

    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn num_channels(&self) -> u32 {
        if IS_INPUT {
            graph::input_bus_channels(self.node, self.index)
        } else {
            graph::output_bus_channels(self.node, self.index)
        }
    }

    /// True when the bus addresses a live node and an in-range index.
    pub fn is_valid(&self) -> bool {
        self.num_channels() > 0
    }
}

impl Bus<false> {
    /// Whether [`OutputBus::attach_to`] would succeed: both ends valid,
    /// channel counts equal, and not the same node.
    pub fn can_attach_to(&self, input: InputBus) -> bool {
        self.is_valid()
            && input.is_valid()
            && !ptr::eq(self.node, input.node)
            && self.num_channels() == input.num_channels()
    }

    /// Routes this output into `input`, replacing any previous attachment
    /// of this output bus. Multiple outputs may feed one input; their
    /// signals are summed.
    pub fn attach_to(&self, input: InputBus) -> bool {
        graph::attach_output_bus(self.node, self.index, input.node, input.index)
    }

    /// Unroutes this output from whatever it currently feeds.
    pub fn detach(&self) -> bool {
        graph::detach_output_bus(self.node, self.index)
    }

    /// Linear gain applied when this bus is mixed into its target.
    /// Effective on the next period; rejects negative or NaN values.
    pub fn set_volume(&self, volume: f32) -> bool {
        graph::set_output_bus_volume(self.node, self.index, volume)
    }

    pub fn volume(&self) -> f32 {
        graph::output_bus_volume(self.node, self.index)
    }
}

/// A node's primary input and output bus pair, for wiring chains.
#[derive(Clone, Copy)]
pub struct NodeIO {
    pub input: InputBus,
    pub output: OutputBus,
}

impl NodeIO {
    /// Valid only when both member buses are.
    pub fn is_valid(&self) -> bool {
        self.input.is_valid() && self.output.is_valid()
    }

    /// Routes this pair's output into `target`.
    pub fn attach_to(&self, target: InputBus) -> bool {
        self.output.attach_to(target)
    }

    /// Chains this pair's output into another pair's input.
    pub fn attach_to_node(&self, target: &NodeIO) -> bool {
        self.output.attach_to(target.input)
    }
}

/// Channel counts per bus, declared at node construction and immutable
/// afterwards.
#[derive(Clone, Debug, Default)]
pub struct BusConfig {
    pub(crate) inputs: Vec<u32>,
    pub(crate) outputs: Vec<u32>,
}

impl BusConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// One entry per input bus, each the bus's channel count.
    pub fn with_inputs(mut self, channels: &[u32]) -> Self {
        self.inputs = channels.to_vec();
        self
    }

    pub fn with_outputs(mut self, channels: &[u32]) -> Self {
        self.outputs = channels.to_vec();
        self
    }

    pub fn with_input(mut self, channels: u32) -> Self {
        self.inputs.push(channels);
        self
    }

    pub fn with_output(mut self, channels: u32) -> Self {
        self.outputs.push(channels);
        self
    }
}

/// Declared shape of a node being constructed.
#[derive(Clone, Debug)]
pub struct NodeLayout {
    pub(crate) bus_config: BusConfig,
}

impl NodeLayout {
    pub fn with_bus_config(bus_config: BusConfig) -> Self {
        Self { bus_config }
    }

    /// One input bus and one output bus of the same channel count.
    pub fn passthrough(channels: u32) -> Self {
        Self::with_bus_config(BusConfig::new().with_input(channels).with_output(channels))
    }
}

/// Read-only structural access to a node's buses.
///
/// Implemented by every node wrapper and by the engine (for its endpoint).
/// All queries degrade to `0` when the wrapper holds no backend node.
pub trait Topology {
    /// Backend node pointer; null when uninitialized.
    fn raw(&self) -> RawNode;

    fn input_bus_count(&self) -> u32 {
        graph::input_bus_count(self.raw().0)
    }

    fn output_bus_count(&self) -> u32 {
        graph::output_bus_count(self.raw().0)
    }

    fn input_bus_channels(&self, bus_index: u32) -> u32 {
        graph::input_bus_channels(self.raw().0, bus_index)
    }

    fn output_bus_channels(&self, bus_index: u32) -> u32 {
        graph::output_bus_channels(self.raw().0, bus_index)
    }

    /// View of one input bus. The view is valid only while this wrapper
    /// holds its backend node.
    fn input_bus(&self, bus_index: u32) -> InputBus {
        Bus::new(self.raw().0, bus_index)
    }

    /// View of one output bus.
    fn output_bus(&self, bus_index: u32) -> OutputBus {
        Bus::new(self.raw().0, bus_index)
    }
}

/// Routing and lifecycle control over a node.
///
/// Everything here is a default method over [`Topology::raw`]; wrappers
/// opt in with an empty impl block.
pub trait Routing: Topology {
    /// The node's primary (index 0) bus pair.
    fn node_io(&self) -> NodeIO {
        NodeIO {
            input: self.input_bus(0),
            output: self.output_bus(0),
        }
    }

    fn is_started(&self) -> bool {
        graph::node_state(self.raw().0) == NodeState::Started
    }

    /// Marks the node eligible for processing. Effective on the next
    /// period.
    fn start(&self) -> bool {
        graph::set_node_state(self.raw().0, NodeState::Started)
    }

    /// Excludes the node from processing; downstream reads silence.
    fn stop(&self) -> bool {
        graph::set_node_state(self.raw().0, NodeState::Stopped)
    }

    /// Whether `attach_to` with the same arguments would succeed.
    fn can_attach_to(&self, output_bus_index: u32, input: InputBus) -> bool {
        self.output_bus(output_bus_index).can_attach_to(input)
    }

    /// Routes one of this node's output buses into `input`.
    fn attach_to(&self, output_bus_index: u32, input: InputBus) -> bool {
        self.output_bus(output_bus_index).attach_to(input)
    }

    /// Unroutes one of this node's output buses.
    fn detach(&self, output_bus_index: u32) -> bool {
        self.output_bus(output_bus_index).detach()
    }
}
