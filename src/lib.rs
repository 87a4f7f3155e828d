//! klang - a real-time audio node graph with strict resource ownership
//!
//! Design principles:
//! - Every engine resource lives behind a [`ResourceHandle`] with a
//!   paired construct/destruct step; destruct runs exactly once
//! - Nodes declare their bus shape at construction; channel counts never
//!   change afterwards
//! - The audio-thread pull is allocation-free; control-side mutation is
//!   serialized against it by the engine
//! - Invalid handles and stale bus views degrade to `0`/`false`, they
//!   never panic
//! - Samples leave the graph only through [`Engine::read`]; where they go
//!   (a cpal device, a file, a test buffer) is the caller's business

pub mod bus;
pub mod callback;
#[cfg(feature = "device")]
pub mod device;
pub mod engine;
pub mod error;
pub mod graph;
pub mod handle;
pub mod nodes;
pub mod source;
pub mod vfs;

pub use bus::{Bus, BusConfig, InputBus, NodeIO, NodeLayout, OutputBus, RawNode, Routing, Topology};
pub use callback::{InterleavedView, InterleavedViewMut, ProcessCallbackData};
pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, Status};
pub use graph::{node_flags, NodeState};
pub use handle::{live_resources, Resource, ResourceHandle};
pub use nodes::{
    BaseNode, GroupNode, GroupSettings, HpfNode, LpfNode, ProcessNode, Sound, SplitterNode,
    MAX_FILTER_ORDER,
};
pub use source::{DataFormat, DataSource, PcmStreamSource, ReadInfo, SampleFormat};
pub use vfs::{FileInfo, OpenMode, SeekOrigin, StreamReader, Vfs, VfsFile};
