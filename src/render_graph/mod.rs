//! Data-driven render graph: resource/pass declaration, a 9-step compile
//! pipeline, and execution against a backend (`spec.md` §4.6).

mod backend;
mod barrier;
mod cache;
mod compile;
mod description;
mod execute;
mod graph;
mod handle;
mod pass;
mod resource;

pub use backend::{NullBackend, RenderBackend};
pub use barrier::{Access, Barrier, ImageLayout};
pub use description::{
    ArrayIndexDesc, AttachmentsDesc, ColorAttachmentDesc, DepthAttachmentDesc, ExecutorRegistry, ExtentDesc,
    GraphDescriptionLoader, OutputsDesc, PassDescJson, RenderGraphDescription, RepeatDesc, ResourceDescJson,
    ResourceUseDesc, SliceDesc,
};
pub use graph::{PassTiming, RenderGraph};
pub use handle::ResourceHandle;
pub use pass::{
    AttachmentDesc, ClearValue, ExecuteContext, ExecuteFn, ImageSlice, LoadOp, PassBuilder, PassFlags, PassType,
    ResourceUse, StoreOp,
};
pub use resource::{BufferDesc, BufferUsage, Extent, ImageDesc, ImageUsage, ResourceFlags};
