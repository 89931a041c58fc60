//! Pass declaration: attachments, reads/writes, and the builder returned by
//! `RenderGraph::add_pass` (`spec.md` §4.6.2).

use crate::render_graph::barrier::Access;
use crate::render_graph::handle::ResourceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassType {
    Graphics,
    Compute,
    Transfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PassFlags(u32);

impl PassFlags {
    pub const NONE: Self = Self(0);
    pub const NO_CULL: Self = Self(1 << 0);
    pub const DISABLED: Self = Self(1 << 1);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for PassFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Load,
    Clear,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// An image's mip/layer slice. A single image attached at two different
/// slices is keyed separately for barrier purposes (`spec.md` §4.6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImageSlice {
    pub mip: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

#[derive(Debug, Clone)]
pub struct AttachmentDesc {
    pub image: ResourceHandle,
    pub load: LoadOp,
    pub store: StoreOp,
    pub clear: Option<ClearValue>,
    pub slice: ImageSlice,
    pub read_only: bool,
}

impl AttachmentDesc {
    pub fn new(image: ResourceHandle, load: LoadOp, store: StoreOp) -> Self {
        Self {
            image,
            load,
            store,
            clear: None,
            slice: ImageSlice::default(),
            read_only: false,
        }
    }
}

/// One read or write edge from a pass to a resource.
#[derive(Debug, Clone, Copy)]
pub struct ResourceUse {
    pub resource: ResourceHandle,
    pub access: Access,
    pub binding: u32,
    pub array_index: u32,
}

pub type ExecuteFn = fn(ctx: &mut ExecuteContext, user_data: usize);

/// Passed to a pass's `execute` callback; a thin boundary onto the backend's
/// command recorder, plus the frame packet.
pub struct ExecuteContext<'a> {
    pub pass_name: &'a str,
    pub swapchain_image_index: u32,
    pub frame_packet: &'a dyn std::any::Any,
}

/// Render-pass + framebuffer handles recorded on a graphics pass after
/// compile (`spec.md` §4.6.3 step 9).
#[derive(Debug, Clone, Default)]
pub(crate) struct CompiledPassHandles {
    pub render_pass: Option<u64>,
    pub framebuffers: Vec<u64>,
}

pub(crate) struct Pass {
    pub name: String,
    pub pass_type: PassType,
    pub domain: String,
    pub flags: PassFlags,
    pub color_attachments: Vec<AttachmentDesc>,
    pub depth_attachment: Option<AttachmentDesc>,
    pub reads: Vec<ResourceUse>,
    pub writes: Vec<ResourceUse>,
    pub execute: Option<ExecuteFn>,
    pub user_data: usize,
    pub out_edges: Vec<usize>,
    pub in_edges: Vec<usize>,
    pub culled: bool,
    pub compiled: CompiledPassHandles,
    pub barriers: Vec<crate::render_graph::barrier::Barrier>,
}

impl Pass {
    pub fn new(name: String, pass_type: PassType) -> Self {
        Self {
            name,
            pass_type,
            domain: String::new(),
            flags: PassFlags::NONE,
            color_attachments: Vec::new(),
            depth_attachment: None,
            reads: Vec::new(),
            writes: Vec::new(),
            execute: None,
            user_data: 0,
            out_edges: Vec::new(),
            in_edges: Vec::new(),
            culled: false,
            compiled: CompiledPassHandles::default(),
            barriers: Vec::new(),
        }
    }

    pub fn is_live_candidate(&self) -> bool {
        !self.flags.contains(PassFlags::DISABLED)
    }
}

/// Builder returned by `RenderGraph::add_pass`. Mutates the pass in place;
/// dropped once the caller is done configuring it.
pub struct PassBuilder<'a> {
    pub(crate) pass: &'a mut Pass,
}

impl<'a> PassBuilder<'a> {
    pub fn set_domain(self, domain: impl Into<String>) -> Self {
        self.pass.domain = domain.into();
        self
    }

    pub fn add_color_attachment(self, attachment: AttachmentDesc) -> Self {
        self.pass.writes.push(ResourceUse {
            resource: attachment.image,
            access: Access::ColorAttachmentWrite,
            binding: 0,
            array_index: 0,
        });
        self.pass.color_attachments.push(attachment);
        self
    }

    pub fn set_depth_attachment(self, attachment: AttachmentDesc) -> Self {
        let access = if attachment.read_only {
            Access::DepthStencilAttachmentRead
        } else {
            Access::DepthStencilAttachmentWrite
        };
        if attachment.read_only {
            self.pass.reads.push(ResourceUse {
                resource: attachment.image,
                access,
                binding: 0,
                array_index: 0,
            });
        } else {
            self.pass.writes.push(ResourceUse {
                resource: attachment.image,
                access,
                binding: 0,
                array_index: 0,
            });
        }
        self.pass.depth_attachment = Some(attachment);
        self
    }

    pub fn read_image(self, resource: ResourceHandle, access: Access, binding: u32, array_index: u32) -> Self {
        self.pass.reads.push(ResourceUse {
            resource,
            access,
            binding,
            array_index,
        });
        self
    }

    pub fn write_image(self, resource: ResourceHandle, access: Access, binding: u32, array_index: u32) -> Self {
        self.pass.writes.push(ResourceUse {
            resource,
            access,
            binding,
            array_index,
        });
        self
    }

    pub fn read_buffer(self, resource: ResourceHandle, access: Access, binding: u32) -> Self {
        self.pass.reads.push(ResourceUse {
            resource,
            access,
            binding,
            array_index: 0,
        });
        self
    }

    pub fn write_buffer(self, resource: ResourceHandle, access: Access, binding: u32) -> Self {
        self.pass.writes.push(ResourceUse {
            resource,
            access,
            binding,
            array_index: 0,
        });
        self
    }

    pub fn set_execute(self, execute: ExecuteFn, user_data: usize) -> Self {
        self.pass.execute = Some(execute);
        self.pass.user_data = user_data;
        self
    }

    pub fn set_flags(self, flags: PassFlags) -> Self {
        self.pass.flags = flags;
        self
    }
}
