//! Render-graph resources: images and buffers, owned or imported
//! (`spec.md` §3 "Render-graph resource", §4.6.1).

use crate::render_graph::barrier::{Access, ImageLayout};

macro_rules! flag_set {
    ($name:ident, $($variant:ident = $bit:expr),+ $(,)?) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub struct $name(u32);

        impl $name {
            pub const NONE: Self = Self(0);
            $(pub const $variant: Self = Self(1 << $bit);)+

            pub fn contains(self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl std::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, rhs: Self) {
                self.0 |= rhs.0;
            }
        }
    };
}

flag_set!(ResourceFlags,
    TRANSIENT = 0,
    PERSISTENT = 1,
    EXTERNAL = 2,
    PER_IMAGE = 3,
    RESIZABLE = 4,
);

flag_set!(ImageUsage,
    SAMPLED = 0,
    COLOR_ATTACHMENT = 1,
    DEPTH_STENCIL_ATTACHMENT = 2,
    TRANSFER_SRC = 3,
    TRANSFER_DST = 4,
);

flag_set!(BufferUsage,
    VERTEX_BUFFER = 0,
    INDEX_BUFFER = 1,
    UNIFORM_BUFFER = 2,
    STORAGE_BUFFER = 3,
    TRANSFER_SRC = 4,
    TRANSFER_DST = 5,
    INDIRECT = 6,
);

/// How an image's extent tracks the swapchain/viewport (`spec.md` §6
/// `extent.mode`).
#[derive(Debug, Clone, PartialEq)]
pub enum Extent {
    Window,
    Viewport,
    Fixed { width: u32, height: u32 },
    Square { size: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageDesc {
    pub format: String,
    pub extent: Extent,
    pub layers: u32,
    pub usage: ImageUsage,
    pub flags: ResourceFlags,
}

impl ImageDesc {
    pub fn new(format: impl Into<String>, extent: Extent) -> Self {
        Self {
            format: format.into(),
            extent,
            layers: 1,
            usage: ImageUsage::NONE,
            flags: ResourceFlags::NONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
    pub flags: ResourceFlags,
}

impl BufferDesc {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            size,
            usage,
            flags: ResourceFlags::NONE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDesc {
    Image(ImageDesc),
    Buffer(BufferDesc),
}

impl ResourceDesc {
    pub fn flags(&self) -> ResourceFlags {
        match self {
            ResourceDesc::Image(d) => d.flags,
            ResourceDesc::Buffer(d) => d.flags,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ResourceDesc::Image(_))
    }
}

/// Opaque backend object slots, one per swapchain image for `PER_IMAGE`
/// resources, a single entry otherwise. The concrete Vulkan backend fills
/// these in; the graph itself only tracks whether allocation happened and
/// at which compile generation.
#[derive(Debug, Clone, Default)]
pub(crate) struct AllocationState {
    pub backend_handles: Vec<u64>,
    pub allocated_generation: Option<u32>,
}

pub(crate) struct Resource {
    pub name: String,
    pub desc: ResourceDesc,
    pub generation: u32,
    pub declared_this_frame: bool,
    pub exported: bool,
    pub imported: bool,
    pub import_handle: Option<u64>,
    pub final_access: Access,
    pub final_layout: ImageLayout,
    pub current_access: Access,
    pub current_layout: ImageLayout,
    pub first_pass: Option<usize>,
    pub last_pass: Option<usize>,
    pub allocation: AllocationState,
}

impl Resource {
    pub fn new(name: String, desc: ResourceDesc) -> Self {
        Self {
            name,
            desc,
            generation: 0,
            declared_this_frame: true,
            exported: false,
            imported: false,
            import_handle: None,
            final_access: Access::None,
            final_layout: ImageLayout::Undefined,
            current_access: Access::None,
            current_layout: ImageLayout::Undefined,
            first_pass: None,
            last_pass: None,
            allocation: AllocationState::default(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.desc.is_image()
    }

    pub(crate) fn desc_format(&self) -> &str {
        match &self.desc {
            ResourceDesc::Image(d) => &d.format,
            ResourceDesc::Buffer(_) => "",
        }
    }
}
