//! Access/layout states tracked per resource and the barriers synthesized
//! between them (`spec.md` §4.6.3 step 8).

/// A coarse stand-in for a Vulkan access-mask token; the concrete backend
/// maps these onto real `vk::AccessFlags2`. Ordering here is irrelevant —
/// only equality is used to detect a required transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    None,
    ColorAttachmentWrite,
    DepthStencilAttachmentWrite,
    DepthStencilAttachmentRead,
    SampledRead,
    TransferSrc,
    TransferDst,
    IndirectRead,
    VertexRead,
    IndexRead,
    UniformRead,
    ShaderStorageRead,
    ShaderStorageWrite,
    Present,
}

/// A coarse stand-in for a Vulkan image layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    ColorAttachmentOptimal,
    DepthStencilAttachmentOptimal,
    DepthStencilReadOnlyOptimal,
    ShaderReadOnlyOptimal,
    TransferSrcOptimal,
    TransferDstOptimal,
    PresentSrc,
    General,
}

impl Access {
    /// The layout an image must be in to perform this access. Buffers
    /// ignore layout entirely; callers pass `ImageLayout::General` for them.
    pub fn required_layout(self) -> ImageLayout {
        match self {
            Access::None => ImageLayout::Undefined,
            Access::ColorAttachmentWrite => ImageLayout::ColorAttachmentOptimal,
            Access::DepthStencilAttachmentWrite => ImageLayout::DepthStencilAttachmentOptimal,
            Access::DepthStencilAttachmentRead => ImageLayout::DepthStencilReadOnlyOptimal,
            Access::SampledRead => ImageLayout::ShaderReadOnlyOptimal,
            Access::TransferSrc => ImageLayout::TransferSrcOptimal,
            Access::TransferDst => ImageLayout::TransferDstOptimal,
            Access::Present => ImageLayout::PresentSrc,
            Access::IndirectRead
            | Access::VertexRead
            | Access::IndexRead
            | Access::UniformRead
            | Access::ShaderStorageRead
            | Access::ShaderStorageWrite => ImageLayout::General,
        }
    }

    pub fn is_write(self) -> bool {
        matches!(
            self,
            Access::ColorAttachmentWrite
                | Access::DepthStencilAttachmentWrite
                | Access::TransferDst
                | Access::ShaderStorageWrite
        )
    }
}

/// A pre-pass barrier recorded on the execution stream (`spec.md` §4.6.3
/// step 8, §4.6.4 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub resource: usize,
    pub src_access: Access,
    pub dst_access: Access,
    pub src_layout: ImageLayout,
    pub dst_layout: ImageLayout,
}
