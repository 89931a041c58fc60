//! Thin boundary onto the concrete Vulkan backend. The backend itself is
//! explicitly out of scope (`spec.md` §1); this trait is the contract the
//! render graph presents to it.

use crate::error::Result;
use crate::render_graph::resource::{BufferDesc, ImageDesc};

/// Everything the graph needs the backend to do: allocate/release resources,
/// hash-cache render passes and framebuffers, and accept recorded commands.
/// A real implementation wraps `ash`/`vk-mem`; tests use a no-op stub.
pub trait RenderBackend {
    fn allocate_image(&mut self, desc: &ImageDesc, swapchain_image_count: u32) -> Result<Vec<u64>>;
    fn release_image(&mut self, handles: &[u64]);

    fn allocate_buffer(&mut self, desc: &BufferDesc) -> Result<u64>;
    fn release_buffer(&mut self, handle: u64);

    /// Returns a cache key for this attachment configuration (formats,
    /// load/store ops, slices, clear values already folded in by the
    /// caller) and the backend handle for hit/miss resolution.
    fn create_render_pass(&mut self, config_hash: u64) -> Result<u64>;
    fn create_framebuffer(&mut self, render_pass: u64, attachments: &[u64]) -> Result<u64>;
    fn destroy_render_pass(&mut self, handle: u64);
    fn destroy_framebuffer(&mut self, handle: u64);

    fn record_barrier(&mut self, barrier: &crate::render_graph::barrier::Barrier);
    fn begin_render_pass(&mut self, render_pass: u64, framebuffer: u64);
    fn end_render_pass(&mut self);
}

/// No-op backend used by tests and by callers exercising only
/// declaration/compile without a real GPU present.
#[derive(Default)]
pub struct NullBackend {
    next_handle: u64,
}

impl NullBackend {
    fn fresh_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl RenderBackend for NullBackend {
    fn allocate_image(&mut self, _desc: &ImageDesc, swapchain_image_count: u32) -> Result<Vec<u64>> {
        Ok((0..swapchain_image_count.max(1)).map(|_| self.fresh_handle()).collect())
    }

    fn release_image(&mut self, _handles: &[u64]) {}

    fn allocate_buffer(&mut self, _desc: &BufferDesc) -> Result<u64> {
        Ok(self.fresh_handle())
    }

    fn release_buffer(&mut self, _handle: u64) {}

    fn create_render_pass(&mut self, _config_hash: u64) -> Result<u64> {
        Ok(self.fresh_handle())
    }

    fn create_framebuffer(&mut self, _render_pass: u64, _attachments: &[u64]) -> Result<u64> {
        Ok(self.fresh_handle())
    }

    fn destroy_render_pass(&mut self, _handle: u64) {}
    fn destroy_framebuffer(&mut self, _handle: u64) {}

    fn record_barrier(&mut self, _barrier: &crate::render_graph::barrier::Barrier) {}
    fn begin_render_pass(&mut self, _render_pass: u64, _framebuffer: u64) {}
    fn end_render_pass(&mut self) {}
}
