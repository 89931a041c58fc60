//! The render graph itself: per-frame resource/pass declaration plus the
//! state compile and execute operate on (`spec.md` §4.6).

use std::collections::HashMap;

use crate::error::{EngineError, Result};
use crate::frame::FrameInfo;
use crate::render_graph::barrier::{Access, ImageLayout};
use crate::render_graph::cache::RenderPassCache;
use crate::render_graph::handle::ResourceHandle;
use crate::render_graph::pass::{Pass, PassBuilder, PassType};
use crate::render_graph::resource::{BufferDesc, ImageDesc, Resource, ResourceDesc};

const DEFAULT_PASS_CACHE_CAPACITY: usize = 256;

pub struct RenderGraph {
    pub(crate) resources: Vec<Resource>,
    pub(crate) name_to_resource: HashMap<String, usize>,
    pub(crate) passes: Vec<Pass>,
    pub(crate) present: Option<ResourceHandle>,
    pub(crate) execution_order: Vec<usize>,
    pub(crate) compiled: bool,
    pub(crate) swapchain_image_count: u32,
    pub(crate) pass_cache: RenderPassCache,
    pub(crate) frame_info: Option<FrameInfo>,
    pub(crate) timing_enabled: bool,
    pub(crate) pass_timings: Vec<PassTiming>,
}

/// CPU-side timing for one executed pass. GPU timestamps are left to the
/// backend (`spec.md` §4.6.4); the core only tracks wall-clock recording
/// overhead around the callback itself.
#[derive(Debug, Clone)]
pub struct PassTiming {
    pub pass: String,
    pub cpu_nanos: u64,
}

impl RenderGraph {
    pub fn new(swapchain_image_count: u32) -> Self {
        Self::with_pass_cache_capacity(swapchain_image_count, DEFAULT_PASS_CACHE_CAPACITY)
    }

    pub fn with_pass_cache_capacity(swapchain_image_count: u32, cache_capacity: usize) -> Self {
        Self {
            resources: Vec::new(),
            name_to_resource: HashMap::new(),
            passes: Vec::new(),
            present: None,
            execution_order: Vec::new(),
            compiled: false,
            swapchain_image_count: swapchain_image_count.max(1),
            pass_cache: RenderPassCache::new(cache_capacity),
            frame_info: None,
            timing_enabled: false,
            pass_timings: Vec::new(),
        }
    }

    pub fn set_timing_enabled(&mut self, enabled: bool) {
        self.timing_enabled = enabled;
    }

    pub fn pass_timings(&self) -> &[PassTiming] {
        &self.pass_timings
    }

    /// Clears pass state and marks all existing resources not-declared;
    /// their allocations are kept for potential reuse (`spec.md` §4.6.1
    /// step 1).
    pub fn begin_frame(&mut self, frame_info: FrameInfo) {
        self.passes.clear();
        self.present = None;
        self.execution_order.clear();
        self.compiled = false;
        for resource in &mut self.resources {
            resource.declared_this_frame = false;
            resource.exported = false;
            resource.first_pass = None;
            resource.last_pass = None;
        }
        self.frame_info = Some(frame_info);
    }

    pub fn frame_info(&self) -> Option<&FrameInfo> {
        self.frame_info.as_ref()
    }

    fn declare_resource(&mut self, name: &str, desc: ResourceDesc) -> ResourceHandle {
        if let Some(&index) = self.name_to_resource.get(name) {
            let resource = &mut self.resources[index];
            if resource.desc != desc {
                resource.generation = resource.generation.wrapping_add(1);
            }
            resource.desc = desc;
            resource.declared_this_frame = true;
            return ResourceHandle {
                index: index as u32,
                generation: resource.generation,
            };
        }
        let index = self.resources.len();
        let resource = Resource::new(name.to_string(), desc);
        let generation = resource.generation;
        self.resources.push(resource);
        self.name_to_resource.insert(name.to_string(), index);
        ResourceHandle {
            index: index as u32,
            generation,
        }
    }

    pub fn create_image(&mut self, name: &str, desc: ImageDesc) -> ResourceHandle {
        self.declare_resource(name, ResourceDesc::Image(desc))
    }

    pub fn create_buffer(&mut self, name: &str, desc: BufferDesc) -> ResourceHandle {
        self.declare_resource(name, ResourceDesc::Buffer(desc))
    }

    pub fn import_image(
        &mut self,
        name: &str,
        backend_handle: u64,
        access: Access,
        layout: ImageLayout,
        desc: ImageDesc,
    ) -> ResourceHandle {
        let handle = self.declare_resource(name, ResourceDesc::Image(desc));
        let resource = &mut self.resources[handle.index as usize];
        resource.imported = true;
        resource.import_handle = Some(backend_handle);
        resource.current_access = access;
        resource.current_layout = layout;
        handle
    }

    pub fn import_buffer(
        &mut self,
        name: &str,
        backend_handle: u64,
        access: Access,
        desc: BufferDesc,
    ) -> ResourceHandle {
        let handle = self.declare_resource(name, ResourceDesc::Buffer(desc));
        let resource = &mut self.resources[handle.index as usize];
        resource.imported = true;
        resource.import_handle = Some(backend_handle);
        resource.current_access = access;
        handle
    }

    pub fn export_image(&mut self, handle: ResourceHandle, final_access: Access, final_layout: ImageLayout) {
        if let Some(resource) = self.resources.get_mut(handle.index as usize) {
            resource.exported = true;
            resource.final_access = final_access;
            resource.final_layout = final_layout;
        }
    }

    pub fn export_buffer(&mut self, handle: ResourceHandle, final_access: Access) {
        if let Some(resource) = self.resources.get_mut(handle.index as usize) {
            resource.exported = true;
            resource.final_access = final_access;
        }
    }

    pub fn set_present_image(&mut self, handle: ResourceHandle) {
        self.present = Some(handle);
    }

    pub fn add_pass(&mut self, pass_type: PassType, name: &str) -> PassBuilder<'_> {
        let index = self.passes.len();
        self.passes.push(Pass::new(name.to_string(), pass_type));
        PassBuilder {
            pass: &mut self.passes[index],
        }
    }

    pub fn resource_valid(&self, handle: ResourceHandle) -> bool {
        self.resources
            .get(handle.index as usize)
            .map(|r| r.declared_this_frame && r.generation == handle.generation)
            .unwrap_or(false)
    }

    pub(crate) fn resource_name_or_unknown(&self, handle: ResourceHandle) -> String {
        self.resources
            .get(handle.index as usize)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| format!("<invalid:{}>", handle.index))
    }

    pub fn execution_order(&self) -> &[usize] {
        &self.execution_order
    }

    pub fn pass_name(&self, index: usize) -> &str {
        &self.passes[index].name
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub(crate) fn require_compiled(&self) -> Result<()> {
        if !self.compiled {
            log::warn!("render graph execute rejected: graph has not been successfully compiled");
            return Err(EngineError::InvalidParameter(
                "render graph executed before a successful compile".into(),
            ));
        }
        Ok(())
    }
}
