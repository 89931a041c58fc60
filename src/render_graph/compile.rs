//! The nine-step compile pipeline: validate, build the dependency DAG, cull,
//! order, allocate, synthesize barriers, cache render passes (`spec.md`
//! §4.6.3).

use std::collections::{BTreeSet, HashSet};
use std::hash::{Hash, Hasher};

use crate::error::{EngineError, Result};
use crate::render_graph::backend::RenderBackend;
use crate::render_graph::barrier::{Access, Barrier, ImageLayout};
use crate::render_graph::cache::RenderPassCacheEntry;
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::pass::{PassFlags, PassType, ResourceUse};
use crate::render_graph::resource::ResourceDesc;

impl RenderGraph {
    pub fn compile(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        self.compiled = false;
        self.validate()?;
        self.build_producer_map_and_edges()?;
        self.check_cycles()?;
        let live = self.compute_live_set();
        self.execution_order = self.topo_order(&live)?;
        self.allocate_resources(backend)?;
        self.synthesize_barriers();
        self.build_pass_cache(backend)?;
        self.compiled = true;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for pass in &self.passes {
            let has_attachment = !pass.color_attachments.is_empty() || pass.depth_attachment.is_some();
            if has_attachment && pass.pass_type != PassType::Graphics {
                let message = format!("pass '{}' has attachments but is not a graphics pass", pass.name);
                log::warn!("render graph compile rejected: {message}");
                return Err(EngineError::InvalidParameter(message));
            }
            if pass.pass_type == PassType::Graphics && !has_attachment {
                let message = format!("graphics pass '{}' has no attachments", pass.name);
                log::warn!("render graph compile rejected: {message}");
                return Err(EngineError::InvalidParameter(message));
            }
            for use_ in pass.reads.iter().chain(pass.writes.iter()) {
                if !self.resource_valid(use_.resource) {
                    let message = format!(
                        "pass '{}' references undeclared resource handle {:?}",
                        pass.name, use_.resource
                    );
                    log::warn!("render graph compile rejected: {message}");
                    return Err(EngineError::ResourceNotFound(message));
                }
            }
        }
        Ok(())
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        if from == to {
            return;
        }
        if !self.passes[from].out_edges.contains(&to) {
            self.passes[from].out_edges.push(to);
            self.passes[to].in_edges.push(from);
        }
    }

    fn build_producer_map_and_edges(&mut self) -> Result<()> {
        let mut producer_of: Vec<Option<usize>> = vec![None; self.resources.len()];

        for pass_idx in 0..self.passes.len() {
            let reads: Vec<ResourceUse> = self.passes[pass_idx].reads.clone();
            let writes: Vec<ResourceUse> = self.passes[pass_idx].writes.clone();

            for use_ in &reads {
                let r = use_.resource.index as usize;
                self.bump_first_last(r, pass_idx);
                if let Some(producer) = producer_of[r] {
                    self.add_edge(producer, pass_idx);
                }
            }
            for use_ in &writes {
                let r = use_.resource.index as usize;
                self.bump_first_last(r, pass_idx);
                if let Some(prev_producer) = producer_of[r] {
                    self.add_edge(prev_producer, pass_idx);
                }
                producer_of[r] = Some(pass_idx);
            }
        }
        Ok(())
    }

    fn bump_first_last(&mut self, resource_index: usize, pass_index: usize) {
        let resource = &mut self.resources[resource_index];
        resource.first_pass = Some(resource.first_pass.map_or(pass_index, |p| p.min(pass_index)));
        resource.last_pass = Some(resource.last_pass.map_or(pass_index, |p| p.max(pass_index)));
    }

    fn check_cycles(&self) -> Result<()> {
        let n = self.passes.len();
        let mut indegree: Vec<usize> = self.passes.iter().map(|p| p.in_edges.len()).collect();
        let mut queue: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
        let mut visited = 0usize;
        let mut head = 0;
        while head < queue.len() {
            let p = queue[head];
            head += 1;
            visited += 1;
            for &next in &self.passes[p].out_edges {
                indegree[next] -= 1;
                if indegree[next] == 0 {
                    queue.push(next);
                }
            }
        }
        if visited != n {
            let offending: Vec<String> = (0..n)
                .filter(|&i| indegree[i] > 0)
                .map(|i| self.passes[i].name.clone())
                .collect();
            log::error!("render graph compile aborted: cycle involving passes {offending:?}");
            return Err(EngineError::Cycle { passes: offending });
        }
        Ok(())
    }

    fn compute_live_set(&self) -> HashSet<usize> {
        let present_index = self.present.map(|h| h.index as usize);
        let mut live = HashSet::new();
        let mut queue = Vec::new();

        for (idx, pass) in self.passes.iter().enumerate() {
            if pass.flags.contains(PassFlags::DISABLED) {
                continue;
            }
            let writes_present = present_index
                .map(|r| pass.writes.iter().any(|u| u.resource.index as usize == r))
                .unwrap_or(false);
            let writes_exported = pass
                .writes
                .iter()
                .any(|u| self.resources[u.resource.index as usize].exported);
            if pass.flags.contains(PassFlags::NO_CULL) || writes_present || writes_exported {
                if live.insert(idx) {
                    queue.push(idx);
                }
            }
        }

        let mut head = 0;
        while head < queue.len() {
            let p = queue[head];
            head += 1;
            for &producer in &self.passes[p].in_edges {
                if self.passes[producer].flags.contains(PassFlags::DISABLED) {
                    continue;
                }
                if live.insert(producer) {
                    queue.push(producer);
                }
            }
        }
        live
    }

    /// Kahn's algorithm restricted to `live`, tie-broken by ascending
    /// insertion index for deterministic output.
    fn topo_order(&self, live: &HashSet<usize>) -> Result<Vec<usize>> {
        let mut indegree: Vec<usize> = vec![0; self.passes.len()];
        for &idx in live {
            indegree[idx] = self.passes[idx]
                .in_edges
                .iter()
                .filter(|&&p| live.contains(&p))
                .count();
        }

        let mut ready: BTreeSet<usize> = live.iter().copied().filter(|&i| indegree[i] == 0).collect();
        let mut order = Vec::with_capacity(live.len());
        while let Some(&next) = ready.iter().next() {
            ready.remove(&next);
            order.push(next);
            for &consumer in &self.passes[next].out_edges {
                if !live.contains(&consumer) {
                    continue;
                }
                indegree[consumer] -= 1;
                if indegree[consumer] == 0 {
                    ready.insert(consumer);
                }
            }
        }
        Ok(order)
    }

    fn allocate_resources(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        let mut used_resources: HashSet<usize> = HashSet::new();
        for &pass_idx in &self.execution_order {
            for use_ in self.passes[pass_idx].reads.iter().chain(self.passes[pass_idx].writes.iter()) {
                used_resources.insert(use_.resource.index as usize);
            }
        }

        for &r in &used_resources {
            let resource = &self.resources[r];
            if resource.imported {
                continue;
            }
            if resource.allocation.allocated_generation == Some(resource.generation) {
                continue;
            }
            let old_handles = self.resources[r].allocation.backend_handles.clone();
            let new_handles = match &self.resources[r].desc {
                ResourceDesc::Image(desc) => {
                    let count = if desc.flags.contains(crate::render_graph::resource::ResourceFlags::PER_IMAGE) {
                        self.swapchain_image_count
                    } else {
                        1
                    };
                    backend.allocate_image(desc, count)
                }
                ResourceDesc::Buffer(desc) => backend.allocate_buffer(desc).map(|h| vec![h]),
            };
            let new_handles = match new_handles {
                Ok(h) => h,
                Err(err) => {
                    log::error!("render graph compile aborted: backend allocation failed for resource '{}': {err}", self.resources[r].name);
                    // Release anything this compile pass already allocated before propagating.
                    for &already in &used_resources {
                        if already == r {
                            continue;
                        }
                        let res = &mut self.resources[already];
                        if res.allocation.allocated_generation == Some(res.generation) && !res.imported {
                            release_resource(res, backend);
                        }
                    }
                    return Err(err);
                }
            };
            if !old_handles.is_empty() {
                release_by_kind(&self.resources[r].desc, &old_handles, backend);
            }
            let resource = &mut self.resources[r];
            resource.allocation.backend_handles = new_handles;
            resource.allocation.allocated_generation = Some(resource.generation);
        }
        Ok(())
    }

    fn synthesize_barriers(&mut self) {
        let order = self.execution_order.clone();
        for pass_idx in order {
            let uses: Vec<ResourceUse> = self.passes[pass_idx]
                .reads
                .iter()
                .chain(self.passes[pass_idx].writes.iter())
                .copied()
                .collect();
            let mut barriers = Vec::new();
            for use_ in uses {
                let resource_index = use_.resource.index as usize;
                let resource = &mut self.resources[resource_index];
                let dst_access = use_.access;
                let dst_layout = if resource.is_image() {
                    dst_access.required_layout()
                } else {
                    ImageLayout::General
                };
                if resource.current_access != dst_access || resource.current_layout != dst_layout {
                    barriers.push(Barrier {
                        resource: resource_index,
                        src_access: resource.current_access,
                        dst_access,
                        src_layout: resource.current_layout,
                        dst_layout,
                    });
                    resource.current_access = dst_access;
                    resource.current_layout = dst_layout;
                }
            }
            self.passes[pass_idx].barriers = barriers;
        }

        if let Some(last_pass) = self.execution_order.last().copied() {
            if let Some(present) = self.present {
                self.finalize_transition(present.index as usize, Access::Present, ImageLayout::PresentSrc, last_pass);
            }
            let exported: Vec<(usize, Access, ImageLayout)> = self
                .resources
                .iter()
                .enumerate()
                .filter(|(_, r)| r.exported)
                .map(|(i, r)| (i, r.final_access, r.final_layout))
                .collect();
            for (index, access, layout) in exported {
                self.finalize_transition(index, access, layout, last_pass);
            }
        }
    }

    fn finalize_transition(&mut self, resource_index: usize, target_access: Access, target_layout: ImageLayout, pass_idx: usize) {
        let resource = &mut self.resources[resource_index];
        let target_layout = if resource.is_image() { target_layout } else { ImageLayout::General };
        if resource.current_access == target_access && resource.current_layout == target_layout {
            return;
        }
        let barrier = Barrier {
            resource: resource_index,
            src_access: resource.current_access,
            dst_access: target_access,
            src_layout: resource.current_layout,
            dst_layout: target_layout,
        };
        resource.current_access = target_access;
        resource.current_layout = target_layout;
        self.passes[pass_idx].barriers.push(barrier);
    }

    fn build_pass_cache(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        let order = self.execution_order.clone();
        for pass_idx in order {
            if self.passes[pass_idx].pass_type != PassType::Graphics {
                continue;
            }
            let config_hash = self.attachment_config_hash(pass_idx);
            if let Some(entry) = self.pass_cache.get(config_hash) {
                self.passes[pass_idx].compiled.render_pass = Some(entry.render_pass);
                self.passes[pass_idx].compiled.framebuffers = entry.framebuffers.clone();
                continue;
            }
            let render_pass = backend.create_render_pass(config_hash).inspect_err(|err| {
                log::error!("render graph compile aborted: create_render_pass failed for pass '{}': {err}", self.passes[pass_idx].name);
            })?;
            let attachment_handles: Vec<u64> = self.passes[pass_idx]
                .color_attachments
                .iter()
                .chain(self.passes[pass_idx].depth_attachment.iter())
                .filter_map(|a| {
                    self.resources[a.image.index as usize]
                        .allocation
                        .backend_handles
                        .first()
                        .copied()
                })
                .collect();
            let framebuffer = backend.create_framebuffer(render_pass, &attachment_handles).inspect_err(|err| {
                log::error!("render graph compile aborted: create_framebuffer failed for pass '{}': {err}", self.passes[pass_idx].name);
            })?;
            self.passes[pass_idx].compiled.render_pass = Some(render_pass);
            self.passes[pass_idx].compiled.framebuffers = vec![framebuffer];
            self.pass_cache.insert(
                config_hash,
                RenderPassCacheEntry {
                    render_pass,
                    framebuffers: vec![framebuffer],
                },
                backend,
            );
        }
        Ok(())
    }

    fn attachment_config_hash(&self, pass_idx: usize) -> u64 {
        let pass = &self.passes[pass_idx];
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for attachment in &pass.color_attachments {
            self.resources[attachment.image.index as usize].desc_format().hash(&mut hasher);
            (attachment.load as u8, attachment.store as u8).hash(&mut hasher);
            (attachment.slice.mip, attachment.slice.base_layer, attachment.slice.layer_count).hash(&mut hasher);
        }
        if let Some(depth) = &pass.depth_attachment {
            self.resources[depth.image.index as usize].desc_format().hash(&mut hasher);
            (depth.load as u8, depth.store as u8, depth.read_only).hash(&mut hasher);
        }
        hasher.finish()
    }
}

fn release_resource(resource: &mut crate::render_graph::resource::Resource, backend: &mut dyn RenderBackend) {
    let handles = std::mem::take(&mut resource.allocation.backend_handles);
    release_by_kind(&resource.desc, &handles, backend);
    resource.allocation.allocated_generation = None;
}

fn release_by_kind(desc: &ResourceDesc, handles: &[u64], backend: &mut dyn RenderBackend) {
    match desc {
        ResourceDesc::Image(_) => backend.release_image(handles),
        ResourceDesc::Buffer(_) => {
            if let Some(&handle) = handles.first() {
                backend.release_buffer(handle);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::render_graph::backend::NullBackend;
    use crate::render_graph::pass::{PassFlags, PassType};
    use crate::render_graph::resource::{BufferDesc, Extent, ImageDesc, ImageUsage};
    use crate::render_graph::{Access, ImageLayout, RenderGraph};

    fn test_image(format: &str) -> ImageDesc {
        let mut desc = ImageDesc::new(format, Extent::Viewport);
        desc.usage = ImageUsage::COLOR_ATTACHMENT | ImageUsage::SAMPLED;
        desc
    }

    #[test]
    fn scenario_6_unreachable_pass_is_culled() {
        let mut graph = RenderGraph::new(1);
        graph.begin_frame(crate::frame::FrameInfo {
            window_width: 800,
            window_height: 600,
            viewport_width: 800,
            viewport_height: 600,
            swapchain_color_format: "B8G8R8A8_UNORM".into(),
            swapchain_depth_format: "D32_SFLOAT".into(),
            swapchain_image_count: 1,
            swapchain_image_index: 0,
            shadow_map_size: 1024,
            shadow_cascade_count: 1,
            editor_enabled: false,
        });

        let i1 = graph.create_image("i1", test_image("R8G8B8A8_UNORM"));
        let i2 = graph.create_image("i2", test_image("R8G8B8A8_UNORM"));
        let present = graph.create_image("present", test_image("B8G8R8A8_UNORM"));
        graph.set_present_image(present);

        use crate::render_graph::pass::AttachmentDesc;
        use crate::render_graph::pass::{LoadOp, StoreOp};

        graph
            .add_pass(PassType::Graphics, "p1")
            .add_color_attachment(AttachmentDesc::new(i1, LoadOp::Clear, StoreOp::Store))
            .set_execute(|_, _| {}, 0);

        // p2 reads i1 and writes i2, but nothing downstream ever reads i2 or
        // marks it exported/present, so p2 should be culled.
        graph
            .add_pass(PassType::Graphics, "p2")
            .read_image(i1, Access::SampledRead, 0, 0)
            .add_color_attachment(AttachmentDesc::new(i2, LoadOp::Clear, StoreOp::Store))
            .set_execute(|_, _| {}, 0);

        graph
            .add_pass(PassType::Graphics, "p3")
            .read_image(i1, Access::SampledRead, 0, 0)
            .add_color_attachment(AttachmentDesc::new(present, LoadOp::Clear, StoreOp::Store))
            .set_execute(|_, _| {}, 0);

        let mut backend = NullBackend::default();
        graph.compile(&mut backend).unwrap();

        let names: Vec<&str> = graph.execution_order().iter().map(|&i| graph.pass_name(i)).collect();
        assert_eq!(names, vec!["p1", "p3"]);
    }

    #[test]
    fn scenario_7_barrier_synthesized_on_access_transition() {
        let mut graph = RenderGraph::new(1);
        graph.begin_frame(crate::frame::FrameInfo {
            window_width: 800,
            window_height: 600,
            viewport_width: 800,
            viewport_height: 600,
            swapchain_color_format: "B8G8R8A8_UNORM".into(),
            swapchain_depth_format: "D32_SFLOAT".into(),
            swapchain_image_count: 1,
            swapchain_image_index: 0,
            shadow_map_size: 1024,
            shadow_cascade_count: 1,
            editor_enabled: false,
        });

        let i = graph.create_image("i", test_image("R8G8B8A8_UNORM"));
        let present = graph.create_image("present", test_image("B8G8R8A8_UNORM"));
        graph.set_present_image(present);

        use crate::render_graph::pass::AttachmentDesc;
        use crate::render_graph::pass::{LoadOp, StoreOp};

        graph
            .add_pass(PassType::Graphics, "p1")
            .add_color_attachment(AttachmentDesc::new(i, LoadOp::Clear, StoreOp::Store))
            .set_execute(|_, _| {}, 0);

        graph
            .add_pass(PassType::Compute, "p2")
            .read_image(i, Access::SampledRead, 0, 0)
            .write_image(present, Access::ShaderStorageWrite, 0, 0)
            .set_execute(|_, _| {}, 0);

        let mut backend = NullBackend::default();
        graph.compile(&mut backend).unwrap();

        let p2 = graph.execution_order()[1];
        let barriers = &graph.passes[p2].barriers;
        let on_i = barriers
            .iter()
            .filter(|b| b.resource == i.index as usize)
            .collect::<Vec<_>>();
        assert_eq!(on_i.len(), 1);
        assert_eq!(on_i[0].src_access, Access::ColorAttachmentWrite);
        assert_eq!(on_i[0].dst_access, Access::SampledRead);
        assert_eq!(on_i[0].dst_layout, ImageLayout::ShaderReadOnlyOptimal);
    }

    #[test]
    fn allocation_failure_rolls_back_already_allocated_resources() {
        struct FailingBackend {
            allocations: usize,
        }
        impl crate::render_graph::RenderBackend for FailingBackend {
            fn allocate_image(&mut self, _desc: &ImageDesc, _swapchain_image_count: u32) -> crate::error::Result<Vec<u64>> {
                self.allocations += 1;
                if self.allocations == 1 {
                    Ok(vec![1])
                } else {
                    Err(crate::error::EngineError::BackendError("out of device memory".into()))
                }
            }
            fn release_image(&mut self, _handles: &[u64]) {}
            fn allocate_buffer(&mut self, _desc: &BufferDesc) -> crate::error::Result<u64> {
                Ok(1)
            }
            fn release_buffer(&mut self, _handle: u64) {}
            fn create_render_pass(&mut self, _config_hash: u64) -> crate::error::Result<u64> {
                Ok(1)
            }
            fn create_framebuffer(&mut self, _render_pass: u64, _attachments: &[u64]) -> crate::error::Result<u64> {
                Ok(1)
            }
            fn destroy_render_pass(&mut self, _handle: u64) {}
            fn destroy_framebuffer(&mut self, _handle: u64) {}
            fn record_barrier(&mut self, _barrier: &crate::render_graph::Barrier) {}
            fn begin_render_pass(&mut self, _render_pass: u64, _framebuffer: u64) {}
            fn end_render_pass(&mut self) {}
        }

        let mut graph = RenderGraph::new(1);
        graph.begin_frame(crate::frame::FrameInfo {
            window_width: 800,
            window_height: 600,
            viewport_width: 800,
            viewport_height: 600,
            swapchain_color_format: "B8G8R8A8_UNORM".into(),
            swapchain_depth_format: "D32_SFLOAT".into(),
            swapchain_image_count: 1,
            swapchain_image_index: 0,
            shadow_map_size: 1024,
            shadow_cascade_count: 1,
            editor_enabled: false,
        });

        let i1 = graph.create_image("i1", test_image("R8G8B8A8_UNORM"));
        let present = graph.create_image("present", test_image("B8G8R8A8_UNORM"));
        graph.set_present_image(present);

        use crate::render_graph::pass::AttachmentDesc;
        use crate::render_graph::pass::{LoadOp, StoreOp};

        graph
            .add_pass(PassType::Graphics, "p1")
            .add_color_attachment(AttachmentDesc::new(i1, LoadOp::Clear, StoreOp::Store))
            .set_flags(PassFlags::NO_CULL)
            .set_execute(|_, _| {}, 0);
        graph
            .add_pass(PassType::Graphics, "p2")
            .add_color_attachment(AttachmentDesc::new(present, LoadOp::Clear, StoreOp::Store))
            .set_execute(|_, _| {}, 0);

        let mut backend = FailingBackend { allocations: 0 };
        assert!(graph.compile(&mut backend).is_err());
    }
}
