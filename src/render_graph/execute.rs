//! Consumes the compiled plan and a frame packet, recording barriers and
//! invoking each pass's callback in execution order (`spec.md` §4.6.4).

use std::time::Instant;

use crate::error::Result;
use crate::render_graph::backend::RenderBackend;
use crate::render_graph::graph::{PassTiming, RenderGraph};
use crate::render_graph::pass::{ExecuteContext, PassType};

impl RenderGraph {
    pub fn execute(&mut self, backend: &mut dyn RenderBackend, swapchain_image_index: u32, frame_packet: &dyn std::any::Any) -> Result<()> {
        self.require_compiled()?;
        self.pass_timings.clear();

        let order = self.execution_order.clone();
        for pass_idx in order {
            let started = self.timing_enabled.then(Instant::now);

            let barriers = self.passes[pass_idx].barriers.clone();
            for barrier in &barriers {
                backend.record_barrier(barrier);
            }

            let is_graphics = self.passes[pass_idx].pass_type == PassType::Graphics;
            if is_graphics {
                let render_pass = self.passes[pass_idx].compiled.render_pass.unwrap_or(0);
                let framebuffers = &self.passes[pass_idx].compiled.framebuffers;
                let framebuffer = framebuffers
                    .get(swapchain_image_index as usize)
                    .or_else(|| framebuffers.first())
                    .copied()
                    .unwrap_or(0);
                backend.begin_render_pass(render_pass, framebuffer);
            }

            if let Some(execute) = self.passes[pass_idx].execute {
                let mut ctx = ExecuteContext {
                    pass_name: &self.passes[pass_idx].name,
                    swapchain_image_index,
                    frame_packet,
                };
                execute(&mut ctx, self.passes[pass_idx].user_data);
            }

            if is_graphics {
                backend.end_render_pass();
            }

            if let Some(started) = started {
                self.pass_timings.push(PassTiming {
                    pass: self.passes[pass_idx].name.clone(),
                    cpu_nanos: started.elapsed().as_nanos() as u64,
                });
            }
        }
        Ok(())
    }
}
