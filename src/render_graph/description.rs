//! Declarative JSON graph description: parsing, template expansion, and the
//! executor-token registry (`spec.md` §4.6.5, §6).
//!
//! Grounded on the reference pack's `RenderGraphDesc`/`validate_graph`/
//! `topo_sort` (`src/core/render/graph.rs`), generalized from its fixed
//! built-in pass list to this crate's fully data-driven resource/pass model.
//! `RenderGraphState`'s fallback-on-invalid-graph behavior is kept as
//! `GraphDescriptionLoader::with_fallback`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::frame::FrameInfo;
use crate::render_graph::barrier::Access;
use crate::render_graph::handle::ResourceHandle;
use crate::render_graph::pass::{
    AttachmentDesc, ClearValue, ExecuteFn, ImageSlice, LoadOp, PassFlags, PassType, StoreOp,
};
use crate::render_graph::resource::{BufferDesc, BufferUsage, Extent, ImageDesc, ImageUsage, ResourceFlags};
use crate::render_graph::RenderGraph;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RepeatDesc {
    pub count_source: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ArrayIndexDesc {
    Int(u32),
    Template(String),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtentDesc {
    pub mode: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub size_source: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClearColorDesc {
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClearDepthDesc {
    pub depth: f32,
    #[serde(default)]
    pub stencil: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SliceDesc {
    #[serde(default)]
    pub mip: Option<u32>,
    #[serde(default)]
    pub base_layer: Option<u32>,
    #[serde(default)]
    pub layer_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceDescJson {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub repeat: Option<RepeatDesc>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub import: Option<String>,
    #[serde(default)]
    pub extent: Option<ExtentDesc>,
    #[serde(default)]
    pub layers: Option<u32>,
    #[serde(default)]
    pub layers_source: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub usage: Vec<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceUseDesc {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub buffer: Option<String>,
    pub access: String,
    #[serde(default)]
    pub binding: Option<u32>,
    #[serde(default)]
    pub array_index: Option<ArrayIndexDesc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColorAttachmentDesc {
    pub image: String,
    pub load: String,
    pub store: String,
    #[serde(default)]
    pub clear: Option<ClearColorDesc>,
    #[serde(default)]
    pub slice: SliceDesc,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DepthAttachmentDesc {
    pub image: String,
    pub load: String,
    pub store: String,
    #[serde(default)]
    pub clear: Option<ClearDepthDesc>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub slice: SliceDesc,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AttachmentsDesc {
    #[serde(default)]
    pub color: Vec<ColorAttachmentDesc>,
    #[serde(default)]
    pub depth: Option<DepthAttachmentDesc>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PassDescJson {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub repeat: Option<RepeatDesc>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub reads: Vec<ResourceUseDesc>,
    #[serde(default)]
    pub writes: Vec<ResourceUseDesc>,
    #[serde(default)]
    pub attachments: AttachmentsDesc,
    pub execute: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OutputsDesc {
    #[serde(default)]
    pub present: Option<String>,
    #[serde(default)]
    pub export_images: Vec<String>,
    #[serde(default)]
    pub export_buffers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderGraphDescription {
    pub version: u32,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub resources: Vec<ResourceDescJson>,
    #[serde(default)]
    pub passes: Vec<PassDescJson>,
    #[serde(default)]
    pub outputs: OutputsDesc,
}

impl RenderGraphDescription {
    pub fn from_json(json: &str) -> Result<Self> {
        let description: Self = serde_json::from_str(json).map_err(|e| {
            let message = format!("malformed render graph description: {e}");
            log::warn!("render graph description parse rejected: {message}");
            EngineError::InvalidParameter(message)
        })?;
        if description.version != 1 {
            let message = format!("unsupported render graph description version {}", description.version);
            log::warn!("render graph description parse rejected: {message}");
            return Err(EngineError::InvalidParameter(message));
        }
        Ok(description)
    }
}

/// Resolves an `execute` token to a function pointer + user data at build
/// time (`spec.md` §4.6.5).
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<String, (ExecuteFn, usize)>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: impl Into<String>, execute: ExecuteFn, user_data: usize) {
        self.executors.insert(token.into(), (execute, user_data));
    }

    pub fn resolve(&self, token: &str) -> Option<(ExecuteFn, usize)> {
        self.executors.get(token).copied()
    }
}

/// Parses and builds a declarative description, optionally falling back to
/// a known-good description if the primary one fails to build.
pub struct GraphDescriptionLoader {
    description: RenderGraphDescription,
    fallback: Option<RenderGraphDescription>,
}

impl GraphDescriptionLoader {
    pub fn new(description: RenderGraphDescription) -> Self {
        Self {
            description,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: RenderGraphDescription) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn build(&self, graph: &mut RenderGraph, frame_info: &FrameInfo, executors: &ExecutorRegistry) -> Result<()> {
        match build_description(&self.description, graph, frame_info, executors) {
            Ok(()) => Ok(()),
            Err(err) => match &self.fallback {
                Some(fallback) => {
                    log::warn!("render graph description build failed, falling back: {err}");
                    build_description(fallback, graph, frame_info, executors).inspect_err(|err| {
                        log::error!("render graph fallback description also failed to build: {err}");
                    })
                }
                None => {
                    log::warn!("render graph description build failed: {err}");
                    Err(err)
                }
            },
        }
    }
}

fn expand_template(name: &str, index: u32) -> String {
    name.replace("${i}", &index.to_string())
}

fn resolve_count(repeat: &Option<RepeatDesc>, frame_info: &FrameInfo) -> Result<u32> {
    match repeat {
        None => Ok(1),
        Some(r) => frame_info.resolve_named_field(&r.count_source).ok_or_else(|| {
            EngineError::InvalidParameter(format!("unknown repeat.count_source '{}'", r.count_source))
        }),
    }
}

fn parse_image_usage(tokens: &[String]) -> ImageUsage {
    let mut usage = ImageUsage::NONE;
    for token in tokens {
        usage |= match token.as_str() {
            "SAMPLED" => ImageUsage::SAMPLED,
            "COLOR_ATTACHMENT" => ImageUsage::COLOR_ATTACHMENT,
            "DEPTH_STENCIL_ATTACHMENT" => ImageUsage::DEPTH_STENCIL_ATTACHMENT,
            "TRANSFER_SRC" => ImageUsage::TRANSFER_SRC,
            "TRANSFER_DST" => ImageUsage::TRANSFER_DST,
            _ => ImageUsage::NONE,
        };
    }
    usage
}

fn parse_buffer_usage(tokens: &[String]) -> BufferUsage {
    let mut usage = BufferUsage::NONE;
    for token in tokens {
        usage |= match token.as_str() {
            "VERTEX_BUFFER" => BufferUsage::VERTEX_BUFFER,
            "INDEX_BUFFER" => BufferUsage::INDEX_BUFFER,
            "UNIFORM_BUFFER" => BufferUsage::UNIFORM_BUFFER,
            "STORAGE_BUFFER" => BufferUsage::STORAGE_BUFFER,
            "TRANSFER_SRC" => BufferUsage::TRANSFER_SRC,
            "TRANSFER_DST" => BufferUsage::TRANSFER_DST,
            "INDIRECT" => BufferUsage::INDIRECT,
            _ => BufferUsage::NONE,
        };
    }
    usage
}

fn parse_flags(tokens: &[String]) -> ResourceFlags {
    let mut flags = ResourceFlags::NONE;
    for token in tokens {
        flags |= match token.as_str() {
            "TRANSIENT" => ResourceFlags::TRANSIENT,
            "PERSISTENT" => ResourceFlags::PERSISTENT,
            "EXTERNAL" => ResourceFlags::EXTERNAL,
            "PER_IMAGE" => ResourceFlags::PER_IMAGE,
            "RESIZABLE" => ResourceFlags::RESIZABLE,
            _ => ResourceFlags::NONE,
        };
    }
    flags
}

fn parse_pass_flags(tokens: &[String]) -> PassFlags {
    let mut flags = PassFlags::NONE;
    for token in tokens {
        flags = flags
            | match token.as_str() {
                "NO_CULL" => PassFlags::NO_CULL,
                "DISABLED" => PassFlags::DISABLED,
                _ => PassFlags::NONE,
            };
    }
    flags
}

fn parse_access(token: &str) -> Result<Access> {
    Ok(match token {
        "color_attachment_write" => Access::ColorAttachmentWrite,
        "depth_stencil_attachment_write" => Access::DepthStencilAttachmentWrite,
        "depth_stencil_attachment_read" => Access::DepthStencilAttachmentRead,
        "sampled_read" => Access::SampledRead,
        "transfer_src" => Access::TransferSrc,
        "transfer_dst" => Access::TransferDst,
        "indirect_read" => Access::IndirectRead,
        "vertex_read" => Access::VertexRead,
        "index_read" => Access::IndexRead,
        "uniform_read" => Access::UniformRead,
        "shader_storage_read" => Access::ShaderStorageRead,
        "shader_storage_write" => Access::ShaderStorageWrite,
        "present" => Access::Present,
        other => return Err(EngineError::InvalidParameter(format!("unknown access token '{other}'"))),
    })
}

fn parse_load_op(token: &str) -> Result<LoadOp> {
    Ok(match token {
        "LOAD" => LoadOp::Load,
        "CLEAR" => LoadOp::Clear,
        "DONT_CARE" => LoadOp::DontCare,
        other => return Err(EngineError::InvalidParameter(format!("unknown load op '{other}'"))),
    })
}

fn parse_store_op(token: &str) -> Result<StoreOp> {
    Ok(match token {
        "STORE" => StoreOp::Store,
        "DONT_CARE" => StoreOp::DontCare,
        other => return Err(EngineError::InvalidParameter(format!("unknown store op '{other}'"))),
    })
}

fn resolve_format(token: &str, frame_info: &FrameInfo) -> String {
    match token {
        "SWAPCHAIN" => frame_info.swapchain_color_format.clone(),
        "SWAPCHAIN_DEPTH" => frame_info.swapchain_depth_format.clone(),
        "SHADOW_DEPTH" => "D32_SFLOAT".to_string(),
        other => other.to_string(),
    }
}

fn resolve_extent(extent: &Option<ExtentDesc>, frame_info: &FrameInfo) -> Result<Extent> {
    let Some(extent) = extent else {
        return Ok(Extent::Viewport);
    };
    match extent.mode.as_str() {
        "window" => Ok(Extent::Window),
        "viewport" => Ok(Extent::Viewport),
        "fixed" => Ok(Extent::Fixed {
            width: extent.width.unwrap_or(0),
            height: extent.height.unwrap_or(0),
        }),
        "square" => {
            let size = match &extent.size_source {
                Some(source) => frame_info
                    .resolve_named_field(source)
                    .ok_or_else(|| EngineError::InvalidParameter(format!("unknown extent.size_source '{source}'")))?,
                None => extent.width.unwrap_or(0),
            };
            Ok(Extent::Square { size })
        }
        other => Err(EngineError::InvalidParameter(format!("unknown extent.mode '{other}'"))),
    }
}

fn build_description(
    description: &RenderGraphDescription,
    graph: &mut RenderGraph,
    frame_info: &FrameInfo,
    executors: &ExecutorRegistry,
) -> Result<()> {
    let mut declared: HashMap<String, ResourceHandle> = HashMap::new();

    for resource in &description.resources {
        if let Some(condition) = &resource.condition {
            if !frame_info.condition_holds(condition) {
                continue;
            }
        }
        let count = resolve_count(&resource.repeat, frame_info)?;
        for i in 0..count {
            let name = expand_template(&resource.name, i);
            let flags = parse_flags(&resource.flags);
            let handle = if resource.kind == "image" {
                let format = resolve_format(resource.format.as_deref().unwrap_or(""), frame_info);
                let extent = resolve_extent(&resource.extent, frame_info)?;
                let layers = match &resource.layers_source {
                    Some(source) => frame_info
                        .resolve_named_field(source)
                        .ok_or_else(|| EngineError::InvalidParameter(format!("unknown layers_source '{source}'")))?,
                    None => resource.layers.unwrap_or(1),
                };
                let mut desc = ImageDesc::new(format, extent);
                desc.layers = layers;
                desc.usage = parse_image_usage(&resource.usage);
                desc.flags = flags;
                if resource.import.is_some() {
                    graph.import_image(&name, 0, Access::None, crate::render_graph::barrier::ImageLayout::Undefined, desc)
                } else {
                    graph.create_image(&name, desc)
                }
            } else {
                let mut desc = BufferDesc::new(resource.size.unwrap_or(0), parse_buffer_usage(&resource.usage));
                desc.flags = flags;
                if resource.import.is_some() {
                    graph.import_buffer(&name, 0, Access::None, desc)
                } else {
                    graph.create_buffer(&name, desc)
                }
            };
            declared.insert(name, handle);
        }
    }

    for pass in &description.passes {
        if let Some(condition) = &pass.condition {
            if !frame_info.condition_holds(condition) {
                continue;
            }
        }
        let count = resolve_count(&pass.repeat, frame_info)?;
        for i in 0..count {
            let name = expand_template(&pass.name, i);
            let pass_type = match pass.kind.as_str() {
                "graphics" => PassType::Graphics,
                "compute" => PassType::Compute,
                "transfer" => PassType::Transfer,
                other => return Err(EngineError::InvalidParameter(format!("unknown pass type '{other}'"))),
            };
            let (execute, user_data) = executors
                .resolve(&pass.execute)
                .ok_or_else(|| EngineError::InvalidParameter(format!("unknown executor token '{}'", pass.execute)))?;

            let resolve_name = |template: &str| expand_template(template, i);
            let lookup = |declared: &HashMap<String, ResourceHandle>, template: &str| -> Result<ResourceHandle> {
                let resolved = resolve_name(template);
                declared
                    .get(&resolved)
                    .copied()
                    .ok_or_else(|| EngineError::ResourceNotFound(format!("pass '{name}' references undeclared resource '{resolved}'")))
            };

            let mut builder = graph.add_pass(pass_type, &name).set_domain(pass.domain.clone().unwrap_or_default());
            builder = builder.set_flags(parse_pass_flags(&pass.flags));

            for color in &pass.attachments.color {
                let image = lookup(&declared, &color.image)?;
                let mut attachment = AttachmentDesc::new(image, parse_load_op(&color.load)?, parse_store_op(&color.store)?);
                attachment.clear = color.clear.as_ref().map(|c| ClearValue::Color(c.color));
                attachment.slice = ImageSlice {
                    mip: color.slice.mip.unwrap_or(0),
                    base_layer: color.slice.base_layer.unwrap_or(0),
                    layer_count: color.slice.layer_count.unwrap_or(1),
                };
                builder = builder.add_color_attachment(attachment);
            }
            if let Some(depth) = &pass.attachments.depth {
                let image = lookup(&declared, &depth.image)?;
                let mut attachment = AttachmentDesc::new(image, parse_load_op(&depth.load)?, parse_store_op(&depth.store)?);
                attachment.clear = depth.clear.as_ref().map(|c| ClearValue::DepthStencil {
                    depth: c.depth,
                    stencil: c.stencil.unwrap_or(0),
                });
                attachment.read_only = depth.read_only;
                attachment.slice = ImageSlice {
                    mip: depth.slice.mip.unwrap_or(0),
                    base_layer: depth.slice.base_layer.unwrap_or(0),
                    layer_count: depth.slice.layer_count.unwrap_or(1),
                };
                builder = builder.set_depth_attachment(attachment);
            }

            for read in &pass.reads {
                let (binding, array_index) = resolve_use(read, i)?;
                let target = read.image.as_deref().or(read.buffer.as_deref()).unwrap_or_default();
                let handle = lookup(&declared, target)?;
                let access = parse_access(&read.access)?;
                builder = if read.image.is_some() {
                    builder.read_image(handle, access, binding, array_index)
                } else {
                    builder.read_buffer(handle, access, binding)
                };
            }
            for write in &pass.writes {
                let (binding, array_index) = resolve_use(write, i)?;
                let target = write.image.as_deref().or(write.buffer.as_deref()).unwrap_or_default();
                let handle = lookup(&declared, target)?;
                let access = parse_access(&write.access)?;
                builder = if write.image.is_some() {
                    builder.write_image(handle, access, binding, array_index)
                } else {
                    builder.write_buffer(handle, access, binding)
                };
            }

            builder.set_execute(execute, user_data);
        }
    }

    if let Some(present) = &description.outputs.present {
        if let Some(&handle) = declared.get(present) {
            graph.set_present_image(handle);
        }
    }
    for name in &description.outputs.export_images {
        if let Some(&handle) = declared.get(name) {
            graph.export_image(handle, Access::Present, crate::render_graph::barrier::ImageLayout::PresentSrc);
        }
    }
    for name in &description.outputs.export_buffers {
        if let Some(&handle) = declared.get(name) {
            graph.export_buffer(handle, Access::ShaderStorageRead);
        }
    }

    Ok(())
}

fn resolve_use(use_desc: &ResourceUseDesc, pass_index: u32) -> Result<(u32, u32)> {
    let binding = use_desc.binding.unwrap_or(0);
    let array_index = match &use_desc.array_index {
        None => 0,
        Some(ArrayIndexDesc::Int(v)) => *v,
        Some(ArrayIndexDesc::Template(token)) => {
            if token == "${i}" {
                pass_index
            } else {
                token
                    .parse()
                    .map_err(|_| EngineError::InvalidParameter(format!("unresolvable array_index token '{token}'")))?
            }
        }
    };
    Ok((binding, array_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::backend::NullBackend;
    use crate::render_graph::pass::ExecuteContext;
    use crate::render_graph::RenderGraph;

    fn noop_execute(_ctx: &mut ExecuteContext, _user_data: usize) {}

    fn test_frame_info(shadow_cascade_count: u32) -> FrameInfo {
        FrameInfo {
            window_width: 1920,
            window_height: 1080,
            viewport_width: 1920,
            viewport_height: 1080,
            swapchain_color_format: "B8G8R8A8_UNORM".into(),
            swapchain_depth_format: "D32_SFLOAT".into(),
            swapchain_image_count: 2,
            swapchain_image_index: 0,
            shadow_map_size: 2048,
            shadow_cascade_count,
            editor_enabled: false,
        }
    }

    #[test]
    fn scenario_8_template_expansion_produces_one_instance_per_repeat_count() {
        let json = r#"{
            "version": 1,
            "name": "shadow_test",
            "resources": [
                {
                    "name": "shadow_${i}",
                    "type": "buffer",
                    "repeat": { "count_source": "shadow_cascade_count" },
                    "usage": ["STORAGE_BUFFER"],
                    "size": 1024
                }
            ],
            "passes": [
                {
                    "name": "shadow_pass_${i}",
                    "type": "compute",
                    "repeat": { "count_source": "shadow_cascade_count" },
                    "flags": ["NO_CULL"],
                    "writes": [
                        { "buffer": "shadow_${i}", "access": "shader_storage_write" }
                    ],
                    "execute": "noop"
                }
            ],
            "outputs": {}
        }"#;

        let description = RenderGraphDescription::from_json(json).unwrap();
        let loader = GraphDescriptionLoader::new(description);
        let mut executors = ExecutorRegistry::new();
        executors.register("noop", noop_execute, 0);

        let mut graph = RenderGraph::new(2);
        let frame_info = test_frame_info(3);
        graph.begin_frame(frame_info.clone());
        loader.build(&mut graph, &frame_info, &executors).unwrap();

        let mut backend = NullBackend::default();
        graph.compile(&mut backend).unwrap();

        assert_eq!(graph.execution_order().len(), 3);
        let names: Vec<&str> = graph.execution_order().iter().map(|&i| graph.pass_name(i)).collect();
        assert_eq!(names, vec!["shadow_pass_0", "shadow_pass_1", "shadow_pass_2"]);
    }

    #[test]
    fn unknown_executor_token_fails_build() {
        let json = r#"{
            "version": 1,
            "name": "bad",
            "resources": [],
            "passes": [
                { "name": "p", "type": "compute", "writes": [], "reads": [], "execute": "missing_token" }
            ],
            "outputs": {}
        }"#;
        let description = RenderGraphDescription::from_json(json).unwrap();
        let loader = GraphDescriptionLoader::new(description);
        let executors = ExecutorRegistry::new();
        let mut graph = RenderGraph::new(2);
        let frame_info = test_frame_info(3);
        graph.begin_frame(frame_info.clone());
        assert!(loader.build(&mut graph, &frame_info, &executors).is_err());
    }
}
