//! Per-frame information the application hands the render graph: window and
//! swapchain geometry, shadow configuration, and editor state (`spec.md`
//! §4.6.1, §6 `extent.size_source`/`layers_source`).

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub window_width: u32,
    pub window_height: u32,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub swapchain_color_format: String,
    pub swapchain_depth_format: String,
    pub swapchain_image_count: u32,
    pub swapchain_image_index: u32,
    pub shadow_map_size: u32,
    pub shadow_cascade_count: u32,
    pub editor_enabled: bool,
}

impl FrameInfo {
    /// Resolves a declarative description's `repeat.count_source` or
    /// `extent.size_source`/`layers_source` token against this frame's
    /// named fields (`spec.md` §6).
    pub fn resolve_named_field(&self, name: &str) -> Option<u32> {
        match name {
            "shadow_cascade_count" => Some(self.shadow_cascade_count),
            "shadow_map_size" => Some(self.shadow_map_size),
            "window_width" => Some(self.window_width),
            "window_height" => Some(self.window_height),
            "viewport_width" => Some(self.viewport_width),
            "viewport_height" => Some(self.viewport_height),
            "swapchain_image_count" => Some(self.swapchain_image_count),
            _ => None,
        }
    }

    pub fn condition_holds(&self, condition: &str) -> bool {
        match condition {
            "editor_enabled" => self.editor_enabled,
            "!editor_enabled" => !self.editor_enabled,
            _ => true,
        }
    }
}
