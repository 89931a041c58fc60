//! Arena allocator, archetype ECS, async job system, and data-driven render
//! graph for a Vulkan-oriented real-time renderer.

pub mod containers;
pub mod ecs;
pub mod error;
pub mod event_bus;
pub mod frame;
pub mod jobs;
pub mod memory;
pub mod render_graph;

pub use error::{EngineError, Result};
