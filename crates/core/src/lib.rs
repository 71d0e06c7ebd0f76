//! # DeskPilot Core
//!
//! Domain types, traits, and error definitions for the DeskPilot agent.
//! This crate has **no framework dependencies**. It defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod collab;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use collab::{CalendarEvent, NewEvent, NewTask, Scheduler, Task, TaskManager};
pub use error::{CollaboratorError, Error, GatewayError, MemoryError, Result, ToolError};
pub use memory::{Memory, MemoryEntry, MemorySnippet};
pub use message::{Role, Turn};
pub use provider::{ChatRequest, ChatResponse, ChunkReceiver, ModelInfo, Provider, StreamChunk};
pub use tool::{ToolCall, ToolHandler, ToolRegistry};
