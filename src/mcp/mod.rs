// ABOUTME: Migration Control Protocol: tool dispatch server and its HTTP client
// ABOUTME: Three named tools behind one uniform request/response envelope

pub mod client;
pub mod models;
pub mod server;
pub mod tools;

pub use client::{parse_metadata, McpClient, DEFAULT_MCP_PORT};
pub use models::{ToolCallRequest, ToolCallResult};
pub use server::{router, serve};
pub use tools::{MetadataCapability, ToolName, ToolRegistry, TransferCapability};
