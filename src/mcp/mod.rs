// MCP (Model Context Protocol) adapter over stdio

pub mod server;
pub mod tools;

pub use server::McpServer;
