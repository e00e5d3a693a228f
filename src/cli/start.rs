use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use super::{absolute_project, analyze_with_bar};
use crate::indexer::{AnalyzeOptions, Indexer};
use crate::mcp::McpServer;

/// Start the MCP server, optionally indexing a project first
pub async fn start_server(indexer: Indexer, project: Option<String>, rebuild: bool) -> Result<()> {
    let indexer = Arc::new(indexer);

    if let Some(project) = project {
        let project_path = absolute_project(&project)?;
        info!("Initial analysis of {}", project_path);

        let options = AnalyzeOptions {
            force_reindex: rebuild,
            ..AnalyzeOptions::new(project_path)
        };
        match analyze_with_bar(&indexer, &options).await {
            Ok(summary) => eprintln!(
                "Index ready: {} files, {} symbols, {} routes{}",
                summary.total_files,
                summary.total_methods,
                summary.total_paths,
                if summary.from_cache { " (cached)" } else { "" }
            ),
            Err(e) => warn!("Initial analysis failed, continuing without an index: {:#}", e),
        }
    }

    if indexer.config().mcp.transport != "stdio" {
        anyhow::bail!("Unsupported MCP transport: {}", indexer.config().mcp.transport);
    }

    eprintln!("tsgraph {} listening for MCP requests on stdio", env!("CARGO_PKG_VERSION"));
    McpServer::new(indexer).run().await
}
