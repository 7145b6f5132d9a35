//! File tools, all routed through the security gate: reads resolve under
//! the input/output/log directories, writes under output/log only.

use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::CallToolResult;
use rmcp::{ErrorData as McpError, schemars, tool, tool_router};
use serde::Deserialize;
use serde_json::json;

use super::RelayServer;
use super::support::{clip_chars, internal};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadTextArgs {
    /// File to read (inside an allowed directory).
    pub path: String,
    #[serde(default)]
    pub max_chars: Option<u64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteTextArgs {
    /// Destination file (inside the output or log directory).
    pub path: String,
    pub content: String,
    /// Append instead of overwriting.
    #[serde(default)]
    pub append: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListDirArgs {
    /// Directory to list (inside an allowed directory).
    pub path: String,
}

#[tool_router(router = files_router, vis = "pub(crate)")]
impl RelayServer {
    #[tool(name = "files.read_text", description = "Read a text file from an allowed directory.")]
    pub async fn read_text(
        &self,
        Parameters(args): Parameters<ReadTextArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("files.read_text", async |relay| {
            let source = relay.security.resolve_read(std::path::Path::new(&args.path))?;
            let content = tokio::fs::read_to_string(&source).await.map_err(|e| {
                crate::envelope::error::ToolError::not_found(format!(
                    "cannot read {}: {e}",
                    source.display()
                ))
            })?;
            let max_chars = args.max_chars.unwrap_or(20_000) as usize;
            Ok(json!({
                "path": source.display().to_string(),
                "totalChars": content.chars().count(),
                "content": clip_chars(&content, max_chars),
            }))
        })
        .await
    }

    #[tool(name = "files.write_text", description = "Write a text file inside the output or log directory.")]
    pub async fn write_text(
        &self,
        Parameters(args): Parameters<WriteTextArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("files.write_text", async |relay| {
            let target = relay.security.resolve_write(std::path::Path::new(&args.path))?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await.map_err(internal)?;
            }
            if args.append.unwrap_or(false) {
                use tokio::io::AsyncWriteExt;
                let mut file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&target)
                    .await
                    .map_err(internal)?;
                file.write_all(args.content.as_bytes()).await.map_err(internal)?;
            } else {
                tokio::fs::write(&target, args.content.as_bytes()).await.map_err(internal)?;
            }
            Ok(json!({
                "status": "written",
                "path": target.display().to_string(),
                "bytes": args.content.len(),
            }))
        })
        .await
    }

    #[tool(name = "files.list_dir", description = "List a directory inside an allowed directory.")]
    pub async fn list_dir(
        &self,
        Parameters(args): Parameters<ListDirArgs>,
    ) -> Result<CallToolResult, McpError> {
        self.relay.run_tool("files.list_dir", async |relay| {
            let dir = relay.security.resolve_read(std::path::Path::new(&args.path))?;
            let mut reader = tokio::fs::read_dir(&dir).await.map_err(|e| {
                crate::envelope::error::ToolError::not_found(format!(
                    "cannot list {}: {e}",
                    dir.display()
                ))
            })?;
            let mut entries = Vec::new();
            while let Some(entry) = reader.next_entry().await.map_err(internal)? {
                let metadata = entry.metadata().await.map_err(internal)?;
                entries.push(json!({
                    "name": entry.file_name().to_string_lossy(),
                    "kind": if metadata.is_dir() { "dir" } else { "file" },
                    "size": metadata.len(),
                }));
            }
            entries.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
            Ok(json!({
                "path": dir.display().to_string(),
                "count": entries.len(),
                "entries": entries,
            }))
        })
        .await
    }
}
