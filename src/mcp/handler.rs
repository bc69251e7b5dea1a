//! MCP server handler and tool router.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::{
    tool::{ToolCallContext, ToolRoute, ToolRouter},
    ServerHandler,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ListToolsResult, PaginatedRequestParam,
    ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::info_span;

use crate::mcp::context::ToolContext;
use crate::mcp::tools::{files, python_exec, report_issue, save_code, todo_write};

/// Optional tool groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolOptions {
    /// Expose `todo_write`.
    pub todo: bool,
    /// Expose `read_file`, `write_file`, `list_files`, `delete_file`.
    pub file_tools: bool,
}

/// MCP server exposing the coding tool surface.
pub struct CoderServer {
    context: Arc<ToolContext>,
    options: ToolOptions,
}

impl CoderServer {
    /// Create a server over a shared tool context.
    #[must_use]
    pub fn new(context: Arc<ToolContext>, options: ToolOptions) -> Self {
        Self { context, options }
    }

    /// Shared tool context.
    #[must_use]
    pub fn context(&self) -> &ToolContext {
        &self.context
    }

    /// Enabled optional tool groups.
    #[must_use]
    pub fn options(&self) -> ToolOptions {
        self.options
    }

    fn tool_router(&self) -> ToolRouter<Self> {
        let mut router = ToolRouter::new();

        for tool in self.enabled_tools() {
            let name = tool.name.to_string();
            match name.as_str() {
                python_exec::NAME => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(python_exec::handle(context))
                })),
                save_code::NAME => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(save_code::handle(context))
                })),
                report_issue::NAME => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(report_issue::handle(context))
                })),
                todo_write::NAME => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(todo_write::handle(context))
                })),
                files::READ_FILE => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(files::handle_read(context))
                })),
                files::WRITE_FILE => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(files::handle_write(context))
                })),
                files::LIST_FILES => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(files::handle_list(context))
                })),
                files::DELETE_FILE => router.add_route(ToolRoute::new_dyn(tool, |context| {
                    Box::pin(files::handle_delete(context))
                })),
                _ => {}
            }
        }

        router
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    /// Tools advertised to the client, honouring [`ToolOptions`].
    #[must_use]
    pub fn enabled_tools(&self) -> Vec<Tool> {
        let mut tools = Self::core_tools();
        if self.options.todo {
            tools.push(Self::todo_tool());
        }
        if self.options.file_tools {
            tools.extend(Self::file_tools());
        }
        tools
    }

    fn core_tools() -> Vec<Tool> {
        vec![
            Tool::new(
                python_exec::NAME,
                "Execute Python code in a persistent interpreter session. Variables, imports \
                 and definitions persist between calls. Returns JSON with success, stdout, \
                 result (value of the last expression), stderr and error; empty fields are \
                 omitted.",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "code": { "type": "string", "description": "Python code to execute" }
                    },
                    "required": ["code"]
                })),
            ),
            Tool::new(
                save_code::NAME,
                "Save the final solution code to <task>_code.py (or code.py for inline \
                 tasks) in the working directory.",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "code": { "type": "string", "description": "The complete Python code" }
                    },
                    "required": ["code"]
                })),
            ),
            Tool::new(
                report_issue::NAME,
                "Report an environment or specification issue (missing packages, unclear \
                 task, setup problems). Not for bugs in your own code.",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "text": { "type": "string", "description": "Description of the issue" }
                    },
                    "required": ["text"]
                })),
            ),
        ]
    }

    fn todo_tool() -> Tool {
        Tool::new(
            todo_write::NAME,
            "Replace the entire task list. Each task has id, content, status \
             (pending, in_progress, completed) and priority (high, medium, low). \
             At most one task may be in_progress.",
            Self::schema(serde_json::json!({
                "type": "object",
                "properties": {
                    "todos": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "id": { "type": "string" },
                                "content": { "type": "string" },
                                "status": { "type": "string", "enum": ["pending", "in_progress", "completed"] },
                                "priority": { "type": "string", "enum": ["high", "medium", "low"] }
                            },
                            "required": ["id", "content", "status", "priority"]
                        }
                    }
                },
                "required": ["todos"]
            })),
        )
    }

    fn file_tools() -> Vec<Tool> {
        let path_only = Self::schema(serde_json::json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string", "description": "Path relative to the working directory" }
            },
            "required": ["file_path"]
        }));
        vec![
            Tool::new(
                files::READ_FILE,
                "Read a file from the working directory.",
                Arc::clone(&path_only),
            ),
            Tool::new(
                files::WRITE_FILE,
                "Write content to a file in the working directory, creating parent \
                 directories as needed.",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "file_path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["file_path", "content"]
                })),
            ),
            Tool::new(
                files::LIST_FILES,
                "List files in the working directory matching a glob pattern \
                 (use ** to recurse).",
                Self::schema(serde_json::json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "default": "*" }
                    }
                })),
            ),
            Tool::new(
                files::DELETE_FILE,
                "Delete a file from the working directory.",
                path_only,
            ),
        ]
    }
}

impl ServerHandler for CoderServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Python coding tools backed by a persistent interpreter session. \
                 Use python_exec to run code; state carries over between calls."
                    .into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let router = self.tool_router();
        let _span = info_span!("call_tool", tool = %request.name).entered();

        async move {
            router
                .call(ToolCallContext::new(self, request, context))
                .await
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.enabled_tools())))
    }
}
