//! Stdio transport for the MCP server.
//!
//! Wires [`CoderServer`] to stdin/stdout for direct invocation by an agent
//! host. Logging must therefore stay on stderr.

use rmcp::service::ServiceExt;
use rmcp::transport::io::stdio;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::handler::CoderServer;
use crate::{AppError, Result};

/// Serve the MCP server over stdio until the client disconnects or the
/// cancellation token fires.
///
/// # Errors
///
/// Returns `AppError::Config` if the transport fails to initialize.
pub async fn serve_stdio(server: CoderServer, ct: CancellationToken) -> Result<()> {
    let transport = stdio();

    info!("starting stdio MCP transport");
    let service = server
        .serve_with_ct(transport, ct)
        .await
        .map_err(|err| AppError::Config(format!("stdio transport failed: {err}")))?;

    service
        .waiting()
        .await
        .map_err(|err| AppError::Config(format!("stdio service error: {err}")))?;

    info!("stdio MCP transport shut down");
    Ok(())
}
