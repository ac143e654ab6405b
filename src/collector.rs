//! Collecting what a scenario's processes printed, and making sure they are gone afterwards.

use crate::config::Timeouts;
use crate::drain::{Captured, Drain};
use crate::error::CollectError;
use crate::process_handle::TargetProcess;
use crate::termination::terminate_all;
use std::path::Path;
use std::process::ExitStatus;

/// The result of a fully collected scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedOutput {
    pub client: Captured,
    pub client_status: ExitStatus,
    pub server: Captured,
    pub server_status: ExitStatus,
}

/// Writes `bytes` to `path`, replacing any previous content.
///
/// Missing parent directories are created.
pub async fn persist(path: &Path, bytes: &[u8]) -> Result<(), CollectError> {
    let to_err = |source| CollectError::Persist {
        path: path.to_owned(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(to_err)?;
    }
    tokio::fs::write(path, bytes).await.map_err(to_err)
}

/// Drains the client's output to end-of-stream, persists it as (lossily decoded) UTF-8 text,
/// then awaits both exits.
///
/// The server's output is only drained to keep it from blocking on a full pipe, and persisted
/// only if `server_output_path` is given.
///
/// Every wait is bounded by `timeouts`. On any error, both processes are terminated before the
/// error is returned, so nothing survives into the next scenario. On a drain timeout, the
/// partial output is still persisted to ease debugging.
pub async fn collect(
    client: &mut TargetProcess,
    client_drain: Drain,
    server: &mut TargetProcess,
    server_drain: Drain,
    output_path: &Path,
    server_output_path: Option<&Path>,
    timeouts: &Timeouts,
) -> Result<CollectedOutput, CollectError> {
    let result = collect_unguarded(
        client,
        client_drain,
        server,
        server_drain,
        output_path,
        server_output_path,
        timeouts,
    )
    .await;
    if result.is_err() {
        terminate_all(&mut [client, server], timeouts.kill_grace).await;
    }
    result
}

async fn collect_unguarded(
    client: &mut TargetProcess,
    client_drain: Drain,
    server: &mut TargetProcess,
    server_drain: Drain,
    output_path: &Path,
    server_output_path: Option<&Path>,
    timeouts: &Timeouts,
) -> Result<CollectedOutput, CollectError> {
    let captured = match client_drain.wait(timeouts.output_drain).await {
        Ok(captured) => captured,
        Err(err) => {
            if let CollectError::Timeout { partial, .. } = &err {
                if let Err(persist_err) = persist(output_path, partial).await {
                    tracing::warn!(error = %persist_err, "Could not persist partial output");
                }
            }
            return Err(err);
        }
    };
    persist(output_path, captured.text().as_bytes()).await?;
    tracing::debug!(
        process = %client.name,
        path = %output_path.display(),
        bytes = captured.total_bytes,
        "Persisted captured output"
    );

    let server_status = server.wait_for_exit(timeouts.process_exit).await?;
    let client_status = client.wait_for_exit(timeouts.process_exit).await?;

    let server_captured = server_drain.wait(timeouts.output_drain).await?;
    if let Some(path) = server_output_path {
        persist(path, server_captured.text().as_bytes()).await?;
    }

    Ok(CollectedOutput {
        client: captured,
        client_status,
        server: server_captured,
        server_status,
    })
}
