//! Unix-socket endpoint for UI intents: one JSON intent per line in, one
//! JSON response per line out.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::host::{Host, Intent, IntentResponse};
use crate::sync::SyncError;

/// Accept connections until the listener fails.
pub async fn serve(host: Arc<Host>, socket_path: &Path) -> Result<(), SyncError> {
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Remove stale socket if exists
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await?;
    }

    let listener = UnixListener::bind(socket_path)?;
    log::info!("Listening on {}", socket_path.display());

    loop {
        let (stream, _) = listener.accept().await?;
        let host = host.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(host, stream).await {
                log::warn!("Connection error: {}", e);
            }
        });
    }
}

async fn handle_connection(host: Arc<Host>, stream: UnixStream) -> Result<(), SyncError> {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Intent>(&line) {
            Ok(intent) => host.handle(intent).await,
            Err(e) => {
                log::warn!("Bad intent {:?}: {}", line, e);
                IntentResponse { ok: false }
            }
        };
        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        write.write_all(out.as_bytes()).await?;
    }
    Ok(())
}

/// Forward one intent to a running daemon.
pub async fn send_intent(socket_path: &Path, intent: &Intent) -> Result<IntentResponse, SyncError> {
    let stream = UnixStream::connect(socket_path).await?;
    let (read, mut write) = stream.into_split();

    let mut line = serde_json::to_string(intent)?;
    line.push('\n');
    write.write_all(line.as_bytes()).await?;
    write.shutdown().await?;

    let reply = BufReader::new(read)
        .lines()
        .next_line()
        .await?
        .ok_or_else(|| SyncError::Decode("daemon closed without a response".into()))?;
    serde_json::from_str(&reply).map_err(|e| SyncError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClerkConfig;
    use crate::store::MemoryStore;
    use crate::sync::badge::LogPresenter;
    use crate::sync::tabs::StaticTabSource;

    #[tokio::test]
    async fn round_trips_intents_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("clerk.sock");
        let host = Host::new(
            ClerkConfig::default(),
            MemoryStore::new(),
            Arc::new(StaticTabSource::default()),
            Arc::new(LogPresenter::default()),
        );

        let server = {
            let socket = socket.clone();
            tokio::spawn(async move { serve(host, &socket).await })
        };
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        // Unpaired: dismiss is still a valid, successful request.
        let resp = send_intent(&socket, &Intent::DismissAction { id: "x".into() })
            .await
            .unwrap();
        assert!(resp.ok);

        server.abort();
    }
}
