//! Serve command - host the background router on a Unix socket
//!
//! Each socket connection is one port. Frames are newline-delimited JSON in
//! both directions; a line that does not parse is answered with a
//! `PROTOCOL_ERROR` frame and the connection stays open.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use skiff_core::{silent_broadcaster, Config, InboundMessage, OutboundMessage, Router};
use skiff_github::ZipUploader;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::context::AppContext;

/// Pending inbound frames per connection before reading pauses
const INBOUND_BUFFER: usize = 32;

/// Host the background router on a Unix socket
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path (overrides config and env)
    #[arg(long)]
    pub socket: Option<PathBuf>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let ctx = AppContext::build(config, silent_broadcaster()).await?;
        let zip = ZipUploader::new(ctx.github.clone(), ctx.owner.clone(), config.clone());
        let router = Router::new(
            ctx.manager.clone(),
            Arc::new(zip),
            Arc::new(ctx.db.operations()),
            config.upload.default_commit_message.clone(),
        );

        // Pick up anything a previous run left behind
        ctx.manager.ensure_cleanup_scheduled();

        let server = SocketServer::bind(&config.server.resolved_socket_path()?)?;
        println!("Listening on {}", server.path().display());

        tokio::select! {
            result = server.run(router) => result?,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
            }
        }

        ctx.manager.stop_cleanup();
        Ok(())
    }
}

/// Unix socket listener that removes its socket file on drop
pub struct SocketServer {
    listener: UnixListener,
    path: PathBuf,
}

impl SocketServer {
    /// Bind `path`, replacing a stale socket file
    pub fn bind(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            debug!(path = %path.display(), "Removing stale socket file");
            let _ = std::fs::remove_file(path);
        }

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let listener = UnixListener::bind(path)
            .with_context(|| format!("Failed to bind {}", path.display()))?;

        // Owner-only
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!(path = %path.display(), "Router listening");
        Ok(Self {
            listener,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accept connections until the listener fails
    pub async fn run(&self, router: Router) -> anyhow::Result<()> {
        loop {
            let (stream, _) = self.listener.accept().await.map_err(|e| {
                error!(error = %e, "Failed to accept connection");
                e
            })?;
            let router = router.clone();
            tokio::spawn(async move {
                serve_stream(router, stream).await;
            });
        }
    }
}

impl Drop for SocketServer {
    fn drop(&mut self) {
        if self.path.exists() {
            debug!(path = %self.path.display(), "Removing socket file");
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Bridge one socket connection onto a router port
async fn serve_stream(router: Router, stream: UnixStream) {
    let (read_half, mut write_half) = stream.into_split();
    let (in_tx, in_rx) = mpsc::channel::<InboundMessage>(INBOUND_BUFFER);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<OutboundMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let line = match message.to_json() {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to encode outbound frame");
                    continue;
                }
            };
            if write_half.write_all(line.as_bytes()).await.is_err()
                || write_half.write_all(b"\n").await.is_err()
            {
                debug!("Socket closed while writing");
                break;
            }
        }
    });

    let errors = out_tx.clone();
    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match InboundMessage::from_json(&line) {
                    Ok(message) => {
                        if in_tx.send(message).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "Rejected inbound frame");
                        let _ = errors.send(OutboundMessage::ProtocolError {
                            message: e.to_string(),
                        });
                    }
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "Socket read failed");
                    break;
                }
            }
        }
    });

    router.serve_connection("socket", None, in_rx, out_tx).await;
    let _ = reader.await;
    let _ = writer.await;
}
