//! TCP command server
//!
//! One task per client connection. Commands are read a line at a time and
//! answered with a newline-terminated reply; `watch` commands take over the
//! connection until their session ends.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;

use herder_core::prelude::*;
use herder_daemon::{Connection, LineConnection, Registry};

use crate::commands::{dispatch, Command, Reply};
use crate::config::Settings;

/// State shared by every connection
#[derive(Debug, Clone)]
pub struct ServerState {
    pub registry: Registry,
    pub settings: Arc<Settings>,
}

impl ServerState {
    pub fn new(settings: Settings) -> Self {
        Self {
            registry: Registry::new(),
            settings: Arc::new(settings),
        }
    }
}

/// Accept connections on `listener` forever
pub async fn serve(listener: TcpListener, state: ServerState) -> Result<()> {
    info!("Listening on {}", listener.local_addr()?);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };
        debug!("Connection from {}", peer);

        let state = state.clone();
        tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            let mut conn = LineConnection::new(BufReader::new(reader), writer);
            if let Err(e) = handle_connection(&mut conn, &state).await {
                debug!("Connection from {} ended with error: {}", peer, e);
            }
            debug!("Connection from {} closed", peer);
        });
    }
}

/// Serve commands on one connection until EOF or `quit`
pub async fn handle_connection<R, W>(
    conn: &mut LineConnection<R, W>,
    state: &ServerState,
) -> Result<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    while let Some(line) = conn.next_line().await? {
        let reply = match Command::parse(&line) {
            Ok(None) => continue,
            Ok(Some(command)) => {
                debug!("Command: {}", line);
                dispatch(command, state, conn).await
            }
            Err(e) => Err(e),
        };

        let text = match reply {
            Ok(Reply::Close) => break,
            Ok(Reply::Text(text)) => text,
            Err(e) => {
                if !e.is_recoverable() {
                    return Err(e);
                }
                if e.is_config_error() {
                    debug!("Rejected process definition: {}", e);
                } else {
                    warn!("Command failed: {}", e);
                }
                format!("Error: {e}")
            }
        };
        conn.send(format!("{text}\n").as_bytes()).await?;
    }
    Ok(())
}
