//! Per-connection handling for the line protocol

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::player::{Player, PlayerStatus, OUTBOX_CAPACITY};
use crate::game::session::{MoveOutcome, SessionError};
use crate::net::protocol::{
    decode_move, normalize_name, LineReader, ProtocolError, ReadError, ServerMsg,
};
use crate::util::rate_limit::LineRateLimiter;

/// How long the writer may keep flushing after the reader finished
const WRITER_GRACE: Duration = Duration::from_secs(1);

/// Why a connection's read loop stopped
#[derive(Debug)]
enum ConnectionEnd {
    Closed,
    Io(io::Error),
    Protocol(ProtocolError),
}

/// Accept connections until `shutdown` resolves, one task per connection
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> io::Result<()>
where
    F: Future<Output = ()>,
{
    info!("Game listener on {}", listener.local_addr()?);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        debug!(peer = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }
                    tokio::spawn(handle_connection(stream, peer, state.clone()));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            },
            _ = &mut shutdown => {
                info!("Game listener shutting down");
                break;
            }
        }
    }

    Ok(())
}

/// Drive one player connection from handshake to close
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, state: AppState)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let _guard = state.track_connection();
    info!(peer = %peer, "New connection");

    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = LineReader::new(read_half);

    let name = match timeout(state.config.handshake_timeout, reader.next_line()).await {
        Ok(Ok(Some(line))) => normalize_name(&line),
        Ok(Ok(None)) => {
            info!(peer = %peer, "Connection closed before handshake");
            return;
        }
        Ok(Err(e)) => {
            warn!(peer = %peer, error = %e, "Invalid handshake");
            return;
        }
        Err(_) => {
            warn!(peer = %peer, "Handshake timed out");
            return;
        }
    };

    let (outbox_tx, mut outbox_rx) = mpsc::channel::<ServerMsg>(OUTBOX_CAPACITY);
    let mut player = Player::new(name, outbox_tx);
    let player_id = player.id();

    info!(peer = %peer, player_id = %player_id, name = %player.name(), "Player connected");

    // Spawn writer task: outbox -> socket
    let mut writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbox_rx.recv().await {
            if let Err(e) = write_half.write_all(msg.encode().as_bytes()).await {
                debug!(player_id = %player_id, error = %e, "Socket write failed");
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    player.handle().send(ServerMsg::Waiting);
    match state.matchmaking.join_queue(player.handle().clone()) {
        Ok(Some(_)) => player.set_status(PlayerStatus::Matched),
        Ok(None) => player.set_status(PlayerStatus::Waiting),
        Err(e) => warn!(player_id = %player_id, error = %e, "Failed to join queue"),
    }

    let limiter = LineRateLimiter::new(state.config.max_line_rate);
    let end = read_loop(&mut player, &mut reader, &state, &limiter).await;

    match &end {
        ConnectionEnd::Closed => info!(player_id = %player_id, "Connection closed by peer"),
        ConnectionEnd::Io(e) => error!(player_id = %player_id, error = %e, "Connection read failed"),
        ConnectionEnd::Protocol(e) => {
            warn!(player_id = %player_id, error = %e, "Closing connection after protocol error")
        }
    }

    let departure = state.matchmaking.leave(player_id);
    debug!(player_id = %player_id, ?departure, "Player released");
    player.set_status(PlayerStatus::Disconnected);

    // The writer stops once every sender is gone; sessions drop theirs on disposal
    drop(player);
    if timeout(WRITER_GRACE, &mut writer_handle).await.is_err() {
        writer_handle.abort();
    }

    info!(peer = %peer, player_id = %player_id, "Connection finished");
}

/// Forward each inbound line to the player's session until the connection ends
async fn read_loop<R>(
    player: &mut Player,
    reader: &mut LineReader<R>,
    state: &AppState,
    limiter: &LineRateLimiter,
) -> ConnectionEnd
where
    R: AsyncRead + Unpin,
{
    let player_id = player.id();

    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return ConnectionEnd::Closed,
            Err(ReadError::Io(e)) => return ConnectionEnd::Io(e),
            Err(ReadError::Protocol(e)) => {
                if let Some(session) = state.matchmaking.session_for(player_id) {
                    session.forfeit(player_id);
                }
                return ConnectionEnd::Protocol(e);
            }
        };

        if !limiter.check_line() {
            warn!(player_id = %player_id, "Rate limited input line");
            continue;
        }

        debug!(player_id = %player_id, line = %line, "Received line");

        let Some(session) = state.matchmaking.session_for(player_id) else {
            warn!(
                player_id = %player_id,
                status = ?player.status(),
                "Line received outside a session, ignoring"
            );
            continue;
        };

        if player.status() == PlayerStatus::Waiting {
            player.set_status(PlayerStatus::Matched);
        }

        let choice = match decode_move(&line) {
            Ok(choice) => choice,
            Err(e) => {
                warn!(player_id = %player_id, session_id = %session.id(), error = %e, "Undecodable move");
                session.forfeit(player_id);
                return ConnectionEnd::Protocol(e);
            }
        };

        match session.submit_move(player_id, choice) {
            Ok(MoveOutcome::Recorded) | Ok(MoveOutcome::RoundComplete(_)) => {
                player.set_status(PlayerStatus::MoveSubmitted);
            }
            Err(e @ SessionError::DuplicateMove) | Err(e @ SessionError::NotAwaitingMoves(_)) => {
                warn!(player_id = %player_id, session_id = %session.id(), error = %e, "Move rejected");
            }
            Err(e) => {
                error!(player_id = %player_id, session_id = %session.id(), error = %e, "Move rejected");
            }
        }
    }
}
