//! Network side of the client: connect, retry, read lines, send commands

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::net::protocol::{ClientMsg, LineReader, ReadError, ServerEvent, ServerLineDecoder};

use super::{ClientCommand, ClientError, ClientEvent};

/// Opens transports to the game server
#[async_trait]
pub trait Connector: Send + Sync {
    type Stream: AsyncRead + AsyncWrite + Send + 'static;

    async fn connect(&self) -> io::Result<Self::Stream>;
}

/// Plain TCP connector
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }
}

/// Bounded retry policy used for the first connection and every reconnect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// How one connection ended
#[derive(Debug, PartialEq, Eq)]
enum Ended {
    Quit,
    PlayAgain,
    /// Transport failed before the round finished
    Lost,
}

/// The client's network unit of execution
pub struct ClientConnection<C> {
    connector: C,
    policy: ReconnectPolicy,
    name: String,
    events: mpsc::UnboundedSender<ClientEvent>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
}

impl<C: Connector> ClientConnection<C> {
    pub fn new(
        connector: C,
        policy: ReconnectPolicy,
        name: impl Into<String>,
        events: mpsc::UnboundedSender<ClientEvent>,
        commands: mpsc::UnboundedReceiver<ClientCommand>,
    ) -> Self {
        Self {
            connector,
            policy,
            name: name.into(),
            events,
            commands,
        }
    }

    /// Run until the user quits or every connection attempt fails
    pub async fn run(mut self) -> Result<(), ClientError> {
        loop {
            let stream = match self.connect_with_retry().await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = self.events.send(ClientEvent::ConnectionFailed {
                        attempts: self.policy.max_attempts,
                    });
                    return Err(e);
                }
            };

            match self.drive(stream).await {
                Ended::Quit => {
                    info!("Client quitting");
                    return Ok(());
                }
                Ended::PlayAgain => {
                    info!("Requeueing for another round");
                }
                Ended::Lost => {
                    warn!("Connection lost mid-round");
                    let _ = self.events.send(ClientEvent::ConnectionLost);
                }
            }
        }
    }

    /// Try to connect, at most `max_attempts` times with a fixed delay between tries
    async fn connect_with_retry(&self) -> Result<C::Stream, ClientError> {
        let max_attempts = self.policy.max_attempts;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let _ = self.events.send(ClientEvent::Reconnecting {
                    attempt,
                    max_attempts,
                });
                tokio::time::sleep(self.policy.delay).await;
            }

            match self.connector.connect().await {
                Ok(stream) => {
                    info!(attempt, "Connected to game server");
                    return Ok(stream);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Connection attempt failed");
                }
            }
        }

        Err(ClientError::ReconnectExhausted {
            attempts: max_attempts,
        })
    }

    /// Handshake, then pump lines and commands until the connection ends
    async fn drive(&mut self, stream: C::Stream) -> Ended {
        let (read_half, mut write_half) = tokio::io::split(stream);
        let mut reader = LineReader::new(read_half);
        let mut decoder = ServerLineDecoder::new();
        let mut round_over = false;

        let handshake = ClientMsg::Handshake(self.name.clone());
        if let Err(e) = send(&mut write_half, &handshake).await {
            warn!(error = %e, "Failed to send handshake");
            return Ended::Lost;
        }
        let _ = self.events.send(ClientEvent::Connected);

        loop {
            tokio::select! {
                line = reader.next_line() => match line {
                    Ok(Some(line)) => {
                        debug!(line = %line, "Received line");
                        if let Some(event) = decoder.feed(&line) {
                            if matches!(event, ServerEvent::RoundResult { .. }) {
                                round_over = true;
                            }
                            let _ = self.events.send(ClientEvent::Server(event));
                        }
                    }
                    Ok(None) if round_over => {
                        debug!("Server closed the connection after the round");
                        return self.wait_after_round().await;
                    }
                    Ok(None) => return Ended::Lost,
                    Err(ReadError::Protocol(e)) => {
                        warn!(error = %e, "Skipping malformed server line");
                    }
                    Err(ReadError::Io(e)) => {
                        warn!(error = %e, "Connection read failed");
                        return if round_over { self.wait_after_round().await } else { Ended::Lost };
                    }
                },
                command = self.commands.recv() => match command {
                    Some(ClientCommand::Move(choice)) => {
                        if let Err(e) = send(&mut write_half, &ClientMsg::Move(choice)).await {
                            warn!(error = %e, "Failed to send move");
                            return Ended::Lost;
                        }
                    }
                    Some(ClientCommand::PlayAgain) => return Ended::PlayAgain,
                    Some(ClientCommand::Quit) | None => {
                        let _ = write_half.shutdown().await;
                        return Ended::Quit;
                    }
                },
            }
        }
    }

    /// Connection is gone but the round already finished; nothing to recover
    async fn wait_after_round(&mut self) -> Ended {
        loop {
            match self.commands.recv().await {
                Some(ClientCommand::PlayAgain) => return Ended::PlayAgain,
                Some(ClientCommand::Move(choice)) => {
                    debug!(%choice, "Dropping move, no round in progress");
                }
                Some(ClientCommand::Quit) | None => return Ended::Quit,
            }
        }
    }
}

async fn send<W: AsyncWrite>(writer: &mut WriteHalf<W>, msg: &ClientMsg) -> io::Result<()> {
    writer.write_all(msg.encode().as_bytes()).await?;
    writer.flush().await
}
