//! Client network task against a real server and a dead port

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rps_game_server::app::AppState;
use rps_game_server::client::{
    ClientCommand, ClientConnection, ClientController, ClientError, ClientEvent, ClientState,
    Connector, ReconnectPolicy, RoundOutcome, TcpConnector, UiUpdate,
};
use rps_game_server::config::Config;
use rps_game_server::game::Choice;
use rps_game_server::net;
use rps_game_server::net::protocol::MoveReveal;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Counts attempts on top of a real TCP connector
struct CountingConnector {
    inner: TcpConnector,
    attempts: Arc<AtomicU32>,
}

#[async_trait]
impl Connector for CountingConnector {
    type Stream = TcpStream;

    async fn connect(&self) -> io::Result<TcpStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.inner.connect().await
    }
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(20),
    }
}

async fn start_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = AppState::new(Config::default());
    tokio::spawn(net::serve(listener, state, std::future::pending()));
    addr
}

struct TestClient {
    controller: ClientController,
    events: mpsc::UnboundedReceiver<ClientEvent>,
    task: tokio::task::JoinHandle<Result<(), ClientError>>,
}

impl TestClient {
    fn start(addr: SocketAddr, name: &str) -> Self {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let connection = ClientConnection::new(
            TcpConnector::new(addr.to_string()),
            fast_policy(),
            name,
            event_tx,
            command_rx,
        );
        Self {
            controller: ClientController::new(name, command_tx),
            events,
            task: tokio::spawn(connection.run()),
        }
    }

    /// Feed events to the controller until it reaches `state`
    async fn until(&mut self, state: ClientState) -> Vec<UiUpdate> {
        let mut updates = Vec::new();
        while self.controller.state() != state {
            let event = timeout(Duration::from_secs(5), self.events.recv())
                .await
                .expect("timed out waiting for an event")
                .expect("network task ended");
            updates.extend(self.controller.handle_event(event));
        }
        updates
    }
}

#[tokio::test]
async fn test_two_clients_play_a_round() {
    let addr = start_server().await;
    let mut alice = TestClient::start(addr, "Alice");
    alice.until(ClientState::WaitingForOpponent).await;
    let mut bob = TestClient::start(addr, "Bob");

    alice.until(ClientState::ChoosingMove).await;
    bob.until(ClientState::ChoosingMove).await;
    assert_eq!(alice.controller.opponent(), Some("Bob"));
    assert_eq!(bob.controller.opponent(), Some("Alice"));

    alice.controller.submit_move(Choice::Scissors).unwrap();
    bob.controller.submit_move(Choice::Paper).unwrap();

    let updates = alice.until(ClientState::RoundOver).await;
    assert!(updates.contains(&UiUpdate::Result {
        opponent: "Bob".into(),
        outcome: RoundOutcome::Won,
        reveal: Some(MoveReveal {
            yours: Choice::Scissors,
            theirs: Choice::Paper,
        }),
        text: "Alice wins!".into(),
    }));

    let updates = bob.until(ClientState::RoundOver).await;
    assert!(updates.contains(&UiUpdate::Result {
        opponent: "Alice".into(),
        outcome: RoundOutcome::Lost,
        reveal: Some(MoveReveal {
            yours: Choice::Paper,
            theirs: Choice::Scissors,
        }),
        text: "Alice wins!".into(),
    }));

    alice.controller.quit();
    bob.controller.quit();
    assert!(alice.task.await.unwrap().is_ok());
    assert!(bob.task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_play_again_requeues() {
    let addr = start_server().await;
    let mut alice = TestClient::start(addr, "Alice");
    alice.until(ClientState::WaitingForOpponent).await;
    let mut bob = TestClient::start(addr, "Bob");
    alice.until(ClientState::ChoosingMove).await;
    bob.until(ClientState::ChoosingMove).await;

    alice.controller.submit_move(Choice::Rock).unwrap();
    bob.controller.submit_move(Choice::Rock).unwrap();
    alice.until(ClientState::RoundOver).await;
    bob.until(ClientState::RoundOver).await;

    alice.controller.play_again().unwrap();
    bob.controller.play_again().unwrap();

    alice.until(ClientState::ChoosingMove).await;
    bob.until(ClientState::ChoosingMove).await;
    assert_eq!(alice.controller.opponent(), Some("Bob"));

    alice.controller.quit();
    bob.controller.quit();
}

#[tokio::test]
async fn test_no_fourth_attempt() {
    // Reserve a port, then close it so every connect is refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let attempts = Arc::new(AtomicU32::new(0));
    let connector = CountingConnector {
        inner: TcpConnector::new(addr.to_string()),
        attempts: attempts.clone(),
    };
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel::<ClientCommand>();

    let result = ClientConnection::new(connector, fast_policy(), "Alice", event_tx, command_rx)
        .run()
        .await;

    assert!(matches!(
        result,
        Err(ClientError::ReconnectExhausted { attempts: 3 })
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    let mut controller = ClientController::new("Alice", command_tx);
    let mut fatal = false;
    while let Ok(event) = event_rx.try_recv() {
        for update in controller.handle_event(event) {
            fatal |= matches!(update, UiUpdate::Fatal(_));
        }
    }
    assert!(fatal);
    assert!(controller.has_failed());
}
