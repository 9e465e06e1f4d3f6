//! Terminal client
//!
//! The console is the interactive loop: it reads commands from stdin and
//! renders [`UiUpdate`]s, while the network task runs separately and only
//! talks to it through channels.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rps_game_server::client::{
    ClientConnection, ClientController, RoundOutcome, TcpConnector, UiUpdate,
};
use rps_game_server::config::ClientConfig;
use rps_game_server::game::Choice;
use rps_game_server::net::protocol::normalize_name;

const HELP: &str = "Commands: rock | paper | scissors (or r/p/s), again, quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env()?;
    init_tracing(&config.log_level);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    let name = match &config.player_name {
        Some(name) => normalize_name(name),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(b"Enter your name: ").await?;
            stdout.flush().await?;
            normalize_name(&stdin.next_line().await?.unwrap_or_default())
        }
    };

    info!(server = %config.server_addr(), name = %name, "Starting client");

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let connection = ClientConnection::new(
        TcpConnector::new(config.server_addr()),
        config.reconnect_policy(),
        name.clone(),
        event_tx,
        command_rx,
    );
    let network = tokio::spawn(connection.run());

    let mut controller =
        ClientController::new(name, command_tx).with_round_secs(config.round_secs);
    println!("{HELP}");

    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                for update in controller.handle_event(event) {
                    render(&update);
                }
                if controller.has_failed() {
                    break;
                }
            }
            line = stdin.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if !handle_input(&mut controller, line.trim()) {
                            break;
                        }
                    }
                    _ => {
                        controller.quit();
                        break;
                    }
                }
            }
        }
    }

    // The network task's own error was already reported as a UI update
    if let Ok(Err(e)) = network.await {
        info!(error = %e, "Network task stopped");
    }
    Ok(())
}

/// Apply one console command; false means quit
fn handle_input(controller: &mut ClientController, input: &str) -> bool {
    let result = match input.to_ascii_lowercase().as_str() {
        "" => return true,
        "quit" | "q" | "exit" => {
            controller.quit();
            return false;
        }
        "again" | "a" => controller.play_again(),
        "r" => controller.submit_move(Choice::Rock),
        "p" => controller.submit_move(Choice::Paper),
        "s" => controller.submit_move(Choice::Scissors),
        other => match other.parse::<Choice>() {
            Ok(choice) => controller.submit_move(choice),
            Err(_) => {
                println!("{HELP}");
                return true;
            }
        },
    };

    match result {
        Ok(updates) => updates.iter().for_each(render),
        Err(_) => println!("That is not possible right now."),
    }
    true
}

fn render(update: &UiUpdate) {
    match update {
        UiUpdate::Status(text) => println!("{text}"),
        UiUpdate::MovesEnabled(true) => println!("Make your move: rock, paper or scissors"),
        UiUpdate::MovesEnabled(false) => {}
        UiUpdate::Opponent(name) => println!("Opponent: {name}"),
        UiUpdate::Result {
            opponent,
            outcome,
            reveal,
            text,
        } => {
            if let Some(reveal) = reveal {
                println!("{}", reveal.line());
            }
            println!("Opponent: {opponent}");
            println!("{text}");
            let summary = match outcome {
                RoundOutcome::Won => "You won!",
                RoundOutcome::Lost => "You lost.",
                RoundOutcome::Draw => "Nobody won this time.",
                RoundOutcome::Aborted => "The round was cancelled.",
            };
            println!("{summary} Type 'again' to play another round or 'quit' to leave.");
        }
        UiUpdate::Fatal(text) => eprintln!("{text}"),
    }
}

/// Initialize tracing on stderr so the console on stdout stays readable
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .init();
}
