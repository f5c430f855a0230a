//! Interactive terminal client.

use std::sync::Arc;

use rustyline::{DefaultEditor, error::ReadlineError};
use tokio::sync::{broadcast, mpsc};

use crate::{
    config::ClientConfig,
    domain::{Identity, Role},
    infrastructure::{api::HttpChatApi, transport::ConnectionManager},
    usecase::{ChatSession, SessionUpdate},
};

use super::{
    command::{self, Command, HELP},
    error::StartupError,
    formatter::UpdateFormatter,
    prompt::{prompt_for, redisplay_prompt},
};

/// Everything needed to start an interactive session
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub identity: Identity,
    pub token: Option<String>,
    /// Customer display name sent when ensuring the own room
    pub display_name: Option<String>,
    pub config: ClientConfig,
}

/// Run the interactive client until the user quits
pub async fn run_client(options: RunOptions) -> Result<(), StartupError> {
    let RunOptions {
        identity,
        token,
        display_name,
        config,
    } = options;
    let token = token
        .filter(|token| !token.trim().is_empty())
        .ok_or(StartupError::MissingToken)?;

    let manager = Arc::new(ConnectionManager::new(&config.ws_url, config.reconnect));
    let api = Arc::new(HttpChatApi::new(&config.api_url, &token, identity.role));
    let session = ChatSession::new(identity.clone(), manager.clone(), api, config.session);

    manager.connect(identity.clone(), Some(&token));
    session.attach(manager.as_ref());
    session.watch_connection(manager.watch_state());

    let prompt = prompt_for(&identity);
    let printer = tokio::spawn(print_updates(session.updates(), identity.clone(), prompt.clone()));

    println!(
        "\nYou are '{}' ({}). Type /help for commands. Press Ctrl+C to exit.\n",
        identity.id, identity.role
    );

    if identity.role == Role::Customer {
        let name = display_name.unwrap_or_else(|| identity.id.to_string());
        session.open_own_room(&name).await;
    }

    let mut input_rx = spawn_readline(prompt.clone());
    while let Some(line) = input_rx.recv().await {
        match command::parse(&line) {
            Ok(Command::Quit) => break,
            Ok(command) => execute(&session, command).await,
            Err(e) => {
                println!("{}", e);
                redisplay_prompt(&prompt);
            }
        }
    }

    tracing::info!("Client session ended normally");
    session.close();
    manager.disconnect();
    printer.abort();
    Ok(())
}

async fn execute(session: &ChatSession, command: Command) {
    match command {
        Command::Join(room_id) => session.select_room(room_id).await,
        Command::Leave => session.leave_room(),
        Command::Focus => session.focus_regained(),
        Command::Reply { to, content } => {
            session.input_changed(&content);
            session.send_message(&content, Some(to));
        }
        Command::Send(content) => {
            // Input is line-based, so a submitted line is one whole typing burst.
            session.input_changed(&content);
            if !session.send_message(&content, None) {
                println!("(not sent: join a room and wait for the connection)");
            }
        }
        Command::Help => println!("{}", HELP),
        Command::Quit => {}
    }
}

async fn print_updates(
    mut updates: broadcast::Receiver<SessionUpdate>,
    me: Identity,
    prompt: String,
) {
    loop {
        match updates.recv().await {
            Ok(update) => {
                if let Some(text) = UpdateFormatter::format_update(&update, &me) {
                    print!("{}", text);
                    redisplay_prompt(&prompt);
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Display fell behind; {} update(s) skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read lines on a blocking thread (rustyline is synchronous)
fn spawn_readline(prompt: String) -> mpsc::UnboundedReceiver<String> {
    let (input_tx, input_rx) = mpsc::unbounded_channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                tracing::error!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            match rl.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(line).ok();
                    if input_tx.send(line.to_string()).is_err() {
                        break;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    tracing::info!("Interrupted");
                    break;
                }
                Err(ReadlineError::Eof) => {
                    tracing::info!("EOF");
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    input_rx
}
