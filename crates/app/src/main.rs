use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;
use twin::chat::{
    ChatSession, ConversationStore, ExchangeOutcome, RetryOutcome, restore_conversation,
};
use twin::memory::{DEFAULT_QUERY_RESULTS, MemoryPanel};
use twin::settings::SettingsStore;
use twin_client::{H3State, HttpBackend};
use twin_storage::{HistoryStore, JsonHistoryStore};

const HELP: &str = "\
commands:
  /clear                 clear the conversation
  /retry                 check the backend again
  /status                show connectivity and memory size
  /upload <path>         upload a file and train memory on it
  /stats                 refresh memory statistics
  /query <text>          search memory
  /forget                clear all memory
  /h3 <m> <b> <s> <v> [note]  set and log the H3 state
  /quit                  exit";

struct Shell {
    session: ChatSession,
    memory: MemoryPanel,
    settings: SettingsStore,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = SettingsStore::load();
    let current = settings.settings();
    let backend = match HttpBackend::new(current.client_config()) {
        Ok(backend) => Arc::new(backend),
        Err(error) => {
            tracing::error!(error = %error, "failed to create backend client");
            return ExitCode::FAILURE;
        }
    };

    let history: Arc<dyn HistoryStore> =
        Arc::new(JsonHistoryStore::new(current.resolved_history_path()));
    let store: Arc<ConversationStore> = Arc::new(restore_conversation(history.as_ref()));
    let session = ChatSession::new(Arc::clone(&store), backend.clone(), history)
        .with_exchange_timeout(current.exchange_timeout())
        .with_h3_state(current.h3_state);
    let shell = Shell {
        session,
        memory: MemoryPanel::new(backend.clone()),
        settings,
    };

    println!("twin: connected to {} (type /help)", current.backend_url);
    for message in store.messages() {
        println!("[{:?}] {}", message.role, message.content);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(error) => {
                tracing::error!(error = %error, "failed to read from stdin");
                return ExitCode::FAILURE;
            }
        };

        if !shell.handle(line.trim()).await {
            break;
        }
    }

    ExitCode::SUCCESS
}

impl Shell {
    /// Returns `false` once the user asked to quit.
    async fn handle(&self, line: &str) -> bool {
        let (command, argument) = line
            .split_once(char::is_whitespace)
            .map(|(command, rest)| (command, rest.trim()))
            .unwrap_or((line, ""));

        match command {
            "" => {}
            "/quit" | "/exit" => return false,
            "/help" => println!("{HELP}"),
            "/clear" => {
                self.session.clear_history();
                println!("conversation cleared");
            }
            "/retry" => match self.session.retry().await {
                Ok(RetryOutcome::Reconnected) => println!("backend is reachable again"),
                Ok(RetryOutcome::Unhealthy(status)) => println!("backend answered `{status}`"),
                Ok(RetryOutcome::Unreachable(failure)) => println!("{}", failure.note()),
                Err(rejection) => println!("cannot retry: {rejection}"),
            },
            "/status" => println!(
                "connectivity: {}, documents in memory: {}",
                self.session.connection().current().label(),
                self.memory.document_count()
            ),
            "/upload" if !argument.is_empty() => {
                match self.memory.upload_and_train(Path::new(argument)).await {
                    Ok(trained) => println!(
                        "uploaded {}: trained {}/{} documents",
                        trained.receipt.filename, trained.report.success, trained.report.total
                    ),
                    Err(error) => println!("upload failed: {error}"),
                }
            }
            "/upload" => println!("usage: /upload <path>"),
            "/stats" => match self.memory.refresh_stats().await {
                Ok(stats) => println!(
                    "{} documents in `{}` ({})",
                    stats.total_documents, stats.collection_name, stats.persist_directory
                ),
                Err(error) => println!("stats unavailable: {error}"),
            },
            "/query" => match self.memory.query(argument, DEFAULT_QUERY_RESULTS).await {
                Ok(result) => {
                    for hit in result.results {
                        println!("- {}", hit.content);
                    }
                }
                Err(error) => println!("query failed: {error}"),
            },
            "/forget" => match self.memory.clear().await {
                Ok(acknowledgement) if acknowledgement.success => println!("memory cleared"),
                Ok(acknowledgement) => println!(
                    "memory not cleared: {}",
                    acknowledgement.error.unwrap_or_default()
                ),
                Err(error) => println!("clear failed: {error}"),
            },
            "/h3" => self.update_h3(argument).await,
            _ if command.starts_with('/') => println!("unknown command, try /help"),
            _ => self.chat(line).await,
        }

        true
    }

    async fn chat(&self, input: &str) {
        let store = Arc::clone(self.session.store());
        let mut revisions = store.subscribe();
        let reply_index = store.len() + 1;
        let mut printed = 0;

        let exchange = self.session.send(input);
        tokio::pin!(exchange);
        let outcome = loop {
            tokio::select! {
                outcome = &mut exchange => break outcome,
                changed = revisions.changed() => {
                    if changed.is_ok() {
                        print_reply_progress(&store, reply_index, &mut printed);
                    }
                }
            }
        };
        print_reply_progress(&store, reply_index, &mut printed);
        println!();

        match outcome {
            Ok(ExchangeOutcome::Completed {
                server_error: Some(error),
            }) => println!("(backend reported: {error})"),
            Ok(ExchangeOutcome::Completed { server_error: None }) => {}
            Ok(ExchangeOutcome::Failed(failure)) => {
                println!("({:?} failure, use /retry)", failure.kind);
            }
            Err(rejection) => println!("not sent: {rejection}"),
        }
    }

    async fn update_h3(&self, argument: &str) {
        let mut parts = argument.splitn(5, char::is_whitespace);
        let mut level = || parts.next().and_then(|value| value.parse::<u8>().ok());
        let (Some(mind), Some(body), Some(spirit), Some(vocation)) =
            (level(), level(), level(), level())
        else {
            println!("usage: /h3 <mind> <body> <spirit> <vocation> [note]");
            return;
        };
        let note = parts.next().unwrap_or_default();

        let (h3_state, saved) = self.settings.set_h3_state(H3State {
            mind,
            body,
            spirit,
            vocation,
        });
        if let Err(error) = saved {
            println!("H3 state not saved to disk: {error}");
        }
        self.session.set_h3_state(h3_state);
        match self.memory.log_h3(h3_state, note).await {
            Ok(_) => println!("H3 state set to {h3_state:?}"),
            Err(error) => println!("H3 state set locally, backend log failed: {error}"),
        }
    }
}

fn print_reply_progress(store: &ConversationStore, reply_index: usize, printed: &mut usize) {
    let messages = store.messages();
    let Some(reply) = messages.get(reply_index) else {
        return;
    };
    if let Some(fresh) = reply.content.get(*printed..) {
        print!("{fresh}");
        *printed = reply.content.len();
        let _ = std::io::stdout().flush();
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}
