//! Inferra terminal client.
//!
//! Asks questions about an uploaded document and keeps the conversation
//! history on disk. Replies are painted character by character.

mod commands;
mod render;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use inferra_core::persistence::{FileBackend, MemoryBackend, PersistenceBackend};
use inferra_core::reveal::{FrameSink, RevealConfig};
use inferra_core::{
    ChatSessionManager, Config, DocumentUploadApi, InferraClient, Message, MessageRole,
    RevealDriver, SessionIndex, SessionStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use commands::Command;

#[derive(Parser, Debug)]
#[command(name = "inferra", version, about = "Ask questions about your documents")]
struct Args {
    /// Backend base URL (overrides config and INFERRA_API_URL)
    #[arg(long)]
    api_url: Option<String>,

    /// Directory for saved conversations (overrides config and INFERRA_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep conversations in memory only
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        eprintln!("inferra: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(url) = args.api_url {
        config.api_url = url;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }

    let backend: Arc<dyn PersistenceBackend> = if args.ephemeral {
        log::info!("Using in-memory storage");
        Arc::new(MemoryBackend::new())
    } else {
        let dir = config.resolve_data_dir()?;
        log::info!("Storing conversations in {}", dir.display());
        Arc::new(FileBackend::new(dir))
    };

    let store = SessionStore::new(backend);
    let index = SessionIndex::attach(&store);
    let _history_log =
        index.on_change(|entries| log::debug!("History now holds {} conversations", entries.len()));
    let client = Arc::new(InferraClient::new(config.api_url.clone(), config.timeout()));
    let chat = ChatSessionManager::new(store, client.clone());

    let repl = Repl {
        chat,
        index,
        client,
        sink: render::painter(std::io::stdout()),
        reveal: config.reveal_config(),
    };

    let health_client = Arc::clone(&repl.client);
    let healthy = tokio::task::spawn_blocking(move || health_client.check_health())
        .await
        .unwrap_or(false);
    if healthy {
        println!("Connected to {}. Type /help for commands.", config.api_url);
    } else {
        println!(
            "Backend at {} is not reachable yet. Type /help for commands.",
            config.api_url
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt();
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match Command::parse(&line) {
            Command::Quit => break,
            command => repl.handle(command).await,
        }
    }

    log::debug!("Exiting with {} saved conversations", repl.index.len());
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

struct Repl {
    chat: ChatSessionManager,
    index: SessionIndex,
    client: Arc<InferraClient>,
    sink: FrameSink,
    reveal: RevealConfig,
}

impl Repl {
    async fn handle(&self, command: Command) {
        match command {
            Command::Ask(question) => self.ask(&question).await,
            Command::New => {
                let session = self.chat.new_chat();
                println!("Started a new conversation ({})", short(&session.id));
            }
            Command::List => self.list(),
            Command::Open(prefix) => self.open(&prefix),
            Command::Delete(prefix) => match commands::resolve_id(&self.index.entries(), &prefix) {
                Ok(id) => {
                    self.chat.delete_chat(&id);
                    println!("Deleted {}", short(&id));
                }
                Err(e) => eprintln!("{e}"),
            },
            Command::Clear => {
                self.chat.clear_history();
                println!("History cleared");
            }
            Command::Upload(path) => self.upload(PathBuf::from(path)).await,
            Command::Attach(filename) => self.attach(filename),
            Command::Help => println!("{}", commands::HELP),
            Command::Invalid(message) => eprintln!("{message}"),
            Command::Empty | Command::Quit => {}
        }
    }

    async fn ask(&self, question: &str) {
        match self.chat.send_message(question).await {
            Ok(reply) => self.reveal(&reply).await,
            Err(e) => eprintln!("Error: {e}"),
        }
    }

    async fn reveal(&self, reply: &Message) {
        let mut driver = RevealDriver::new(reply.id.clone(), self.reveal, Arc::clone(&self.sink));
        driver.set_source(reply.role, reply.content.clone());

        let interrupted = tokio::select! {
            _ = driver.join() => false,
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            driver.cancel();
            println!();
        }
    }

    fn list(&self) {
        let entries = self.index.entries();
        if entries.is_empty() {
            println!("No saved conversations");
            return;
        }
        let current = self.chat.active().map(|s| s.id);
        for entry in &entries {
            println!("{}", commands::format_entry(entry, current.as_deref()));
        }
    }

    fn open(&self, prefix: &str) {
        let id = match commands::resolve_id(&self.index.entries(), prefix) {
            Ok(id) => id,
            Err(e) => {
                eprintln!("{e}");
                return;
            }
        };
        let session = match self.chat.select_chat(&id) {
            Ok(session) => session,
            Err(e) => {
                eprintln!("{e}");
                return;
            }
        };

        println!("== {} ==", session.title);
        if let Some(document) = &session.pdf_filename {
            println!("(document: {document})");
        }
        for message in &session.messages {
            match message.role {
                MessageRole::User => println!("you: {}", message.content),
                MessageRole::Assistant => println!("{}", message.content),
            }
        }
    }

    async fn upload(&self, path: PathBuf) {
        let client = Arc::clone(&self.client);
        println!("Uploading {}...", path.display());
        match tokio::task::spawn_blocking(move || client.upload_document(&path)).await {
            Ok(Ok(filename)) => self.attach(filename),
            Ok(Err(e)) => eprintln!("Upload failed: {e}"),
            Err(e) => eprintln!("Upload failed: {e}"),
        }
    }

    fn attach(&self, filename: String) {
        match self.chat.attach_document(filename.clone()) {
            Some(session) => println!("Attached {filename} to {}", short(&session.id)),
            None => println!("Attached {filename}; it will be used for the next conversation"),
        }
    }
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}
