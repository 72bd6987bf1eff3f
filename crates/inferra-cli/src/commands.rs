//! Input line parsing for the terminal client.

use inferra_core::persistence::SessionSummary;

pub const HELP: &str = "\
Type a question and press enter to ask it.

Commands:
  /new               start a new conversation
  /list              show saved conversations, most recent first
  /open <id>         reopen a conversation (id prefix is enough)
  /delete <id>       delete a conversation
  /clear             delete every conversation
  /upload <path>     upload a PDF and attach it to this conversation
  /attach <name>     attach an already uploaded document by name
  /help              show this help
  /quit              exit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    New,
    List,
    Open(String),
    Delete(String),
    Clear,
    Upload(String),
    Attach(String),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Ask(line.to_string());
        };

        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };

        let with_arg = |build: fn(String) -> Command| {
            if arg.is_empty() {
                Command::Invalid(format!("/{name} needs an argument"))
            } else {
                build(arg.to_string())
            }
        };

        match name {
            "new" => Command::New,
            "list" | "ls" => Command::List,
            "open" => with_arg(Command::Open),
            "delete" | "rm" => with_arg(Command::Delete),
            "clear" => Command::Clear,
            "upload" => with_arg(Command::Upload),
            "attach" => with_arg(Command::Attach),
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => Command::Invalid(format!("Unknown command /{other}, try /help")),
        }
    }
}

/// Find the single session whose id starts with `prefix`.
pub fn resolve_id(entries: &[SessionSummary], prefix: &str) -> Result<String, String> {
    let matches: Vec<&SessionSummary> = entries.iter().filter(|e| e.id.starts_with(prefix)).collect();
    match matches.as_slice() {
        [only] => Ok(only.id.clone()),
        [] => Err(format!("No conversation matches '{prefix}'")),
        _ => Err(format!(
            "'{prefix}' matches {} conversations, use a longer prefix",
            matches.len()
        )),
    }
}

/// One line per session for `/list`.
pub fn format_entry(entry: &SessionSummary, current: Option<&str>) -> String {
    let marker = if current == Some(entry.id.as_str()) { '*' } else { ' ' };
    let short_id: String = entry.id.chars().take(8).collect();
    let document = entry
        .pdf_filename
        .as_deref()
        .map(|name| format!(" [{name}]"))
        .unwrap_or_default();
    format!(
        "{marker} {short_id}  {}  {} ({} messages){document}",
        entry.updated_at.format("%Y-%m-%d %H:%M"),
        entry.title,
        entry.message_count,
    )
}
