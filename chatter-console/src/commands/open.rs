//! Interactive session on one conversation.
//!
//! Reads commands from stdin while applying console events as they arrive.
//! Output is printed as a transcript: new timeline rows are appended, older
//! pages are printed under a separator, and pending sends report their status.

use std::{
    collections::{HashMap, HashSet},
    fmt::Write as _,
    sync::Arc,
};

use anyhow::{Context, Result};
use console::{
    Console, ConsoleError, ConsoleSettings, ConsoleUpdate, HttpChatApi, SseTransport, StoreChange,
    TempTag, TimelineEntry,
    store::PendingStatus,
};
use shared::{
    config::Config,
    models::{ConversationId, MessageId, PriorityLevel},
};
use tokio::io::{AsyncBufReadExt, BufReader};

use super::conversations::render_sidebar;

const HELP: &str = "\
commands:
  <text>            send a message
  /older            load older messages
  /read             mark the conversation read
  /priority <0-3>   set priority (0 none, 1 high, 2 medium, 3 low)
  /retry            resend failed messages
  /open <id>        switch conversation
  /list             show conversations
  /quit             leave
";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Send(String),
    Older,
    Read,
    Priority(PriorityLevel),
    Retry,
    Open(ConversationId),
    List,
    Help,
    Quit,
    Nothing,
}

fn parse_input(line: &str) -> Result<Input, String> {
    let trimmed = line.trim();
    let Some(command) = trimmed.strip_prefix('/') else {
        return Ok(if trimmed.is_empty() {
            Input::Nothing
        } else {
            Input::Send(line.trim_end_matches(['\r', '\n']).to_string())
        });
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();
    match (name, arg) {
        ("older", None) => Ok(Input::Older),
        ("read", None) => Ok(Input::Read),
        ("retry", None) => Ok(Input::Retry),
        ("list", None) => Ok(Input::List),
        ("help", None) => Ok(Input::Help),
        ("quit" | "exit", None) => Ok(Input::Quit),
        ("priority", Some(level)) => level
            .parse::<PriorityLevel>()
            .map(Input::Priority)
            .map_err(|_| format!("invalid priority '{level}', expected 0-3")),
        ("open", Some(id)) => id
            .parse::<ConversationId>()
            .map(Input::Open)
            .map_err(|_| format!("invalid conversation id '{id}'")),
        ("priority" | "open", None) => Err(format!("/{name} needs an argument")),
        _ => Err(format!("unknown command '/{name}', try /help")),
    }
}

/// What has been printed so far, so each update only prints the difference.
#[derive(Debug, Default)]
struct Transcript {
    shown: HashSet<MessageId>,
    pending: HashMap<TempTag, PendingStatus>,
    unread_elsewhere: u64,
}

impl Transcript {
    fn render(&mut self, console: &Console, update: &ConsoleUpdate) -> String {
        let mut out = String::new();

        match update.timeline {
            Some(StoreChange::Reset { .. }) => {
                self.shown.clear();
                self.pending.clear();
                if let Some(id) = console.store().conversation_id() {
                    let name = console
                        .index()
                        .get(id)
                        .map_or("", |summary| summary.fan_name.as_str());
                    let _ = writeln!(out, "--- conversation #{id} {name} ---");
                }
                if console.store().is_empty() {
                    out.push_str("(no messages yet)\n");
                }
                self.append_new(console, &mut out);
            }
            Some(StoreChange::Prepended { count }) => {
                let _ = writeln!(out, "--- {count} older messages ---");
                self.append_new(console, &mut out);
                let _ = writeln!(out, "--- end of older messages ---");
                if !console.store().has_more() {
                    out.push_str("(no more messages)\n");
                }
            }
            Some(_) => self.append_new(console, &mut out),
            None => {}
        }

        if update.sidebar {
            // the open conversation never carries unread messages
            let unread = console.index().total_unread();
            if unread > self.unread_elsewhere {
                let _ = writeln!(out, "({unread} unread in other conversations, /list to view)");
            }
            self.unread_elsewhere = unread;
        }

        if let Some(error) = &update.error {
            let _ = writeln!(out, "! {error}");
        }
        out
    }

    fn append_new(&mut self, console: &Console, out: &mut String) {
        for entry in console.store().entries() {
            match entry {
                TimelineEntry::Confirmed(message) => {
                    if self.shown.insert(message.id) {
                        let _ = writeln!(
                            out,
                            "[{}] {}: {}",
                            message.created_at.0.format("%Y-%m-%d %H:%M:%S"),
                            message.sender,
                            message.content
                        );
                    }
                }
                TimelineEntry::Pending(pending) => {
                    if self.pending.get(&pending.tag) == Some(&pending.status) {
                        continue;
                    }
                    let known = self.pending.insert(pending.tag, pending.status.clone()).is_some();
                    match (&pending.status, known) {
                        (PendingStatus::Sending, false) => {
                            let _ = writeln!(out, "[sending] chatter: {}", pending.content);
                        }
                        (PendingStatus::Sending, true) => {
                            let _ = writeln!(out, "(retrying \"{}\")", pending.content);
                        }
                        (PendingStatus::Failed(reason), _) => {
                            let _ = writeln!(
                                out,
                                "(not sent: \"{}\": {reason}; /retry to resend)",
                                pending.content
                            );
                        }
                    }
                }
            }
        }
        let live: HashSet<TempTag> = console
            .store()
            .entries()
            .iter()
            .filter_map(|entry| entry.pending().map(|pending| pending.tag))
            .collect();
        self.pending.retain(|tag, _| live.contains(tag));
    }
}

/// Runs the interactive session until `/quit` or end of input.
///
/// # Errors
/// Returns an error if reading stdin fails.
pub async fn run(config: &Config, conversation_id: ConversationId) -> Result<()> {
    let api = Arc::new(HttpChatApi::from_config(config));
    let transport = Arc::new(SseTransport::from_config(config));
    let mut console = Console::new(api, transport, ConsoleSettings::from(config));
    let mut transcript = Transcript::default();

    console.refresh_conversations();
    console.open(conversation_id);
    println!("Opening conversation #{conversation_id}... (/help for commands)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = console.next_event() => {
                let Some(event) = event else { break };
                let update = console.apply(event);
                print!("{}", transcript.render(&console, &update));
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else { break };
                match parse_input(&line) {
                    Ok(Input::Quit) => break,
                    Ok(input) => print!("{}", handle(&mut console, &mut transcript, input)),
                    Err(message) => println!("! {message}"),
                }
            }
        }
    }

    console.close();
    Ok(())
}

fn handle(console: &mut Console, transcript: &mut Transcript, input: Input) -> String {
    let result: Result<String, ConsoleError> = match input {
        Input::Send(content) => console.send(&content).map(|(_, change)| {
            transcript.render(
                console,
                &ConsoleUpdate {
                    timeline: Some(change),
                    ..ConsoleUpdate::default()
                },
            )
        }),
        Input::Older => Ok(if console.load_older() {
            "(loading older messages)\n".to_string()
        } else if console.status().loading_older || console.status().loading {
            "(still loading)\n".to_string()
        } else {
            "(no more messages)\n".to_string()
        }),
        Input::Read => console
            .mark_read()
            .map(|_| "(marked read)\n".to_string()),
        Input::Priority(level) => console
            .open_conversation()
            .ok_or(ConsoleError::NoConversationOpen)
            .and_then(|id| console.set_priority(id, level))
            .map(|()| format!("(priority set to {level})\n")),
        Input::Retry => {
            let count = console.retry_failed();
            let update = ConsoleUpdate {
                timeline: Some(StoreChange::Updated),
                ..ConsoleUpdate::default()
            };
            Ok(format!("{}(retrying {count} messages)\n", transcript.render(console, &update)))
        }
        Input::Open(id) => {
            console.open(id);
            Ok(format!("Opening conversation #{id}...\n"))
        }
        Input::List => {
            let rows = console.index().sorted();
            Ok(render_sidebar(&rows, console.open_conversation()))
        }
        Input::Help => Ok(HELP.to_string()),
        Input::Quit | Input::Nothing => Ok(String::new()),
    };
    result.unwrap_or_else(|err| format!("! {err}\n"))
}
