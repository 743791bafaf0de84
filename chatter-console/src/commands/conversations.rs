use std::fmt::Write as _;

use anyhow::{Context, Result};
use console::{ChatApi, HttpChatApi, index::{ConversationIndex, load_summaries}};
use shared::{
    config::Config,
    models::{ConversationSummary, Fan, FanId},
};

const PREVIEW_CHARS: usize = 60;

pub async fn list_conversations(config: &Config, search: Option<&str>) -> Result<()> {
    let api = HttpChatApi::from_config(config);
    let summaries = load_summaries(&api)
        .await
        .context("failed to load conversations")?;

    let mut index = ConversationIndex::new();
    index.load(summaries);
    let rows = index.search(search.unwrap_or_default());
    print!("{}", render_sidebar(&rows, None));
    let unread = index.total_unread();
    if unread > 0 {
        println!("{unread} unread in total");
    }
    Ok(())
}

pub async fn show_fan(config: &Config, fan_id: FanId) -> Result<()> {
    let api = HttpChatApi::from_config(config);
    let fan = api
        .fetch_fan(fan_id)
        .await
        .with_context(|| format!("failed to fetch fan {fan_id}"))?;
    print!("{}", render_fan(&fan));
    Ok(())
}

/// One line per conversation; the open one is marked with `>`.
pub fn render_sidebar(rows: &[&ConversationSummary], open: Option<i64>) -> String {
    if rows.is_empty() {
        return "No conversations found.\n".to_string();
    }

    let mut out = String::new();
    for summary in rows {
        let marker = if open == Some(summary.id) { '>' } else { ' ' };
        let unread = if summary.unread_count > 0 {
            format!(" ({} unread)", summary.unread_count)
        } else {
            String::new()
        };
        let _ = writeln!(
            out,
            "{marker} #{id:<6} [{priority:<6}] {name}{unread}",
            id = summary.id,
            priority = summary.priority_level,
            name = summary.fan_name,
        );
        if !summary.last_message.is_empty() {
            let _ = writeln!(out, "    {}", preview(&summary.last_message));
        }
    }
    out
}

pub fn render_fan(fan: &Fan) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Fan {} ({})", fan.name(), fan.id);
    if !fan.username.is_empty() {
        let _ = writeln!(out, "  username: {}", fan.username);
    }
    if let Some(spent) = &fan.total_spent {
        let _ = writeln!(out, "  total spent: {spent}");
    }
    if let Some(created) = fan.created_at {
        let _ = writeln!(out, "  fan since: {}", created.0.format("%Y-%m-%d"));
    }
    out
}

fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS || line.len() < text.len() {
        let cut: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{cut}…")
    } else {
        line.to_string()
    }
}
