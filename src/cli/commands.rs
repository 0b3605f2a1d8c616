use futures::StreamExt;
use log::warn;
use std::error::Error;
use tokio::io::{ AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt };

use crate::config::prompt::build_messages;
use crate::history::{ format_history_for_prompt, HistoryStore };
use crate::llm::chat::ChatClient;
use crate::models::chat::{ Message, Role };
use crate::models::trends::{ NicheCpm, TrendReport };

type CliResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

const ASK_PROMPT: &str = "Ask a question...";
const MAX_REGIONS_SHOWN: usize = 10;

async fn read_line<R: AsyncBufRead + Unpin>(input: &mut R) -> CliResult<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line).await? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Single turn: prompt, read one line, print the raw response.
pub async fn ask<R, W>(
    chat: &dyn ChatClient,
    system: &str,
    input: &mut R,
    out: &mut W
) -> CliResult<()>
    where R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin
{
    out.write_all(ASK_PROMPT.as_bytes()).await?;
    out.flush().await?;
    let question = read_line(input).await?.unwrap_or_default();

    let result = chat.invoke(&build_messages(system, &question)).await?;
    out.write_all(format!("{:#?}\n", result).as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Bare prompt in, raw response out.
pub async fn invoke<W: AsyncWrite + Unpin>(
    chat: &dyn ChatClient,
    prompt: &str,
    out: &mut W
) -> CliResult<()> {
    let result = chat.invoke_prompt(prompt).await?;
    out.write_all(format!("{:#?}\n", result).as_bytes()).await?;
    Ok(())
}

/// Sends `text` under the translator persona and prints the raw response.
pub async fn translate<W: AsyncWrite + Unpin>(
    chat: &dyn ChatClient,
    system: &str,
    text: &str,
    out: &mut W
) -> CliResult<()> {
    let result = chat.invoke(&build_messages(system, text)).await?;
    out.write_all(format!("{:#?}\n", result).as_bytes()).await?;
    out.flush().await?;
    Ok(())
}

/// Read-eval-print loop. Each reply is streamed as it arrives and both turns
/// are written to `history` under `session_id`. `exit`, `quit` or EOF ends it.
pub async fn chat_loop<R, W>(
    chat: &dyn ChatClient,
    history: &dyn HistoryStore,
    session_id: &str,
    system: Option<&str>,
    input: &mut R,
    out: &mut W
) -> CliResult<()>
    where R: AsyncBufRead + Unpin, W: AsyncWrite + Unpin
{
    let previous = history.get_conversation(session_id, 0).await?;
    if !previous.messages.is_empty() {
        out.write_all(
            format!("Resuming session '{}' ({} messages)\n", session_id, previous.messages.len()).as_bytes()
        ).await?;
        out.write_all(format_history_for_prompt(&previous).as_bytes()).await?;
    }

    loop {
        out.write_all(b"> ").await?;
        out.flush().await?;
        let Some(line) = read_line(input).await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            break;
        }

        history.add_message(session_id, &Message::human(line)).await?;
        let conversation = history.get_conversation(session_id, 0).await?;
        let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
        if let Some(system) = system.filter(|s| !s.trim().is_empty()) {
            messages.push(Message::system(system));
        }
        messages.extend(conversation.to_messages());

        let mut reply = String::new();
        match chat.stream(&messages).await {
            Ok(mut tokens) => {
                while let Some(token) = tokens.next().await {
                    match token {
                        Ok(token) => {
                            out.write_all(token.as_bytes()).await?;
                            out.flush().await?;
                            reply.push_str(&token);
                        }
                        Err(e) => {
                            warn!("Stream interrupted: {}", e);
                            out.write_all(format!("\n[error: {}]", e).as_bytes()).await?;
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!("Chat request failed: {}", e);
                out.write_all(format!("[error: {}]", e).as_bytes()).await?;
            }
        }
        out.write_all(b"\n").await?;

        if !reply.is_empty() {
            history.add_message(session_id, &Message::new(Role::Assistant, reply)).await?;
        }
    }
    out.flush().await?;
    Ok(())
}

fn bar(value: u32) -> String {
    "#".repeat((value / 2) as usize)
}

pub fn render_trend_report(report: &TrendReport) -> String {
    let mut text = String::new();
    for warning in &report.warnings {
        text.push_str(&format!("warning: {}\n", warning));
    }
    if let Some(timeline) = &report.timeline {
        text.push_str(&format!("Interest over time for '{}'\n", report.keyword));
        let width = timeline.iter().map(|p| p.date.len()).max().unwrap_or(0);
        for point in timeline {
            text.push_str(
                &format!("  {:<width$}  {:>3}  {}\n", point.date, point.value, bar(point.value), width = width)
            );
        }
    }
    if let Some(regions) = &report.regions {
        text.push_str(&format!("Interest by region for '{}'\n", report.keyword));
        let shown = &regions[..regions.len().min(MAX_REGIONS_SHOWN)];
        let width = shown.iter().map(|r| r.geo_name.len()).max().unwrap_or(0);
        for region in shown {
            text.push_str(
                &format!("  {:<width$}  {:>3}  {}\n", region.geo_name, region.value, bar(region.value), width = width)
            );
        }
    }
    text
}

pub fn render_niches(niches: &[NicheCpm]) -> String {
    if niches.is_empty() {
        return "No CPM data found.\n".to_string();
    }
    niches
        .iter()
        .map(|n| format!("{} - Estimated CPM: ${:.2}\n", n.niche, n.cpm))
        .collect()
}
