//! Inspection commands for persisted group chats.

use agentchat_core::ChatConfig;
use agentchat_core::ChatHistoryChannel;
use agentchat_core::SerializerOptions;
use agentchat_core::channel::CHAT_HISTORY_SHAPE;
use agentchat_core::protocol::Message;
use agentchat_orchestrator::state::ChannelRecord;
use agentchat_orchestrator::state::ChatState;
use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "agentchat", version, about = "Inspect persisted agent group chats")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the chat log, or the history of one channel
    Transcript {
        /// File written from `AgentGroupChat::serialize`
        state: PathBuf,

        /// Print this channel's history instead of the chat log
        #[arg(long)]
        channel: Option<String>,
    },

    /// List the channels stored in a chat
    Channels {
        /// File written from `AgentGroupChat::serialize`
        state: PathBuf,
    },

    /// Check that a chat and its channels can be restored
    Validate {
        /// File written from `AgentGroupChat::serialize`
        state: PathBuf,
    },
}

pub fn run(cli: Cli, config: &ChatConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let options = config.serializer;
    match cli.command {
        Command::Transcript { state, channel } => {
            let chat = read_state(&state, &options)?;
            match channel {
                None => {
                    for message in chat.messages() {
                        write_message(out, message)?;
                    }
                }
                Some(key) => {
                    let record = chat
                        .channel(&key)
                        .with_context(|| format!("no channel `{key}` in {}", state.display()))?;
                    for message in &channel_messages(&chat, record, &options)? {
                        write_message(out, message)?;
                    }
                }
            }
        }
        Command::Channels { state } => {
            let chat = read_state(&state, &options)?;
            for record in &chat.channels {
                let messages = if record.shape == CHAT_HISTORY_SHAPE {
                    channel_messages(&chat, record, &options)?.len().to_string()
                } else {
                    "-".to_string()
                };
                writeln!(out, "{}\t{}\t{messages}", record.key, record.shape)?;
            }
        }
        Command::Validate { state } => {
            let chat = read_state(&state, &options)?;
            let mut checked = 0usize;
            for record in &chat.channels {
                if record.shape == CHAT_HISTORY_SHAPE {
                    restore_chat_history(record, &options)?;
                    checked += 1;
                } else {
                    tracing::warn!(channel_key = %record.key, shape = %record.shape, "cannot check channel shape");
                }
            }
            writeln!(
                out,
                "ok: {} messages, {} channels ({checked} checked)",
                chat.history.len(),
                chat.channels.len()
            )?;
        }
    }
    Ok(())
}

fn read_state(path: &Path, options: &SerializerOptions) -> anyhow::Result<ChatState> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let chat = ChatState::decode(&raw, options)
        .with_context(|| format!("invalid chat state in {}", path.display()))?;
    tracing::debug!(path = %path.display(), messages = chat.history.len(), channels = chat.channels.len(), "loaded chat state");
    Ok(chat)
}

fn restore_chat_history(
    record: &ChannelRecord,
    options: &SerializerOptions,
) -> anyhow::Result<ChatHistoryChannel> {
    if record.shape != CHAT_HISTORY_SHAPE {
        anyhow::bail!(
            "channel `{}` has shape `{}`, only `{CHAT_HISTORY_SHAPE}` can be read",
            record.key,
            record.shape
        );
    }
    ChatHistoryChannel::restore(record.key.as_str(), &record.state, options)
        .with_context(|| format!("invalid state for channel `{}`", record.key))
}

/// The history `record` has once restored into a chat: its own blob plus the
/// logged messages it has not seen yet.
fn channel_messages(
    chat: &ChatState,
    record: &ChannelRecord,
    options: &SerializerOptions,
) -> anyhow::Result<Vec<Message>> {
    let channel = restore_chat_history(record, options)?;
    let mut messages = channel.messages().to_vec();
    messages.extend(chat.backlog(record).cloned());
    Ok(messages)
}

/// Writes `# <role> - <author>: '<content>'` followed by one line per
/// annotation.
pub fn write_message(out: &mut impl Write, message: &Message) -> std::io::Result<()> {
    writeln!(
        out,
        "# {} - {}: '{}'",
        message.role(),
        message.author_name().unwrap_or("*"),
        message.text()
    )?;
    for annotation in message.annotations() {
        writeln!(out, "* '{}' => {}", annotation.quote, annotation.file_id)?;
    }
    Ok(())
}
