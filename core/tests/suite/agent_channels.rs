#![allow(clippy::unwrap_used)]

use agentchat_core::Agent;
use agentchat_core::AgentChatError;
use agentchat_core::CHAT_HISTORY_KEY;
use agentchat_core::ChatHistoryAgent;
use agentchat_core::SerializerOptions;
use agentchat_core::protocol::AgentIdentity;
use agentchat_core::protocol::AuthorRole;
use agentchat_core::protocol::Message;
use assert_matches::assert_matches;
use core_test_support::ScriptedService;
use core_test_support::Step;
use core_test_support::reply;
use core_test_support::texts;
use futures::StreamExt;
use pretty_assertions::assert_eq;

#[tokio::test]
async fn chat_history_agent_defaults_to_shared_key() {
    let agent = ChatHistoryAgent::new(AgentIdentity::new("analyst"), ScriptedService::default());
    assert_eq!(agent.channel_keys(), vec![CHAT_HISTORY_KEY.to_string()]);
    assert_eq!(agent.id(), "analyst");
}

#[tokio::test]
async fn three_message_channel_survives_serialize_and_restore() {
    let agent = ChatHistoryAgent::new(AgentIdentity::new("analyst"), ScriptedService::default())
        .with_channel_keys(["chat"]);
    let mut channel = agent.create_channel("chat").await.unwrap();
    channel.receive(&[
        Message::user("Which segment had the most sales?"),
        Message::agent("Enterprise").with_author("analyst"),
        Message::user("List the top 5 countries."),
    ]);

    let options = SerializerOptions::default();
    let state = channel.serialize(&options).unwrap();
    let restored = agent.restore_channel("chat", &state, &options).await.unwrap();

    assert_eq!(restored.len(), 3);
    assert_eq!(restored.history(), channel.history());
}

#[tokio::test]
async fn restore_rejects_truncated_state() {
    let agent = ChatHistoryAgent::new(AgentIdentity::new("analyst"), ScriptedService::default());
    let mut channel = agent.create_channel(CHAT_HISTORY_KEY).await.unwrap();
    channel.receive(&[Message::user("hi")]);

    let options = SerializerOptions::default();
    let state = channel.serialize(&options).unwrap();
    let truncated = &state[..state.len() / 2];

    assert_matches!(
        agent
            .restore_channel(CHAT_HISTORY_KEY, truncated, &options)
            .await
            .err(),
        Some(AgentChatError::Deserialization(_))
    );
}

#[tokio::test]
async fn invoke_streams_replies_lazily() {
    let gate = std::sync::Arc::new(tokio::sync::Notify::new());
    let service = ScriptedService::new(vec![vec![
        reply("first"),
        Step::WaitFor(gate.clone()),
        reply("second"),
    ]]);
    let agent = ChatHistoryAgent::new(AgentIdentity::new("analyst"), service.clone());

    let mut replies = agent.invoke(vec![Message::user("go")]);
    let first = replies.next().await.unwrap().unwrap();
    assert_eq!(first.text(), "first");
    assert_eq!(first.role(), AuthorRole::Agent);

    gate.notify_one();
    let rest: Vec<Message> = replies.map(|r| r.unwrap()).collect().await;
    assert_eq!(texts(&rest), vec!["second"]);
    assert_eq!(service.requests().len(), 1);
}
