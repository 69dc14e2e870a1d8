use anyhow::Result;
use console::style;
use std::sync::Arc;

use super::ClientArgs;
use crate::client::api::{ClientError, GatewayClient};
use crate::client::consumer::ConnectionState;
use crate::client::conversation::{Conversation, StreamUpdate};
use crate::client::credentials::Credentials;
use crate::client::{Notice, Notifier, TerminalNotifier};
use crate::config::Settings;
use crate::core::suggestions;
use crate::core::terminal::{self, GuideSection, print_message, print_sources};
use crate::core::types::{Message, Role};

fn gateway_client(settings: &Settings, api_url: Option<&str>) -> Result<Arc<GatewayClient>> {
    let credentials = Credentials::load(&settings.data_dir)?;
    let api_url = api_url.unwrap_or(&settings.api_url);
    Ok(Arc::new(GatewayClient::new(api_url, credentials)))
}

/// Submit one question and print the streamed answer until the job's stream ends.
pub async fn ask(settings: &Settings, args: ClientArgs) -> Result<()> {
    let client = gateway_client(settings, args.api_url.as_deref())?;
    let mut conversation = Conversation::new(
        client.clone(),
        client,
        Arc::new(TerminalNotifier),
        args.session.clone(),
    );

    conversation.set_input(args.prompt.clone());
    let prompt = conversation.input().to_string();
    print_message(&Message::new(Role::User, prompt.as_str()));

    let submitted = tokio::select! {
        job = conversation.append(&prompt) => job,
        _ = tokio::signal::ctrl_c() => None,
    };
    if conversation.is_loading() {
        // Interrupted before the gateway answered.
        conversation.stop();
        terminal::print_warn("Submission interrupted.");
        return Ok(());
    }
    if submitted.is_none() {
        return Ok(());
    }
    if let (Some(session), Some(job)) = (conversation.session_id(), conversation.job_id()) {
        terminal::print_info(&format!("Session {} (job {})", session, job));
    }

    loop {
        let update = tokio::select! {
            update = conversation.next_event() => update,
            _ = tokio::signal::ctrl_c() => {
                // Print what already arrived before the stream is torn down.
                for update in conversation.drain_events() {
                    if let StreamUpdate::Appended(message) = update {
                        print_message(&message);
                    }
                }
                conversation.cancel().await;
                None
            }
        };
        match update {
            Some(StreamUpdate::Appended(message)) => print_message(&message),
            Some(StreamUpdate::Ignored) => {}
            Some(StreamUpdate::Failed) | Some(StreamUpdate::Ended) | None => break,
        }
    }
    let failed = conversation.connection_state() == ConnectionState::Error;
    conversation.shutdown().await;

    print_sources(conversation.sources());
    if failed {
        anyhow::bail!("the answer stream ended with an error");
    }
    Ok(())
}

pub async fn history(settings: &Settings, api_url: Option<String>, session: &str) -> Result<()> {
    let client = gateway_client(settings, api_url.as_deref())?;
    let mut conversation =
        Conversation::new(client.clone(), client, Arc::new(TerminalNotifier), None);

    if conversation.reload(session).await {
        if conversation.messages().is_empty() {
            terminal::print_info("No messages yet.");
        }
        for message in conversation.messages() {
            print_message(message);
        }
    }
    Ok(())
}

pub async fn chats(settings: &Settings, api_url: Option<String>) -> Result<()> {
    let client = gateway_client(settings, api_url.as_deref())?;
    let chats = match client.chats().await {
        Ok(chats) => chats,
        Err(ClientError::Unauthorized) => {
            TerminalNotifier.notify(Notice::LoginRequired);
            return Ok(());
        }
        Err(e) => {
            TerminalNotifier.notify(Notice::Error(e.to_string()));
            return Ok(());
        }
    };

    if chats.is_empty() {
        terminal::print_info("No chats yet.");
        return Ok(());
    }
    for chat in chats {
        let created = chrono::DateTime::from_timestamp_millis(chat.created_at)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "  {}  {}  {}",
            style(&chat.id).bold().cyan(),
            style(created).dim(),
            chat.title
        );
    }
    Ok(())
}

/// Print `count` example questions. Each run draws a fresh selection.
pub fn suggest(count: usize) {
    let mut section = GuideSection::new("Try asking");
    for question in suggestions::pick(&mut rand::thread_rng(), count) {
        section = section.text(&format!("{} {}", style("→").dim(), question));
    }
    section
        .blank()
        .text(&format!(
            "Run {} to ask one.",
            style("mevchat ask \"<question>\"").bold()
        ))
        .print();
}
