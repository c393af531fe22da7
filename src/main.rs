//! Terminal chat client.
//!
//! Opens one conversation and the notification feed of the signed-in
//! identity, prints history and live messages, and sends every stdin line.
//!
//! Environment: `CHAT_ID`, `IDENTITY_ID`, `IDENTITY_TYPE` (`user` or
//! `vendor`), `PEER_ID`, plus the `RealtimeConfig` keys.

use anyhow::{Context, bail};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use wedding_realtime::chat::ChatTarget;
use wedding_realtime::domain::{
    ChatId, ChatMessage, Identity, IdentityId, IdentityType, ViewEvent, ViewFilter, ViewUpdate,
};
use wedding_realtime::{RealtimeClient, RealtimeConfig};

fn required(key: &str) -> anyhow::Result<String> {
    std::env::var(key).with_context(|| format!("{key} must be set"))
}

fn print_message(viewer: &IdentityId, message: &ChatMessage) {
    let who = if message.is_from(viewer) { "me" } else { message.sender.as_str() };
    println!("[{}] {who}: {}", message.created_at.format("%H:%M"), message.content);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = RealtimeConfig::from_env()?;
    let raw_kind = required("IDENTITY_TYPE")?;
    let Some(kind) = IdentityType::parse(&raw_kind) else {
        bail!("IDENTITY_TYPE must be user or vendor, got {raw_kind}");
    };
    let viewer = Identity {
        id: IdentityId::new(required("IDENTITY_ID")?),
        kind,
    };
    let target = ChatTarget {
        chat_id: ChatId::new(required("CHAT_ID")?),
        viewer: viewer.clone(),
        peer: IdentityId::new(required("PEER_ID")?),
    };
    tracing::info!(base = %config.api_base_url, %viewer, "starting terminal client");

    let client = RealtimeClient::new(config)?;
    let mut room = client.watch(ViewFilter::Chat(target.chat_id.clone()));
    let mut feed = client.watch(ViewFilter::Feed(viewer.clone()));

    let session = client.open_chat(target).await;
    if let Some(e) = session.last_error() {
        bail!("could not load conversation: {e}");
    }
    for message in session.messages() {
        print_message(&viewer.id, &message);
    }
    let notifications = client.start_notifications(viewer.clone()).await;
    println!("-- {} unread notifications --", notifications.unread_count());

    // Print live updates
    let printer_viewer = viewer.id.clone();
    let printer = tokio::spawn(async move {
        loop {
            let update = tokio::select! {
                update = room.next() => update,
                update = feed.next() => update,
            };
            match update {
                Some(ViewUpdate::Event(ViewEvent::MessageAppended { message, .. }))
                    if !message.is_from(&printer_viewer) =>
                {
                    print_message(&printer_viewer, &message);
                }
                Some(ViewUpdate::Event(ViewEvent::PeerTyping { active: true, .. })) => {
                    println!("(typing...)");
                }
                Some(ViewUpdate::Event(ViewEvent::NotificationReceived { notification, .. })) => {
                    println!("* {}", notification.message);
                }
                Some(ViewUpdate::Event(_)) => {}
                Some(ViewUpdate::Resync { missed }) => {
                    tracing::warn!(missed, "terminal fell behind view events");
                }
                None => break,
            }
        }
    });

    // Send stdin lines
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            session.send_typing();
            continue;
        }
        match session.send(&line).await {
            Ok(receipt) if receipt.is_complete() => {}
            Ok(receipt) => {
                tracing::warn!(local_id = %receipt.local_id, broadcast = receipt.broadcast, "message not fully delivered");
            }
            Err(e) => tracing::warn!(error = %e, "message rejected"),
        }
    }

    printer.abort();
    drop(notifications);
    drop(session);
    Ok(())
}
