use std::sync::Arc;

use clerk::core::message::{Classified, classify};
use clerk::store::{FileStore, StateStore};
use clerk::sync::relay::{RelayClient, RelayTransport};

#[tokio::main]
async fn main() {
    if let Err(e) = clerk::init_logging("clerk-sync-check", false) {
        eprintln!("Journal logging unavailable: {}", e);
    }

    let config = clerk::config::ClerkConfig::load();

    println!("=== Relay vs Local Comparison ===\n");

    let store = match FileStore::open(config.store_path()).await {
        Ok(s) => s,
        Err(e) => { println!("Store error: {}", e); return; }
    };
    let state = StateStore::new(Arc::new(store));

    let creds = match state.get_credentials().await {
        Ok(Some(c)) => c,
        Ok(None) => { println!("Not paired."); return; }
        Err(e) => { println!("Store error: {}", e); return; }
    };
    let cursor = state.get_sync_state().await.ok().flatten().unwrap_or_default();
    let pending = state.get_pending_actions().await.unwrap_or_default();

    println!("--- Relay: {} ---", creds.worker_url);
    println!("  Channel: {}...", creds.channel_prefix());
    println!("  Last sync: {}", cursor.last_sync_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "never".into()));
    println!("  Tabs reported: {}", cursor.tab_count.map(|n| n.to_string()).unwrap_or_else(|| "-".into()));
    println!("  Cursor: {}", cursor.last_message_id.as_deref().unwrap_or("(none)"));
    println!("  Local pending: {}", pending.len());

    let client = match RelayClient::from_credentials(&creds) {
        Ok(Some(c)) => c,
        Ok(None) => { println!("  Credentials incomplete"); return; }
        Err(e) => { println!("  Client error: {}", e); return; }
    };
    println!("  Endpoint: {}", client.base_url());

    // Peek only: nothing is deleted and the cursor is not moved.
    let messages = match client.poll(cursor.last_message_id.as_deref()).await {
        Ok(m) => m,
        Err(e) => { println!("  Poll error: {}", e); return; }
    };
    println!("\n  Waiting on relay: {}", messages.len());

    let now = chrono::Utc::now();
    let mut actions = Vec::new();
    let mut echoes = 0;
    let mut other = Vec::new();
    for msg in &messages {
        match classify(msg, &config.sender, now) {
            Classified::Echo => echoes += 1,
            Classified::Action(a) => actions.push(a),
            Classified::Ignored => other.push((msg.id.clone(), msg.sender.clone())),
        }
    }

    if !actions.is_empty() {
        println!("\n  NEW ACTIONS ({}):", actions.len());
        for a in &actions {
            let queued = if pending.contains(&a.id) { " (already queued)" } else { "" };
            println!("    [{}] {} {}{}", a.id, a.kind.as_str(), a.url, queued);
        }
    }
    if echoes > 0 {
        println!("\n  OWN MESSAGES: {}", echoes);
    }
    if !other.is_empty() {
        println!("\n  UNRECOGNIZED ({}):", other.len());
        for (id, sender) in &other {
            println!("    {} from {}", id, sender);
        }
    }
    if messages.is_empty() {
        println!("  All in sync!");
    }

    println!("\n=== Done ===");
}
