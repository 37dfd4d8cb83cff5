use std::io::Write;
use tokio::io::AsyncBufReadExt;

use aria_config::AriaConfig;
use aria_core::UserId;
use aria_runtime::ChatService;

use super::wiring::{build_service, print_fragments, resolve_user};

pub(super) async fn cmd_chat(
    config: AriaConfig,
    user: &str,
    message: Option<String>,
) -> aria_core::Result<()> {
    let service = build_service(&config)?;
    let user = resolve_user(&service, user)?;

    // Print fragments as they arrive, the way a live-feed client would see them.
    let live = service.fanout().subscribe(user.id, print_fragments());

    let result = match message {
        Some(message) => send(&service, user.id, &message).await,
        None => interactive(&service, &user).await,
    };

    service.unsubscribe(live);
    result
}

async fn send(service: &ChatService, user_id: UserId, message: &str) -> aria_core::Result<()> {
    let outcome = service.prompt(user_id, message).await;
    println!();
    outcome.map(|_| ())
}

async fn interactive(service: &ChatService, user: &aria_core::User) -> aria_core::Result<()> {
    println!(
        "Aria ({} style) - chatting as {}",
        user.resolved_personality().display_name(),
        user.username
    );
    println!("   Type 'exit' or Ctrl+D to quit");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("you> ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        print!("aria> ");
        let _ = std::io::stdout().flush();
        if let Err(e) = send(service, user.id, line).await {
            // A failed turn is not recorded; keep the session going.
            eprintln!("Error: {e}");
        }
    }
    Ok(())
}
