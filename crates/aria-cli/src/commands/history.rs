use aria_config::AriaConfig;

use super::wiring::{build_service, resolve_user};

pub(super) async fn cmd_history(config: AriaConfig, user: &str, json: bool) -> aria_core::Result<()> {
    let service = build_service(&config)?;
    let user = resolve_user(&service, user)?;
    let entries = service.history(user.id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No history for {} yet.", user.username);
        return Ok(());
    }
    for entry in entries {
        println!("[{}]", entry.created_at.format("%Y-%m-%d %H:%M:%S"));
        println!("  > {}", entry.content);
        for line in entry.response.lines() {
            println!("    {line}");
        }
        println!();
    }
    Ok(())
}
