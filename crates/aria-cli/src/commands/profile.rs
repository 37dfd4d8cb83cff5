use aria_config::AriaConfig;

use super::wiring::open_store;

pub(super) fn cmd_profile(
    config: AriaConfig,
    username: &str,
    personality: &str,
) -> aria_core::Result<()> {
    let store = open_store(&config)?;
    let users = store.users();
    let existed = users.find_by_username(username)?.is_some();
    let user = users.upsert_profile(username, personality)?;

    let verb = if existed { "Updated" } else { "Created" };
    println!("{verb} {} ({})", user.username, user.id);
    println!("   Personality: {}", user.resolved_personality().display_name());
    Ok(())
}
