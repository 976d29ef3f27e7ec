//! Stops logins from blocked accounts or addresses and records the rest.

use async_trait::async_trait;

use urldb_plugin::PluginBindings;
use urldb_plugin::prelude::*;

/// Header of the built-in `login_guard` unit.
pub const HEADER: &str = r#"/**
 * @name login_guard
 * @display_name Login Guard
 * @description Vetoes logins from blocked users or addresses
 * @version 0.3.0
 * @author urldb
 * @category security
 * @license MIT
 * @hooks [onUserLogin]
 * @config
 * @field {text} blocked_users Blocked users "Comma separated usernames" @default ""
 * @field {text} blocked_ips Blocked addresses "Comma separated client addresses" @default ""
 * @field {boolean} notify Notify "Write a plugin log entry for every login" @default yes
 * @config
 */"#;

/// Returns the catalogue unit.
pub fn source() -> PluginSource {
    PluginSource::new("builtin/login_guard.rs", HEADER, LoginGuardPlugin)
}

/// Plugin body.
#[derive(Debug, Default)]
pub struct LoginGuardPlugin;

impl PluginScript for LoginGuardPlugin {
    fn setup(&self, bindings: &mut PluginBindings) -> Result<(), HandlerError> {
        bindings.on_user_login(GuardHook);
        Ok(())
    }
}

struct GuardHook;

#[async_trait]
impl HookHandler for GuardHook {
    async fn handle(
        &self,
        ctx: &PluginContext,
        event: &mut HookEvent,
        next: Next<'_>,
    ) -> Result<(), HandlerError> {
        let Some(user) = event.user() else {
            next.run(event).await;
            return Ok(());
        };
        let config = ctx.config().await?;

        let blocked_user = listed(config.get_str("blocked_users"), &user.username);
        let blocked_ip = user
            .login_ip
            .as_deref()
            .is_some_and(|ip| listed(config.get_str("blocked_ips"), ip));

        if blocked_user || blocked_ip {
            let reason = if blocked_user {
                format!("user '{}' is blocked", user.username)
            } else {
                format!("address {} is blocked", user.login_ip.as_deref().unwrap_or("-"))
            };
            ctx.warn(format!("login refused: {reason}"));
            event.set("login_refused", json!(reason));
            return Ok(());
        }

        if config.get_bool("notify").unwrap_or(true) {
            ctx.info(format!(
                "{} logged in from {}",
                user.username,
                user.login_ip.as_deref().unwrap_or("unknown address")
            ));
        }
        next.run(event).await;
        Ok(())
    }
}

fn listed(list: Option<&str>, value: &str) -> bool {
    list.unwrap_or_default()
        .split([',', '\n'])
        .map(str::trim)
        .any(|entry| !entry.is_empty() && entry.eq_ignore_ascii_case(value))
}
