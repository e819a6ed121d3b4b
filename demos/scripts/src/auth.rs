//! Admin-only `.reload`.
//!
//! ```toml
//! [plugins.auth]
//! admins = ["mk!mk@maero.dk"]
//! ```

use std::sync::Arc;

use lark::prelude::*;
use serde::Deserialize;
use tracing::info;

use crate::format::format_reply;

#[derive(Debug, Default, Deserialize)]
struct AuthConfig {
    #[serde(default)]
    admins: Vec<String>,
}

pub struct Auth {
    admins: Vec<String>,
}

impl Auth {
    /// Exact `nick!ident@host` match against the configured admins.
    pub fn is_authorized(&self, user: &User) -> bool {
        let mask = user.mask();
        self.admins.iter().any(|admin| *admin == mask)
    }

    async fn reload(self: Arc<Self>, ctx: HandlerContext, _args: Option<String>) -> TaskResult<()> {
        if !self.is_authorized(ctx.user()) {
            ctx.reply(format_reply(None, "You're not authorized to use this command."));
            return Ok(());
        }

        let summary = ctx.reload().await?;
        info!(
            user = %ctx.user().mask(),
            generation = summary.generation,
            failed = summary.failed.len(),
            "Reload requested from chat"
        );
        ctx.reply(format_reply(None, "Configuration and scripts reloaded."));
        Ok(())
    }
}

impl Plugin for Auth {
    const NAME: &'static str = "auth";
    const VERSION: &'static str = "0.1";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "Simple authorization script";

    fn load(config: &PluginConfig) -> LoadResult<Self> {
        let config: AuthConfig = config.deserialize()?;
        Ok(Self {
            admins: config.admins,
        })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.command(".reload", Self::reload);
    }
}
