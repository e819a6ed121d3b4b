//! Host health: live tasks, loaded scripts and the current generation.
//!
//! `.health` summarises the host; `.health <script>` shows one script's
//! version, author and description.

use std::sync::Arc;

use lark::prelude::*;

use crate::format::{format_reply, value};

pub struct Health;

impl Health {
    async fn health(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        let snapshot = ctx.snapshot();
        let message = match args.as_deref() {
            None => format!(
                "Tasks:{} Scripts:{} Generation:{}",
                value(format_args!(" {}", ctx.live_tasks())),
                value(format_args!(" {}", snapshot.len())),
                value(format_args!(" {}", snapshot.generation())),
            ),
            Some(name) => {
                let plugin = snapshot
                    .lookup(name)
                    .ok_or_else(|| TaskError::domain(format!("no script named {name}")))?;
                let meta = plugin.metadata();
                let mut line = format!(
                    "{}{}",
                    value(plugin.name()),
                    value(format_args!(" {}", meta.version))
                );
                if !meta.author.is_empty() {
                    line.push_str(&format!(" by{}", value(format_args!(" {}", meta.author))));
                }
                if !meta.description.is_empty() {
                    line.push_str(&format!(" - {}", meta.description));
                }
                line
            }
        };
        ctx.reply(format_reply(Some("Health"), message));
        Ok(())
    }
}

impl Plugin for Health {
    const NAME: &'static str = "health";
    const VERSION: &'static str = "0.4";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "Monitor the current resource usage";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(Health)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.command(".health", Self::health);
    }

    fn format_error(&self, err: &TaskError) -> String {
        format_reply(Some("Health"), lark::framework::default_error_message(err))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::string_utils::StringUtils;
    use crate::testing::{host, say};

    fn scripts() -> [PluginDescriptor; 2] {
        [
            PluginDescriptor::of::<Health>(),
            PluginDescriptor::of::<StringUtils>(),
        ]
    }

    #[tokio::test]
    async fn test_summary() {
        let host = host(&scripts(), json!({}));
        let lines = say(&host, ".health").await;
        assert_eq!(lines.len(), 1);
        // The .health handler itself is the only live task.
        assert_eq!(
            lines[0],
            "\x0310>\x0f\x02 Health:\x02\x0310 Tasks:\x0f 1\x0310 Scripts:\x0f 2\x0310 Generation:\x0f 1\x0310"
        );
    }

    #[tokio::test]
    async fn test_script_metadata() {
        let host = host(&scripts(), json!({}));
        assert_eq!(
            say(&host, ".health string_utils").await,
            vec![
                "\x0310>\x0f\x02 Health:\x02\x0310 \x0fstring_utils\x0310\x0f 1.0\x0310 by\x0f Mikkel Kroman <mk@maero.dk>\x0310 - String utilities such as string length, reversing, etc."
            ]
        );
        assert_eq!(
            say(&host, ".health nope").await,
            vec!["\x0310>\x0f\x02 Health:\x02\x0310 Error: no script named nope"]
        );
    }
}
