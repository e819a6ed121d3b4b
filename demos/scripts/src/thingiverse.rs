//! Thingiverse link previews.
//!
//! Replies to `thingiverse.com/thing:<id>` links with the thing's name,
//! creator and popularity.
//!
//! ```toml
//! [plugins.thingiverse]
//! app_token = "..."   # or THINGIVERSE_APP_TOKEN
//! ```

use std::sync::Arc;

use lark::framework::default_error_message;
use lark::prelude::*;
use regex::Regex;
use serde::Deserialize;

use crate::format::{delimited, format_reply, pluralize, value};

const API_URL: &str = "https://api.thingiverse.com";
const THING_PATH: &str = r"(?i)^/thing:(?P<id>\d+)/?$";

#[derive(Debug, Clone, Deserialize)]
pub struct Creator {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Thing {
    pub name: String,
    pub creator: Creator,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub download_count: u64,
    #[serde(default)]
    pub collect_count: u64,
    #[serde(default)]
    pub is_wip: bool,
    #[serde(default)]
    pub is_featured: bool,
}

pub struct Thingiverse {
    app_token: String,
    api_url: String,
    thing_path: Regex,
}

impl Thingiverse {
    /// Fetches a thing by id.
    pub fn thing(&self, ctx: &HandlerContext, id: u64) -> Task<Thing> {
        let request = ctx.request(
            Request::get(format!("{}/things/{id}/", self.api_url)).bearer_auth(&self.app_token),
        );
        ctx.spawn("thingiverse.thing", move |_| async move {
            let resp = request.wait().await?;
            if resp.status() == 404 {
                return Err(TaskError::domain("Thing not found"));
            }
            resp.raise_for_status()?.json::<Thing>()
        })
    }

    async fn on_url(self: Arc<Self>, ctx: HandlerContext, url: Url) -> TaskResult<()> {
        let Some(id) = self
            .thing_path
            .captures(url.path())
            .and_then(|caps| caps["id"].parse::<u64>().ok())
        else {
            return Ok(());
        };

        let thing = self.thing(&ctx, id).wait().await?;
        ctx.reply(format_reply(None, format_thing(&thing)));
        Ok(())
    }
}

impl Plugin for Thingiverse {
    const NAME: &'static str = "thingiverse";
    const VERSION: &'static str = "0.1";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "Thingiverse integration";

    fn load(config: &PluginConfig) -> LoadResult<Self> {
        let thing_path =
            Regex::new(THING_PATH).map_err(|e| LoadError::invalid(Self::NAME, e.to_string()))?;
        Ok(Self {
            app_token: config.require_or_env("app_token", "THINGIVERSE_APP_TOKEN")?,
            api_url: config.get_str("api_url").unwrap_or(API_URL).to_string(),
            thing_path,
        })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.url(&["thingiverse.com", "www.thingiverse.com"], Self::on_url);
    }

    fn format_error(&self, err: &TaskError) -> String {
        match err {
            TaskError::Domain(message) => format_reply(None, message),
            other => format_reply(None, default_error_message(other)),
        }
    }
}

fn format_thing(thing: &Thing) -> String {
    let kind = if thing.is_wip {
        value(" work in progress")
    } else if thing.is_featured {
        format!(" {}", value("featured"))
    } else {
        " thing".to_string()
    };

    let mut line = format!(
        "“{}” is a{kind} created by{} with{} {},{} {}",
        value(&thing.name),
        value(format_args!(" {}", thing.creator.name)),
        value(format_args!(" {}", delimited(thing.like_count))),
        pluralize(thing.like_count, "like", "likes"),
        value(format_args!(" {}", delimited(thing.download_count))),
        pluralize(thing.download_count, "download", "downloads"),
    );
    if thing.collect_count > 0 {
        line.push_str(&format!(
            " and is part of{} {}",
            value(format_args!(" {}", delimited(thing.collect_count))),
            pluralize(thing.collect_count, "collection", "collections"),
        ));
    }
    line
}
