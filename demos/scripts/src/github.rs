//! GitHub repository search.
//!
//! `.gh <query>` replies with the most starred matching repository.
//!
//! ```toml
//! [plugins.github]
//! token = "ghp_..."   # optional, raises the rate limit
//! ```

use std::sync::Arc;

use lark::framework::default_error_message;
use lark::prelude::*;
use serde::Deserialize;
use tracing::debug;

use crate::format::{RESET, TEAL, format_reply, value};

const API_URL: &str = "https://api.github.com";
const LABEL: &str = "GitHub";

#[derive(Debug, Deserialize)]
struct GithubConfig {
    #[serde(default = "default_api_url")]
    api_url: String,
    #[serde(default)]
    token: Option<String>,
}

fn default_api_url() -> String {
    API_URL.to_string()
}

/// One search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct Repository {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResults {
    #[serde(default)]
    items: Vec<Repository>,
}

pub struct Github {
    config: GithubConfig,
}

impl Github {
    /// Searches repositories matching `query`, most stars first.
    pub fn search_repos(&self, ctx: &HandlerContext, query: &str) -> Task<Vec<Repository>> {
        let mut req = Request::get(format!("{}/search/repositories", self.config.api_url))
            .query("q", query)
            .query("sort", "stars")
            .query("order", "desc")
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.config.token {
            req = req.bearer_auth(token);
        }

        let request = ctx.request(req);
        ctx.spawn("github.search_repos", move |_| async move {
            let resp = request.wait().await?.raise_for_status()?;
            Ok(resp.json::<SearchResults>()?.items)
        })
    }

    async fn gh(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        let query = args.ok_or_else(|| TaskError::domain(".gh <query>"))?;
        debug!(query = %query, "Searching repositories");

        let repos = self.search_repos(&ctx, &query).wait().await?;
        let repo = repos
            .first()
            .ok_or_else(|| TaskError::domain("No results"))?;
        ctx.reply(format_reply(Some(LABEL), format_repo(repo)));
        Ok(())
    }
}

impl Plugin for Github {
    const NAME: &'static str = "github";
    const VERSION: &'static str = "0.2";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "GitHub.com integration";

    fn load(config: &PluginConfig) -> LoadResult<Self> {
        Ok(Self {
            config: config.deserialize()?,
        })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.command(".gh", Self::gh);
    }

    fn format_error(&self, err: &TaskError) -> String {
        match err {
            TaskError::Domain(message) => format_reply(Some(LABEL), message),
            other => format_reply(Some(LABEL), default_error_message(other)),
        }
    }
}

fn format_repo(repo: &Repository) -> String {
    let mut line = String::new();
    if repo.fork {
        line.push_str(&format!("{RESET}\u{2442}{TEAL} "));
    }
    line.push_str(&repo.full_name);
    if let Some(description) = &repo.description {
        line.push_str(&format!(" - {description}"));
    }
    line.push_str(&format!(" -{}", value(format_args!(" {}", repo.html_url))));
    line.push_str(&format!(
        " - Language:{} Stars:{}",
        value(format_args!(" {}", repo.language.as_deref().unwrap_or("?"))),
        value(format_args!(" {}", repo.stargazers_count)),
    ));
    line
}
