//! Twitch link previews for channels, clips and videos.
//!
//! Helix requests carry an app access token obtained through the client
//! credentials flow. The token is cached in memory; a `401` refreshes it and
//! retries the request once.
//!
//! ```toml
//! [plugins.twitch]
//! client_id = "..."       # or TWITCH_CLIENT_ID
//! client_secret = "..."   # or TWITCH_CLIENT_SECRET
//! ```

use std::sync::Arc;

use lark::framework::default_error_message;
use lark::prelude::*;
use parking_lot::RwLock;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::format::{delimited, format_reply, value};

const API_URL: &str = "https://api.twitch.tv";
const AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
const LABEL: &str = "Twitch";

/// Requests per API call, counting the retry after a token refresh.
const MAX_ATTEMPTS: u32 = 2;

const CLIP_PATH: &str = r"^/(?P<channel>[^/]+)/clip/(?P<clip_id>[^/]*)";
const VIDEO_PATH: &str = r"^/videos/(?P<video_id>[0-9]+)/?";
const CHANNEL_PATH: &str = r"^/(?P<channel>[a-zA-Z0-9_]{4,25})/?$";

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct AccessToken {
    access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Stream {
    pub user_login: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub game_name: String,
    #[serde(default)]
    pub viewer_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Clip {
    pub title: String,
    pub broadcaster_name: String,
    pub creator_name: String,
    #[serde(default)]
    pub view_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Video {
    pub title: String,
    pub user_login: String,
    #[serde(default)]
    pub view_count: u64,
}

struct Paths {
    clip: Regex,
    video: Regex,
    channel: Regex,
}

impl Paths {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            clip: Regex::new(CLIP_PATH)?,
            video: Regex::new(VIDEO_PATH)?,
            channel: Regex::new(CHANNEL_PATH)?,
        })
    }
}

pub struct Twitch {
    client_id: String,
    client_secret: String,
    api_url: String,
    auth_url: String,
    /// Cached app access token. Never held across an `.await`; see
    /// [`Twitch::refresh_access_token`] for the re-check after suspending.
    access_token: RwLock<Option<String>>,
    paths: Paths,
}

impl Twitch {
    fn helix_request(&self, path: &str, key: &str, value: &str, token: Option<&str>) -> Request {
        let mut req = Request::get(format!("{}{path}", self.api_url))
            .query(key, value)
            .header("Client-ID", &self.client_id)
            .header("Accept", "application/vnd.twitchtv.v5+json");
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        req
    }

    /// Requests a fresh app access token and caches it.
    ///
    /// `stale` is the token the failed request carried. If the cache already
    /// holds a different one, another handler refreshed it while this one was
    /// waiting and no new token is requested. The same check is repeated
    /// before storing the new token, so one refreshed meanwhile is kept. A
    /// rejected refresh keeps the old token.
    async fn refresh_access_token(
        &self,
        ctx: &HandlerContext,
        stale: Option<&str>,
    ) -> TaskResult<()> {
        if self.access_token.read().as_deref() != stale {
            debug!("Access token was refreshed concurrently");
            return Ok(());
        }

        debug!("Refreshing access token");
        let req = Request::post(&self.auth_url)
            .query("client_id", &self.client_id)
            .query("client_secret", &self.client_secret)
            .query("grant_type", "client_credentials");
        let resp = ctx.request(req).wait().await?;
        if resp.status() != 200 {
            warn!(status = resp.status(), "Access token refresh was rejected");
            return Ok(());
        }

        match resp.json::<AccessToken>()?.access_token {
            Some(token) => {
                let mut cached = self.access_token.write();
                if cached.as_deref() == stale {
                    *cached = Some(token);
                    debug!("Refreshed access token");
                } else {
                    debug!("Keeping the access token refreshed concurrently");
                }
            }
            None => warn!("Token response did not contain an access token"),
        }
        Ok(())
    }

    /// First item of a Helix collection.
    ///
    /// A `401` refreshes the token and retries, up to [`MAX_ATTEMPTS`]
    /// requests in total.
    async fn first<T: DeserializeOwned>(
        &self,
        ctx: &HandlerContext,
        path: &str,
        key: &str,
        value: &str,
    ) -> TaskResult<Option<T>> {
        for attempt in 1..=MAX_ATTEMPTS {
            let token = self.access_token.read().clone();
            let req = self.helix_request(path, key, value, token.as_deref());
            let resp = ctx.request(req).wait().await?;
            if resp.status() == 401 {
                debug!(path, attempt, "Request was not authorized");
                if attempt < MAX_ATTEMPTS {
                    self.refresh_access_token(ctx, token.as_deref()).await?;
                }
                continue;
            }
            let page: Page<T> = resp.raise_for_status()?.json()?;
            return Ok(page.data.into_iter().next());
        }
        Err(TaskError::domain(format!("Twitch rejected the access token {MAX_ATTEMPTS} times")))
    }

    async fn describe_stream(&self, ctx: &HandlerContext, channel: &str) -> TaskResult<()> {
        match self.first::<Stream>(ctx, "/helix/streams", "user_login", channel).await? {
            Some(stream) => ctx.reply(format_reply(Some(LABEL), format_stream(&stream))),
            None => ctx.reply(format_reply(None, format!("{channel} - Twitch"))),
        }
        Ok(())
    }

    async fn describe_clip(&self, ctx: &HandlerContext, clip_id: &str) -> TaskResult<()> {
        let clip = self
            .first::<Clip>(ctx, "/helix/clips", "id", clip_id)
            .await?
            .ok_or_else(|| TaskError::domain("No results"))?;
        ctx.reply(format_reply(Some(LABEL), format_clip(&clip)));
        Ok(())
    }

    async fn describe_video(&self, ctx: &HandlerContext, video_id: &str) -> TaskResult<()> {
        let video = self
            .first::<Video>(ctx, "/helix/videos", "id", video_id)
            .await?
            .ok_or_else(|| TaskError::domain("No results"))?;
        ctx.reply(format_reply(Some(LABEL), format_video(&video)));
        Ok(())
    }

    async fn on_url(self: Arc<Self>, ctx: HandlerContext, url: Url) -> TaskResult<()> {
        let path = url.path();
        if let Some(caps) = self.paths.clip.captures(path) {
            self.describe_clip(&ctx, &caps["clip_id"]).await
        } else if let Some(caps) = self.paths.video.captures(path) {
            self.describe_video(&ctx, &caps["video_id"]).await
        } else if let Some(caps) = self.paths.channel.captures(path) {
            self.describe_stream(&ctx, &caps["channel"]).await
        } else {
            Ok(())
        }
    }

    async fn on_clip_url(self: Arc<Self>, ctx: HandlerContext, url: Url) -> TaskResult<()> {
        let clip_id = url
            .path()
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        if clip_id.is_empty() {
            return Ok(());
        }
        self.describe_clip(&ctx, clip_id).await
    }
}

impl Plugin for Twitch {
    const NAME: &'static str = "twitch";
    const VERSION: &'static str = "1.0";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "Twitch.tv integration";

    fn load(config: &PluginConfig) -> LoadResult<Self> {
        let paths = Paths::compile().map_err(|e| LoadError::invalid(Self::NAME, e.to_string()))?;
        Ok(Self {
            client_id: config.require_or_env("client_id", "TWITCH_CLIENT_ID")?,
            client_secret: config.require_or_env("client_secret", "TWITCH_CLIENT_SECRET")?,
            api_url: config.get_str("api_url").unwrap_or(API_URL).to_string(),
            auth_url: config.get_str("auth_url").unwrap_or(AUTH_URL).to_string(),
            access_token: RwLock::new(None),
            paths,
        })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings
            .url(&["twitch.tv", "www.twitch.tv"], Self::on_url)
            .url(&["clips.twitch.tv"], Self::on_clip_url);
    }

    fn format_error(&self, err: &TaskError) -> String {
        match err {
            TaskError::Domain(message) => format_reply(Some(LABEL), message),
            other => format_reply(Some(LABEL), default_error_message(other)),
        }
    }
}

fn format_stream(stream: &Stream) -> String {
    format!(
        "{}:{} - Game:{} Viewers:{}",
        stream.user_login,
        value(format_args!(" {}", stream.title)),
        value(format_args!(" {}", stream.game_name)),
        value(format_args!(" {}", delimited(stream.viewer_count))),
    )
}

fn format_clip(clip: &Clip) -> String {
    format!(
        "“{}” is a clip of{} clipped by{} with{} views",
        value(&clip.title),
        value(format_args!(" {}", clip.broadcaster_name)),
        value(format_args!(" {}", clip.creator_name)),
        value(format_args!(" {}", delimited(clip.view_count))),
    )
}

fn format_video(video: &Video) -> String {
    format!(
        "“{}” is a video by{} with{} views",
        value(&video.title),
        value(format_args!(" {}", video.user_login)),
        value(format_args!(" {}", delimited(video.view_count))),
    )
}
