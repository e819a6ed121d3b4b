//! Test host for the scripts: a dispatcher with a proxy-free HTTP client,
//! a reload hook, and a throwaway HTTP responder.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lark::core::{ChannelSink, ChatEvent, ReplyTarget, Scheduler, TaskResult, User};
use lark::framework::{
    Dispatcher, PluginConfigs, PluginDescriptor, Registry, ReloadHook, ReloadSummary, Services,
};
use lark::transport::HttpClient;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

struct Reloader {
    registry: Arc<Registry>,
    configs: PluginConfigs,
}

#[async_trait]
impl ReloadHook for Reloader {
    async fn reload(&self) -> TaskResult<ReloadSummary> {
        Ok(self.registry.reload(&self.configs))
    }
}

/// Loads `scripts` with the plugin sections in `configs`.
pub(crate) fn host(scripts: &[PluginDescriptor], configs: Value) -> Dispatcher {
    let configs: PluginConfigs = serde_json::from_value(configs).unwrap();
    let registry = Arc::new(Registry::default());
    for desc in scripts {
        registry.register(*desc).unwrap();
    }
    registry.load_all(&configs);

    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let http = HttpClient::from_client(client, Duration::from_secs(5));
    let hook = Arc::new(Reloader {
        registry: Arc::clone(&registry),
        configs,
    });
    let services = Services::new(http, "lark").with_reload_hook(hook);
    Dispatcher::new(Scheduler::new(), registry, services)
}

pub(crate) fn mk() -> User {
    User::new("mk", "mk", "maero.dk")
}

/// Dispatches `line` from `user` and returns every reply once all handlers finished.
pub(crate) async fn say_as(dispatcher: &Dispatcher, user: User, line: &str) -> Vec<String> {
    let (sink, mut rx) = ChannelSink::new();
    let event = ChatEvent::new(user, ReplyTarget::new("#lark", sink), line);
    for task in dispatcher.dispatch(event) {
        task.wait().await.unwrap();
    }
    let mut lines = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        lines.push(msg.text);
    }
    lines
}

pub(crate) async fn say(dispatcher: &Dispatcher, line: &str) -> Vec<String> {
    say_as(dispatcher, mk(), line).await
}

/// Serves every connection with `respond(request_head)` and returns the base URL.
pub(crate) async fn serve<F>(respond: F) -> String
where
    F: Fn(&str) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            tokio::spawn(async move {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&head).into_owned();
                let _ = socket.write_all(respond(&head).as_bytes()).await;
            });
        }
    });

    format!("http://{addr}")
}

/// Accepts connections and never answers them. Returns the base URL.
pub(crate) async fn hold() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{addr}")
}

pub(crate) fn reply(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// The request line of a request head, e.g. `GET /path?q=x HTTP/1.1`.
pub(crate) fn request_line(head: &str) -> &str {
    head.lines().next().unwrap_or_default()
}
