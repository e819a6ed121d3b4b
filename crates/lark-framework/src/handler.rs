//! Handler bindings.
//!
//! A plugin declares its handlers through [`Bindings`] inside
//! [`Plugin::register`](crate::Plugin::register). Every handler is an async
//! function receiving the plugin instance, a [`HandlerContext`] and one
//! binding-specific argument:
//!
//! | Binding | Argument |
//! |---------|----------|
//! | [`command`](Bindings::command) | `Option<String>`: trimmed text after the token, `None` if empty |
//! | [`url`](Bindings::url) | [`Url`]: the parsed URL whose host matched |
//! | [`message`](Bindings::message) | `String`: the raw line |
//!
//! Handlers are stored type-erased as tower services so the router can hold
//! handlers from many plugin types side by side.

use std::future::Future;
use std::sync::Arc;

use lark_core::{TaskError, TaskResult};
use tower::service_fn;
use tower::util::BoxCloneSyncService;
use url::Url;

use crate::context::HandlerContext;
use crate::error::{LoadError, LoadResult};
use crate::plugin::Plugin;

/// A type-erased handler taking argument `A`.
pub(crate) type HandlerService<A> = BoxCloneSyncService<(HandlerContext, A), (), TaskError>;

pub(crate) struct CommandBinding {
    /// Command name without its prefix character.
    pub(crate) name: String,
    /// The token as written at registration (e.g. `.rev`).
    pub(crate) token: String,
    pub(crate) handler: HandlerService<Option<String>>,
}

pub(crate) struct UrlBinding {
    /// Lowercased hostnames.
    pub(crate) hosts: Vec<String>,
    pub(crate) handler: HandlerService<Url>,
}

pub(crate) struct MessageBinding {
    pub(crate) handler: HandlerService<String>,
}

/// All bindings of one loaded plugin, in registration order.
#[derive(Default)]
pub(crate) struct PluginBindings {
    pub(crate) commands: Vec<CommandBinding>,
    pub(crate) urls: Vec<UrlBinding>,
    pub(crate) messages: Vec<MessageBinding>,
}

/// Collects a plugin's bindings during [`Plugin::register`].
///
/// Binding mistakes inside one plugin (a token bound twice, an empty token)
/// are recorded and fail that plugin's load with a [`LoadError`].
pub struct Bindings<P> {
    plugin: Arc<P>,
    bindings: PluginBindings,
    error: Option<LoadError>,
}

impl<P: Plugin> Bindings<P> {
    pub(crate) fn new(plugin: Arc<P>) -> Self {
        Self {
            plugin,
            bindings: PluginBindings::default(),
            error: None,
        }
    }

    /// The plugin instance being registered.
    pub fn plugin(&self) -> &Arc<P> {
        &self.plugin
    }

    /// Binds a command token such as `.rev`.
    ///
    /// The leading prefix character is not part of the match key: the router
    /// accepts the command with whatever prefix the host is configured for.
    pub fn command<F, Fut>(&mut self, token: &str, handler: F) -> &mut Self
    where
        F: Fn(Arc<P>, HandlerContext, Option<String>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        let name = command_name(token);
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            self.fail(LoadError::invalid(
                P::NAME,
                format!("'{token}' is not a valid command token"),
            ));
            return self;
        }
        if self.bindings.commands.iter().any(|b| b.name == name) {
            self.fail(LoadError::DuplicateBinding {
                plugin: P::NAME.to_string(),
                binding: token.to_string(),
            });
            return self;
        }

        let handler = erase(Arc::clone(&self.plugin), handler);
        self.bindings.commands.push(CommandBinding {
            name: name.to_string(),
            token: token.to_string(),
            handler,
        });
        self
    }

    /// Binds one handler to a set of hostnames, matched exactly and
    /// case-insensitively.
    pub fn url<F, Fut>(&mut self, hosts: &[&str], handler: F) -> &mut Self
    where
        F: Fn(Arc<P>, HandlerContext, Url) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        let mut lowered: Vec<String> = Vec::with_capacity(hosts.len());
        for host in hosts {
            let host = host.to_ascii_lowercase();
            let taken = lowered.contains(&host)
                || self.bindings.urls.iter().any(|b| b.hosts.contains(&host));
            if taken {
                self.fail(LoadError::DuplicateBinding {
                    plugin: P::NAME.to_string(),
                    binding: host,
                });
                return self;
            }
            lowered.push(host);
        }
        if lowered.is_empty() {
            self.fail(LoadError::invalid(P::NAME, "url binding without hostnames"));
            return self;
        }

        let handler = erase(Arc::clone(&self.plugin), handler);
        self.bindings.urls.push(UrlBinding {
            hosts: lowered,
            handler,
        });
        self
    }

    /// Binds a handler invoked for every chat line.
    pub fn message<F, Fut>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(Arc<P>, HandlerContext, String) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = TaskResult<()>> + Send + 'static,
    {
        let handler = erase(Arc::clone(&self.plugin), handler);
        self.bindings.messages.push(MessageBinding { handler });
        self
    }

    fn fail(&mut self, err: LoadError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    pub(crate) fn finish(self) -> LoadResult<PluginBindings> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.bindings),
        }
    }
}

/// Strips a leading punctuation prefix (`.rev` → `rev`).
pub(crate) fn command_name(token: &str) -> &str {
    match token.chars().next() {
        Some(c) if c.is_ascii_punctuation() => &token[c.len_utf8()..],
        _ => token,
    }
}

fn erase<P, A, F, Fut>(plugin: Arc<P>, handler: F) -> HandlerService<A>
where
    P: Send + Sync + 'static,
    A: Send + 'static,
    F: Fn(Arc<P>, HandlerContext, A) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = TaskResult<()>> + Send + 'static,
{
    BoxCloneSyncService::new(service_fn(move |(ctx, arg): (HandlerContext, A)| {
        handler(Arc::clone(&plugin), ctx, arg)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginConfig;

    struct Probe;

    impl Plugin for Probe {
        const NAME: &'static str = "probe";

        fn load(_config: &PluginConfig) -> LoadResult<Self> {
            Ok(Probe)
        }

        fn register(_bindings: &mut Bindings<Self>) {}
    }

    async fn noop<A>(_: Arc<Probe>, _: HandlerContext, _: A) -> TaskResult<()> {
        Ok(())
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name(".rev"), "rev");
        assert_eq!(command_name("!gh"), "gh");
        assert_eq!(command_name("health"), "health");
    }

    #[test]
    fn test_duplicate_command_in_one_plugin() {
        let mut bindings = Bindings::new(Arc::new(Probe));
        bindings.command(".rev", noop).command(".rev", noop);

        assert_eq!(
            bindings.finish().err(),
            Some(LoadError::DuplicateBinding {
                plugin: "probe".to_string(),
                binding: ".rev".to_string(),
            })
        );
    }

    #[test]
    fn test_duplicate_host_is_case_insensitive() {
        let mut bindings = Bindings::new(Arc::new(Probe));
        bindings
            .url(&["twitch.tv", "www.twitch.tv"], noop)
            .url(&["WWW.Twitch.TV"], noop);

        assert!(matches!(
            bindings.finish(),
            Err(LoadError::DuplicateBinding { ref binding, .. }) if binding == "www.twitch.tv"
        ));
    }

    #[test]
    fn test_invalid_token() {
        let mut bindings = Bindings::new(Arc::new(Probe));
        bindings.command(".", noop);
        assert!(matches!(bindings.finish(), Err(LoadError::Invalid { .. })));
    }

    #[test]
    fn test_bindings_kept_in_order() {
        let mut bindings = Bindings::new(Arc::new(Probe));
        bindings
            .command(".b", noop)
            .command(".len", noop)
            .url(&["Example.com"], noop)
            .message(noop);

        let bindings = bindings.finish().unwrap();
        let tokens: Vec<_> = bindings.commands.iter().map(|b| b.token.as_str()).collect();
        assert_eq!(tokens, vec![".b", ".len"]);
        assert_eq!(bindings.urls[0].hosts, vec!["example.com"]);
        assert_eq!(bindings.messages.len(), 1);
    }
}
