//! Command router.
//!
//! Maps one chat line to every binding it triggers:
//!
//! ```text
//! ".gh lark https://twitch.tv/foo"
//!   ├── command  gh   (args: "lark https://twitch.tv/foo")
//!   ├── url      twitch.tv  → https://twitch.tv/foo
//!   └── message  (every message binding, registration order)
//! ```
//!
//! A line is a command only if it starts with the prefix character,
//! immediately followed by the command name. The name runs up to the first
//! whitespace and is matched exactly and case-sensitively.
//!
//! Every line, command or not, is scanned for absolute `http`/`https` URLs;
//! each URL whose host matches a URL binding is routed on its own.

use std::collections::HashMap;
use std::fmt;

use lark_core::TaskResult;
use tower::ServiceExt;
use url::Url;

use crate::context::HandlerContext;
use crate::error::{LoadError, LoadResult};
use crate::handler::HandlerService;
use crate::plugin::PluginHandle;

/// The default command prefix.
pub const DEFAULT_PREFIX: char = '.';

// =============================================================================
// Parsing
// =============================================================================

/// A command line split into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand<'a> {
    /// The token including the prefix, e.g. `.rev`.
    pub token: &'a str,
    /// The token without the prefix, e.g. `rev`.
    pub name: &'a str,
    /// Trimmed remainder, `None` when empty.
    pub args: Option<&'a str>,
}

/// Splits `line` into command token and arguments.
///
/// Returns `None` unless the line starts with `prefix` immediately followed
/// by at least one non-whitespace character.
pub fn parse_command(prefix: char, line: &str) -> Option<ParsedCommand<'_>> {
    let rest = line.strip_prefix(prefix)?;
    let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let name = &rest[..end];
    if name.is_empty() {
        return None;
    }
    let args = rest[end..].trim();

    Some(ParsedCommand {
        token: &line[..prefix.len_utf8() + end],
        name,
        args: (!args.is_empty()).then_some(args),
    })
}

/// Characters stripped from the end of a URL candidate.
fn is_trailing_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ',' | ';' | ':' | '!' | '?' | ')' | ']' | '}' | '>' | '"' | '\''
    )
}

/// Extracts every absolute `http`/`https` URL from `line`, in order.
pub fn extract_urls(line: &str) -> Vec<Url> {
    line.split_whitespace()
        .filter_map(|word| {
            let start = [word.find("http://"), word.find("https://")]
                .into_iter()
                .flatten()
                .min()?;
            let candidate = word[start..].trim_end_matches(is_trailing_punctuation);
            let url = Url::parse(candidate).ok()?;
            let web = matches!(url.scheme(), "http" | "https");
            (web && url.host_str().is_some()).then_some(url)
        })
        .collect()
}

// =============================================================================
// Routing table
// =============================================================================

struct Route<A> {
    plugin: PluginHandle,
    token: String,
    handler: HandlerService<A>,
}

impl<A> Clone for Route<A> {
    fn clone(&self) -> Self {
        Self {
            plugin: PluginHandle::clone(&self.plugin),
            token: self.token.clone(),
            handler: self.handler.clone(),
        }
    }
}

/// A handler invocation prepared by the router.
pub(crate) enum Call {
    Command(HandlerService<Option<String>>, Option<String>),
    Url(HandlerService<Url>, Url),
    Message(HandlerService<String>, String),
}

impl Call {
    pub(crate) async fn invoke(self, ctx: HandlerContext) -> TaskResult<()> {
        match self {
            Call::Command(svc, args) => svc.oneshot((ctx, args)).await,
            Call::Url(svc, url) => svc.oneshot((ctx, url)).await,
            Call::Message(svc, line) => svc.oneshot((ctx, line)).await,
        }
    }
}

/// One binding triggered by a line.
pub struct RouteMatch {
    plugin: PluginHandle,
    label: String,
    pub(crate) call: Call,
}

impl RouteMatch {
    /// The plugin owning the binding.
    pub fn plugin(&self) -> &PluginHandle {
        &self.plugin
    }

    /// Human-readable binding label: `.rev`, `url:twitch.tv`, or `message`.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn into_parts(self) -> (PluginHandle, String, Call) {
        (self.plugin, self.label, self.call)
    }
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("plugin", &self.plugin.name())
            .field("label", &self.label)
            .finish()
    }
}

/// Routing table of one registry generation.
pub struct Router {
    prefix: char,
    commands: HashMap<String, Route<Option<String>>>,
    hosts: HashMap<String, Route<Url>>,
    messages: Vec<Route<String>>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl Router {
    /// Creates an empty table for the given command prefix.
    pub fn new(prefix: char) -> Self {
        Self {
            prefix,
            commands: HashMap::new(),
            hosts: HashMap::new(),
            messages: Vec::new(),
        }
    }

    /// The command prefix.
    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Adds every binding of `plugin`.
    ///
    /// If any command name or hostname is already owned by another plugin,
    /// nothing is added and [`LoadError::Conflict`] is returned: the first
    /// registrant keeps the binding.
    pub(crate) fn add(&mut self, plugin: &PluginHandle) -> LoadResult<()> {
        let bindings = &plugin.bindings;

        for binding in &bindings.commands {
            if let Some(owner) = self.commands.get(&binding.name) {
                return Err(conflict(plugin, &binding.token, &owner.plugin));
            }
        }
        for binding in &bindings.urls {
            for host in &binding.hosts {
                if let Some(owner) = self.hosts.get(host) {
                    return Err(conflict(plugin, host, &owner.plugin));
                }
            }
        }

        for binding in &bindings.commands {
            self.commands.insert(
                binding.name.clone(),
                Route {
                    plugin: PluginHandle::clone(plugin),
                    token: binding.token.clone(),
                    handler: binding.handler.clone(),
                },
            );
        }
        for binding in &bindings.urls {
            for host in &binding.hosts {
                self.hosts.insert(
                    host.clone(),
                    Route {
                        plugin: PluginHandle::clone(plugin),
                        token: format!("url:{host}"),
                        handler: binding.handler.clone(),
                    },
                );
            }
        }
        for binding in &bindings.messages {
            self.messages.push(Route {
                plugin: PluginHandle::clone(plugin),
                token: "message".to_string(),
                handler: binding.handler.clone(),
            });
        }

        Ok(())
    }

    /// Returns the plugin owning a command name (without prefix).
    pub fn command_owner(&self, name: &str) -> Option<&str> {
        self.commands.get(name).map(|r| r.plugin.name())
    }

    /// Returns the plugin owning a hostname.
    pub fn host_owner(&self, host: &str) -> Option<&str> {
        self.hosts
            .get(&host.to_ascii_lowercase())
            .map(|r| r.plugin.name())
    }

    /// Returns every binding triggered by `line`: the command (if any), then
    /// one match per routed URL, then all message bindings.
    pub fn route(&self, line: &str) -> Vec<RouteMatch> {
        let mut matches = Vec::new();

        if let Some(cmd) = parse_command(self.prefix, line)
            && let Some(route) = self.commands.get(cmd.name)
        {
            let route = route.clone();
            matches.push(RouteMatch {
                plugin: route.plugin,
                label: cmd.token.to_string(),
                call: Call::Command(route.handler, cmd.args.map(str::to_string)),
            });
        }

        for url in extract_urls(line) {
            let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
                continue;
            };
            if let Some(route) = self.hosts.get(&host) {
                let route = route.clone();
                matches.push(RouteMatch {
                    plugin: route.plugin,
                    label: route.token,
                    call: Call::Url(route.handler, url),
                });
            }
        }

        for route in &self.messages {
            let route = route.clone();
            matches.push(RouteMatch {
                plugin: route.plugin,
                label: route.token,
                call: Call::Message(route.handler, line.to_string()),
            });
        }

        matches
    }
}

fn conflict(plugin: &PluginHandle, binding: &str, owner: &PluginHandle) -> LoadError {
    LoadError::Conflict {
        plugin: plugin.name().to_string(),
        binding: binding.to_string(),
        owner: owner.name().to_string(),
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("prefix", &self.prefix)
            .field("commands", &self.commands.len())
            .field("hosts", &self.hosts.len())
            .field("messages", &self.messages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PluginConfigs, Registry};
    use crate::testing::FIXTURES;

    #[test]
    fn test_parse_command_token_and_args() {
        let cmd = parse_command('.', ".rev  hello ").unwrap();
        assert_eq!(cmd.token, ".rev");
        assert_eq!(cmd.name, "rev");
        assert_eq!(cmd.args, Some("hello"));

        let cmd = parse_command('.', ".gh   rust   lang").unwrap();
        assert_eq!(cmd.args, Some("rust   lang"));

        let cmd = parse_command('.', ".health").unwrap();
        assert_eq!(cmd.args, None);
        let cmd = parse_command('.', ".health   ").unwrap();
        assert_eq!(cmd.args, None);
    }

    #[test]
    fn test_parse_command_requires_leading_prefix() {
        assert!(parse_command('.', "rev hello").is_none());
        assert!(parse_command('.', " .rev hello").is_none());
        assert!(parse_command('.', ". rev").is_none());
        assert!(parse_command('.', ".").is_none());
        assert_eq!(parse_command('!', "!rev x").unwrap().token, "!rev");
    }

    #[test]
    fn test_extract_urls() {
        let urls = extract_urls(
            "see https://example.com/thing:42, (http://twitch.tv/foo) and ftp://nope.org or www.bare.com",
        );
        let urls: Vec<_> = urls.iter().map(Url::as_str).collect();
        assert_eq!(
            urls,
            vec!["https://example.com/thing:42", "http://twitch.tv/foo"]
        );

        let url = &extract_urls("https://example.com/thing:42")[0];
        assert_eq!(url.path(), "/thing:42");
        assert!(extract_urls("https:// nothing here").is_empty());
    }

    #[test]
    fn test_route_order_and_labels() {
        let registry = Registry::default();
        for desc in FIXTURES {
            registry.register(*desc).unwrap();
        }
        registry.load_all(&PluginConfigs::new());
        let snapshot = registry.snapshot();

        let matches = snapshot
            .router()
            .route(".len https://www.example.com/thing:1 https://slow.test/1");
        let labels: Vec<_> = matches
            .iter()
            .map(|m| (m.plugin().name(), m.label()))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("things", ".len"),
                ("things", "url:www.example.com"),
                ("slow", "url:slow.test"),
                ("counter", "message"),
            ]
        );
        assert_eq!(snapshot.router().host_owner("WWW.EXAMPLE.COM"), Some("things"));
    }

    #[test]
    fn test_command_match_is_case_sensitive() {
        let registry = Registry::default();
        for desc in FIXTURES {
            registry.register(*desc).unwrap();
        }
        registry.load_all(&PluginConfigs::new());

        let matches = registry.snapshot().router().route(".LEN hello");
        assert!(matches.iter().all(|m| m.label() == "message"));
    }
}
