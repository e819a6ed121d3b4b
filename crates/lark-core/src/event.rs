//! Chat event model and the reply sink contract.
//!
//! The IRC connection itself is owned by an external client library. It feeds
//! the host one [`ChatEvent`] per inbound line and drains outbound text
//! through a [`ReplySink`] implementation. Handlers never see the sink
//! directly; they reply through the event's [`ReplyTarget`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

// =============================================================================
// User
// =============================================================================

/// The sender of a chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Nickname.
    pub nick: String,
    /// Ident (user name) part of the hostmask.
    pub ident: String,
    /// Host part of the hostmask.
    pub host: String,
}

impl User {
    /// Creates a user from its hostmask components.
    pub fn new(nick: impl Into<String>, ident: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            ident: ident.into(),
            host: host.into(),
        }
    }

    /// Parses an IRC message prefix of the form `nick!ident@host`.
    ///
    /// Missing parts are left empty, so a bare server name parses as a nick.
    pub fn from_prefix(prefix: &str) -> Self {
        let (nick, rest) = prefix.split_once('!').unwrap_or((prefix, ""));
        let (ident, host) = rest.split_once('@').unwrap_or((rest, ""));
        Self::new(nick, ident, host)
    }

    /// Returns the full `nick!ident@host` mask.
    pub fn mask(&self) -> String {
        format!("{}!{}@{}", self.nick, self.ident, self.host)
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nick)
    }
}

// =============================================================================
// Tags
// =============================================================================

/// IRCv3 message tags attached to an inbound line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Creates an empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a tag (builder style).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value of a tag.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the services account the sender is authenticated as, if any.
    pub fn account(&self) -> Option<&str> {
        self.get("account")
    }

    /// Returns `true` if no tags are present.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Tags {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// =============================================================================
// ReplySink / ReplyTarget
// =============================================================================

/// The outbound side of the chat transport.
///
/// `say` is fire-and-forget: it must not block and must preserve the order of
/// calls made for the same target.
pub trait ReplySink: Send + Sync {
    /// Queues `text` for delivery to `target` (a channel or a nick).
    fn say(&self, target: &str, text: &str);
}

/// Where a handler's output should be delivered.
#[derive(Clone)]
pub struct ReplyTarget {
    name: Arc<str>,
    sink: Arc<dyn ReplySink>,
}

impl ReplyTarget {
    /// Creates a reply target bound to `sink`.
    pub fn new(name: impl Into<Arc<str>>, sink: Arc<dyn ReplySink>) -> Self {
        Self {
            name: name.into(),
            sink,
        }
    }

    /// The channel or nick replies are sent to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` if the target is a channel rather than a private query.
    pub fn is_channel(&self) -> bool {
        self.name.starts_with(['#', '&'])
    }

    /// Sends one line of text to the target.
    pub fn say(&self, text: impl AsRef<str>) {
        self.sink.say(&self.name, text.as_ref());
    }
}

impl fmt::Debug for ReplyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyTarget")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// One queued outbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Channel or nick.
    pub target: String,
    /// Message text, IRC formatting codes included.
    pub text: String,
}

/// A [`ReplySink`] that forwards every line into an unbounded channel.
///
/// This is the usual bridge to an IRC client task, which drains the receiver
/// and writes `PRIVMSG` lines in order.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelSink {
    /// Creates a sink and the receiver that drains it.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl ReplySink for ChannelSink {
    fn say(&self, target: &str, text: &str) {
        let msg = OutboundMessage {
            target: target.to_string(),
            text: text.to_string(),
        };
        if self.tx.send(msg).is_err() {
            warn!(target = %target, "Reply dropped: transport receiver is closed");
        }
    }
}

// =============================================================================
// ChatEvent
// =============================================================================

/// One inbound chat line, immutable once dispatched.
#[derive(Debug, Clone)]
pub struct ChatEvent {
    /// The sender.
    pub user: User,
    /// Where replies go: the channel for channel messages, the sender for queries.
    pub target: ReplyTarget,
    /// The raw message text.
    pub line: String,
    /// Protocol metadata.
    pub tags: Tags,
}

impl ChatEvent {
    /// Creates an event without tags.
    pub fn new(user: User, target: ReplyTarget, line: impl Into<String>) -> Self {
        Self {
            user,
            target,
            line: line.into(),
            tags: Tags::new(),
        }
    }

    /// Attaches message tags.
    pub fn with_tags(mut self, tags: Tags) -> Self {
        self.tags = tags;
        self
    }
}
