//! String utilities: length, reversing, byte escapes and code points.
//!
//! | Command | Reply |
//! |---------|-------|
//! | `.rev <string>` | the string reversed |
//! | `.len <string>` | number of characters |
//! | `.b <chars..>` | the UTF-8 bytes, non-ASCII escaped as `\xNN` |
//! | `.count <chars> <string>` | occurrences of any of `chars` in `string` |
//! | `.ord <chars..>` / `.codepoints <chars..>` | code point of each character |

use std::fmt::Write;
use std::sync::Arc;

use lark::prelude::*;

use crate::format::{format_reply, usage};

pub struct StringUtils;

impl StringUtils {
    fn say(ctx: &HandlerContext, message: impl AsRef<str>) {
        ctx.reply(format_reply(None, message));
    }

    /// Replies with usage and returns `None` when `args` is missing.
    fn args_or_usage(ctx: &HandlerContext, args: Option<String>, example: &str) -> Option<String> {
        if args.is_none() {
            Self::say(ctx, usage(example));
        }
        args
    }

    async fn rev(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        if let Some(text) = Self::args_or_usage(&ctx, args, ".rev <string>") {
            Self::say(&ctx, text.chars().rev().collect::<String>());
        }
        Ok(())
    }

    async fn len(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        if let Some(text) = Self::args_or_usage(&ctx, args, ".len <string>") {
            Self::say(&ctx, text.chars().count().to_string());
        }
        Ok(())
    }

    async fn bytes(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        if let Some(text) = Self::args_or_usage(&ctx, args, ".b <chars..>") {
            Self::say(&ctx, escape_bytes(&text));
        }
        Ok(())
    }

    async fn count(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        let Some((set, text)) = args.as_deref().and_then(|a| a.split_once(' ')) else {
            Self::say(&ctx, usage(".count <char> <string>"));
            return Ok(());
        };
        let n = text.chars().filter(|c| set.contains(*c)).count();
        Self::say(&ctx, n.to_string());
        Ok(())
    }

    async fn ord(self: Arc<Self>, ctx: HandlerContext, args: Option<String>) -> TaskResult<()> {
        if let Some(text) = Self::args_or_usage(&ctx, args, ".ord <chars..>") {
            Self::say(&ctx, code_points(&text));
        }
        Ok(())
    }

    async fn codepoints(
        self: Arc<Self>,
        ctx: HandlerContext,
        args: Option<String>,
    ) -> TaskResult<()> {
        if let Some(text) = Self::args_or_usage(&ctx, args, ".codepoints <chars..>") {
            Self::say(&ctx, code_points(&text));
        }
        Ok(())
    }
}

impl Plugin for StringUtils {
    const NAME: &'static str = "string_utils";
    const VERSION: &'static str = "1.0";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "String utilities such as string length, reversing, etc.";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        Ok(StringUtils)
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings
            .command(".rev", Self::rev)
            .command(".len", Self::len)
            .command(".b", Self::bytes)
            .command(".count", Self::count)
            .command(".ord", Self::ord)
            .command(".codepoints", Self::codepoints);
    }
}

/// Quoted byte string with printable ASCII kept and everything else as `\xNN`.
fn escape_bytes(text: &str) -> String {
    let mut out = String::from("\"");
    for &b in text.as_bytes() {
        match b {
            b'"' | b'\\' => {
                out.push('\\');
                out.push(b as char);
            }
            0x20..=0x7e => out.push(b as char),
            _ => {
                let _ = write!(out, "\\x{b:02X}");
            }
        }
    }
    out.push('"');
    out
}

fn code_points(text: &str) -> String {
    text.chars()
        .map(|c| u32::from(c).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
