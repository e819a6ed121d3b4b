//! IRC formatting helpers shared by the scripts.
//!
//! Every script prefixes its replies the same way: a teal `>` marker, the
//! script's label in bold, then the message in teal with values reset to the
//! default colour.
//!
//! ```text
//! \x0310>\x0F\x02 GitHub:\x02\x0310 rust-lang/rust -\x0f https://github.com/rust-lang/rust
//! ```

/// Toggles bold.
pub const BOLD: &str = "\x02";
/// Resets all formatting.
pub const RESET: &str = "\x0f";
/// Teal foreground, the scripts' accent colour.
pub const TEAL: &str = "\x0310";

/// Formats a reply, labelled when `label` is given.
pub fn format_reply(label: Option<&str>, message: impl AsRef<str>) -> String {
    let message = message.as_ref();
    match label {
        Some(label) => format!("{TEAL}>{RESET}{BOLD} {label}:{BOLD}{TEAL} {message}"),
        None => format!("{TEAL}> {message}"),
    }
}

/// `Usage:` line for a command invoked without arguments.
pub fn usage(example: &str) -> String {
    format!("Usage:{RESET} {example}")
}

/// Highlights `value` inside teal text.
pub fn value(value: impl std::fmt::Display) -> String {
    format!("{RESET}{value}{TEAL}")
}

/// Formats an integer with `,` thousands separators.
pub fn delimited(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Picks the singular or plural noun for `count`.
pub fn pluralize<'a>(count: u64, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}
