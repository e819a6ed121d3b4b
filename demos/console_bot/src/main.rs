//! Console Bot
//!
//! Drives the Lark script host from the terminal: every stdin line is a
//! channel message from one fixed user, every reply is printed to stdout.
//! Logs go to stderr unless the configuration says otherwise.
//!
//! ```text
//! $ cargo run --package lark-console-bot -- --nick mk
//! .rev hello
//! #lark <lark> > olleh
//! ```
//!
//! Configuration is read from `lark.toml` in the working directory (or
//! `--config`), with `LARK_*` environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::{StreamExt, stream};
use lark::prelude::*;
use lark::runtime::config::LogOutput;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How long queued replies may take to print after the runtime stopped.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(version, about = "Run the Lark script host against stdin")]
struct Args {
    /// Configuration file, instead of searching for lark.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Profile overlay, e.g. `dev` reads lark.dev.toml.
    #[arg(short, long)]
    profile: Option<String>,

    /// Nickname the console user speaks as.
    #[arg(long, default_value = "console")]
    nick: String,

    /// Channel the messages appear in.
    #[arg(long, default_value = "#lark")]
    channel: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut defaults = LarkConfig::default();
    defaults.logging.output = LogOutput::Stderr;

    let mut builder = Runtime::builder().merge(defaults);
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    let runtime = builder.build().context("failed to start the runtime")?;
    runtime
        .register_all(lark_scripts::SCRIPTS)
        .context("failed to register scripts")?;

    let nickname = runtime.config().irc.nickname.clone();
    let (sink, mut replies) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(msg) = replies.recv().await {
            println!("{} <{nickname}> {}", msg.target, msg.text);
        }
    });

    let user = User::new(args.nick, "console", "localhost");
    let target = ReplyTarget::new(args.channel, sink);
    info!(user = %user, channel = %target.name(), "Reading messages from stdin");

    let lines = BufReader::new(tokio::io::stdin()).lines();
    let events = stream::unfold(lines, |mut lines| async move {
        match lines.next_line().await {
            Ok(Some(line)) => Some((line, lines)),
            _ => None,
        }
    })
    .map(move |line| ChatEvent::new(user.clone(), target.clone(), line));

    runtime.run(events).await;

    drop(runtime);
    drain(printer, DRAIN_GRACE).await
}

/// Lets the printer flush queued replies, then stops it.
///
/// A handler task that outlived shutdown can still hold a reply target, so
/// the channel may never close on its own.
async fn drain(mut printer: JoinHandle<()>, grace: Duration) -> Result<()> {
    match tokio::time::timeout(grace, &mut printer).await {
        Ok(res) => res.context("reply printer failed"),
        Err(_) => {
            warn!("Reply channel still open after shutdown, dropping it");
            printer.abort();
            Ok(())
        }
    }
}
