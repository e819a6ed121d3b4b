//! Example scripts for the Lark script host.
//!
//! | Script | Binds |
//! |--------|-------|
//! | [`string_utils`] | `.rev`, `.len`, `.b`, `.count`, `.ord`, `.codepoints` |
//! | [`auth`] | `.reload` for admins |
//! | [`health`] | `.health [script]` |
//! | [`github`] | `.gh <query>` |
//! | [`thingiverse`] | `thingiverse.com/thing:<id>` links |
//! | [`twitch`] | `twitch.tv` and `clips.twitch.tv` links |
//! | [`google_maps`] | nothing; used by `isitopen` |
//! | [`isitopen`] | questions addressed to the bot |
//!
//! Register them all with [`SCRIPTS`]:
//!
//! ```rust,ignore
//! runtime.register_all(lark_scripts::SCRIPTS)?;
//! ```

use lark::framework::PluginDescriptor;

pub mod auth;
pub mod format;
pub mod github;
pub mod google_maps;
pub mod health;
pub mod isitopen;
pub mod string_utils;
pub mod thingiverse;
pub mod twitch;

#[cfg(test)]
mod testing;

/// Every script in this crate, in registration order.
pub static SCRIPTS: &[PluginDescriptor] = &[
    PluginDescriptor::of::<string_utils::StringUtils>(),
    PluginDescriptor::of::<auth::Auth>(),
    PluginDescriptor::of::<health::Health>(),
    PluginDescriptor::of::<github::Github>(),
    PluginDescriptor::of::<thingiverse::Thingiverse>(),
    PluginDescriptor::of::<twitch::Twitch>(),
    PluginDescriptor::of::<google_maps::GoogleMaps>(),
    PluginDescriptor::of::<isitopen::IsItOpen>(),
];
