//! Answers Danish questions about opening hours.
//!
//! Listens for messages addressed to the bot such as
//! `lark: hvornår åbner netto?` or `lark, har føtex åbent?` and looks the
//! place up through the `google_maps` script.

use std::sync::Arc;

use lark::framework::default_error_message;
use lark::prelude::*;
use regex::Regex;
use tracing::debug;

use crate::format::{BOLD, TEAL};
use crate::google_maps::{DayTime, GoogleMaps, Place};

/// What the user asked about a place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Question {
    OpeningTime,
    ClosingTime,
    IsOpen,
    IsClosed,
}

const PATTERNS: [(Question, &str); 4] = [
    (
        Question::OpeningTime,
        r"^(?P<nick>[^\s,:]+)[,:] (?:hvornår|hvad tid) åbner (?P<place>.*?)\?",
    ),
    (
        Question::ClosingTime,
        r"^(?P<nick>[^\s,:]+)[,:] (?:hvornår|hvad tid) lukker (?P<place>.*?)\?",
    ),
    (
        Question::IsOpen,
        r"^(?P<nick>[^\s,:]+)[,:] (?:har|er) (?P<place>.*?) åbent?\?",
    ),
    (
        Question::IsClosed,
        r"^(?P<nick>[^\s,:]+)[,:] (?:har|er) (?P<place>.*?) lukket\?",
    ),
];

pub struct IsItOpen {
    patterns: Vec<(Question, Regex)>,
}

impl IsItOpen {
    /// The question and place name if `line` asks `nickname` about one.
    pub fn extract_request(&self, line: &str, nickname: &str) -> Option<(Question, String)> {
        self.patterns.iter().find_map(|(question, pattern)| {
            let caps = pattern.captures(line)?;
            if !caps["nick"].eq_ignore_ascii_case(nickname) {
                return None;
            }
            Some((*question, caps["place"].to_string()))
        })
    }

    async fn find_place(
        &self,
        ctx: &HandlerContext,
        maps: &GoogleMaps,
        name: &str,
    ) -> TaskResult<Option<Place>> {
        debug!(place = name, "Searching for place");
        let places = maps.search_places(ctx, name).wait().await?;
        match places.first() {
            Some(place) => maps.place_details(ctx, place).wait().await,
            None => Ok(None),
        }
    }

    async fn message(self: Arc<Self>, ctx: HandlerContext, line: String) -> TaskResult<()> {
        let Some((question, name)) = self.extract_request(&line, ctx.nickname()) else {
            return Ok(());
        };
        let maps = ctx
            .lookup::<GoogleMaps>()
            .ok_or_else(|| TaskError::domain("google_maps is not loaded"))?;

        let place = self
            .find_place(&ctx, &maps, &name)
            .await?
            .ok_or_else(|| TaskError::domain("place not found"))?;
        ctx.reply(answer(question, &ctx.user().nick, &place, DayTime::now()));
        Ok(())
    }
}

impl Plugin for IsItOpen {
    const NAME: &'static str = "isitopen";
    const VERSION: &'static str = "0.2";
    const AUTHOR: &'static str = "Mikkel Kroman <mk@maero.dk>";
    const DESCRIPTION: &'static str = "Lets the user ask if a place is open";

    fn load(_config: &PluginConfig) -> LoadResult<Self> {
        let mut patterns = Vec::with_capacity(PATTERNS.len());
        for (question, pattern) in PATTERNS {
            let regex =
                Regex::new(pattern).map_err(|e| LoadError::invalid(Self::NAME, e.to_string()))?;
            patterns.push((question, regex));
        }
        Ok(Self { patterns })
    }

    fn register(bindings: &mut Bindings<Self>) {
        bindings.message(Self::message);
    }

    fn format_error(&self, err: &TaskError) -> String {
        match err {
            TaskError::Domain(message) => format!("{TEAL}Error: {message}"),
            other => format!("{TEAL}{}", default_error_message(other)),
        }
    }
}

/// The reply to `question` about `place` at `now`.
pub fn answer(question: Question, nick: &str, place: &Place, now: DayTime) -> String {
    let name = format!("{BOLD} {}{BOLD}", place.name);
    let hours = place.hours_on(now.weekday);
    let opening = place.opening_time(now.weekday).unwrap_or_default();
    let closing = place.closing_time(now.weekday).unwrap_or_default();
    let opens_later = hours.open.is_some_and(|open| open >= now.minutes);
    let has_both = hours.open.is_some() && hours.close.is_some();

    match question {
        Question::OpeningTime => {
            if place.always_open {
                format!("{nick}:{name} har døgnåbent")
            } else if place.is_open() {
                format!("{nick}:{name} har allerede åbent - de åbnede kl.{BOLD} {opening}{BOLD}")
            } else if hours.open.is_some() {
                format!("{nick}:{name} åbner kl.{BOLD} {opening}{BOLD}")
            } else {
                format!("{nick}: pas -{name} har ikke nogen åbningstid")
            }
        }
        Question::ClosingTime => {
            if place.always_open {
                format!("{nick}:{name} har døgnåbent")
            } else if place.is_open() {
                format!(
                    "{nick}:{name} lukker kl.{BOLD} {closing}{BOLD} - de åbnede kl.{BOLD} {opening}{BOLD}"
                )
            } else if has_both && opens_later {
                format!(
                    "{nick}:{name} lukker kl.{BOLD} {closing}{BOLD}, men de har ikke åbent endnu - de åbner først kl.{BOLD} {opening}{BOLD}"
                )
            } else if has_both {
                format!("{nick}:{name} har lukket for resten af dagen")
            } else {
                format!("{nick}: pas -{name} har ikke nogen lukketid")
            }
        }
        Question::IsOpen => {
            if place.always_open {
                format!("{nick}: ja,{name} har døgnåbent")
            } else if place.is_open() {
                format!("{nick}: ja,{name} åbnede kl.{BOLD} {opening}{BOLD} i dag")
            } else if has_both && opens_later {
                format!("{nick}: nej,{name} har lukket, men de åbner kl.{BOLD} {opening}")
            } else if has_both {
                format!("{nick}: nej,{name} har lukket for i dag")
            } else {
                format!("{nick}: pas -{name} har ikke nogen åben- og lukketid")
            }
        }
        Question::IsClosed => {
            if place.always_open {
                format!("{nick}: nej,{name} har døgnåbent")
            } else if place.is_open() {
                format!(
                    "{nick}: nej,{name} åbnede kl.{BOLD} {opening}{BOLD} og lukker kl.{BOLD} {closing}{BOLD} i dag"
                )
            } else if opens_later {
                format!("{nick}: ja,{name} har lukket, men de åbner kl.{BOLD} {opening}")
            } else {
                format!("{nick}: ja,{name} har lukket for i dag")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::google_maps::Hours;
    use crate::testing::{host, reply, request_line, say, serve};

    fn plugin() -> IsItOpen {
        IsItOpen::load(&PluginConfig::empty("isitopen")).unwrap()
    }

    /// Open 08:00 to 22:00 on Mondays only.
    fn netto(open_now: bool) -> Place {
        let mut hours = [None; 7];
        hours[1] = Some(Hours {
            open: Some(8 * 60),
            close: Some(22 * 60),
        });
        Place {
            id: "p1".to_string(),
            name: "Netto".to_string(),
            formatted_address: None,
            rating: None,
            url: None,
            open_now: Some(open_now),
            always_open: false,
            hours,
        }
    }

    #[test]
    fn test_extract_request() {
        let plugin = plugin();
        assert_eq!(
            plugin.extract_request("lark: hvornår åbner netto?", "lark"),
            Some((Question::OpeningTime, "netto".to_string()))
        );
        assert_eq!(
            plugin.extract_request("Lark, hvad tid lukker føtex i aarhus?", "lark"),
            Some((Question::ClosingTime, "føtex i aarhus".to_string()))
        );
        assert_eq!(
            plugin.extract_request("lark: har netto åbent?", "lark"),
            Some((Question::IsOpen, "netto".to_string()))
        );
        assert_eq!(
            plugin.extract_request("lark: er netto åben?", "lark"),
            Some((Question::IsOpen, "netto".to_string()))
        );
        assert_eq!(
            plugin.extract_request("lark: er netto lukket?", "lark"),
            Some((Question::IsClosed, "netto".to_string()))
        );
        assert_eq!(plugin.extract_request("other: har netto åbent?", "lark"), None);
        assert_eq!(plugin.extract_request("har netto åbent?", "lark"), None);
    }

    #[test]
    fn test_answers_while_open() {
        let monday_noon = DayTime::new(1, 12, 0);
        let place = netto(true);
        assert_eq!(
            answer(Question::IsOpen, "mk", &place, monday_noon),
            "mk: ja,\x02 Netto\x02 åbnede kl.\x02 08:00\x02 i dag"
        );
        assert_eq!(
            answer(Question::ClosingTime, "mk", &place, monday_noon),
            "mk:\x02 Netto\x02 lukker kl.\x02 22:00\x02 - de åbnede kl.\x02 08:00\x02"
        );
        assert_eq!(
            answer(Question::IsClosed, "mk", &place, monday_noon),
            "mk: nej,\x02 Netto\x02 åbnede kl.\x02 08:00\x02 og lukker kl.\x02 22:00\x02 i dag"
        );
    }

    #[test]
    fn test_answers_while_closed() {
        let place = netto(false);
        let monday_early = DayTime::new(1, 6, 30);
        let monday_late = DayTime::new(1, 23, 0);
        let sunday = DayTime::new(0, 12, 0);

        assert_eq!(
            answer(Question::IsOpen, "mk", &place, monday_early),
            "mk: nej,\x02 Netto\x02 har lukket, men de åbner kl.\x02 08:00"
        );
        assert_eq!(
            answer(Question::IsOpen, "mk", &place, monday_late),
            "mk: nej,\x02 Netto\x02 har lukket for i dag"
        );
        assert_eq!(
            answer(Question::IsOpen, "mk", &place, sunday),
            "mk: pas -\x02 Netto\x02 har ikke nogen åben- og lukketid"
        );
        assert_eq!(
            answer(Question::ClosingTime, "mk", &place, monday_early),
            "mk:\x02 Netto\x02 lukker kl.\x02 22:00\x02, men de har ikke åbent endnu - de åbner først kl.\x02 08:00\x02"
        );
        assert_eq!(
            answer(Question::ClosingTime, "mk", &place, monday_late),
            "mk:\x02 Netto\x02 har lukket for resten af dagen"
        );
        assert_eq!(
            answer(Question::OpeningTime, "mk", &place, monday_late),
            "mk:\x02 Netto\x02 åbner kl.\x02 08:00\x02"
        );
        assert_eq!(
            answer(Question::OpeningTime, "mk", &place, sunday),
            "mk: pas -\x02 Netto\x02 har ikke nogen åbningstid"
        );
        assert_eq!(
            answer(Question::IsClosed, "mk", &place, monday_late),
            "mk: ja,\x02 Netto\x02 har lukket for i dag"
        );
    }

    #[tokio::test]
    async fn test_asks_google_maps() {
        let api = serve(|head| {
            let line = request_line(head);
            if line.starts_with("GET /maps/api/place/textsearch/json?") && line.contains("query=tankstation") {
                reply(
                    "200 OK",
                    r#"{"status": "OK", "results": [{"place_id": "abc", "name": "Tankstation"}]}"#,
                )
            } else if line.starts_with("GET /maps/api/place/details/json?") && line.contains("placeid=abc") {
                reply(
                    "200 OK",
                    r#"{"status": "OK", "result": {"place_id": "abc", "name": "Tankstation", "opening_hours": {"open_now": true, "periods": [{"open": {"day": 0, "time": "0000"}}]}}}"#,
                )
            } else {
                reply("200 OK", r#"{"status": "ZERO_RESULTS", "results": []}"#)
            }
        })
        .await;
        let host = host(
            &[
                PluginDescriptor::of::<GoogleMaps>(),
                PluginDescriptor::of::<IsItOpen>(),
            ],
            json!({ "google_maps": { "api_key": "key", "api_url": api } }),
        );

        assert_eq!(
            say(&host, "lark: har tankstation åbent?").await,
            vec!["mk: ja,\x02 Tankstation\x02 har døgnåbent"]
        );
        assert_eq!(
            say(&host, "lark: har ingenting åbent?").await,
            vec!["\x0310Error: place not found"]
        );
        assert!(say(&host, "somebody: har tankstation åbent?").await.is_empty());
    }

    #[tokio::test]
    async fn test_without_google_maps() {
        let host = host(&[PluginDescriptor::of::<IsItOpen>()], json!({}));
        assert_eq!(
            say(&host, "lark: har netto åbent?").await,
            vec!["\x0310Error: google_maps is not loaded"]
        );
    }
}
