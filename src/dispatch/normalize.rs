//! Canonical automation commands.
//!
//! Users phrase the same request many ways ("can you close youtube please",
//! "close YouTube."). [`normalize`] rewrites raw text into the short
//! canonical command the automation handler understands. The same filler
//! removal and punctuation stripping apply to every rule, which keeps
//! `normalize(normalize(x)) == normalize(x)`.

use crate::text;

/// Words that close an application.
pub const CLOSE_WORDS: &[&str] = &["close", "exit", "quit", "stop"];
/// Words that open an application or site.
pub const OPEN_WORDS: &[&str] = &["open"];
/// Words that start playback.
pub const PLAY_WORDS: &[&str] = &["play"];
/// Words that start a web search.
pub const SEARCH_WORDS: &[&str] = &["search"];
/// System audio commands, in matching order.
pub const SYSTEM_COMMANDS: &[&str] = &["unmute", "mute", "volume up", "volume down"];
/// Words that, with an image noun, mark an image-generation request.
pub const IMAGE_VERBS: &[&str] = &["generate", "create", "make"];
/// Nouns that, with an image verb, mark an image-generation request.
pub const IMAGE_NOUNS: &[&str] = &["image", "picture", "photo"];

/// Politeness and article words dropped from command targets.
const FILLERS: &[&str] = &[
    "can you", "could you", "please", "for me", "for", "the", "a", "an", "can", "you", "me",
];

/// Platform names dropped from search queries; the prefix already names them.
const SEARCH_PLATFORMS: &[&str] = &["on youtube", "in youtube", "youtube", "on google", "google"];

/// Targets that always resolve to a fixed application name.
const FIXED_TARGETS: &[(&str, &str)] = &[("youtube", "youtube"), ("chrome", "chrome"), ("browser", "chrome")];

/// Whether the text asks for an image to be generated.
pub fn is_image_request(raw: &str) -> bool {
    text::contains_any(raw, IMAGE_VERBS) && text::contains_any(raw, IMAGE_NOUNS)
}

/// Rewrite raw text into a canonical command.
///
/// Precedence: close, open, play (unless it is an image request), search,
/// system audio, otherwise the text is returned unchanged.
pub fn normalize(raw: &str) -> String {
    let folded = text::fold(raw);

    if text::contains_any(&folded, CLOSE_WORDS) {
        return format!("close {}", close_target(&folded));
    }

    if let Some(target) = after_keyword(&folded, OPEN_WORDS) {
        return canonical("open", &target, &folded);
    }

    let mentions_image =
        text::contains_any(&folded, IMAGE_VERBS) || text::contains_any(&folded, IMAGE_NOUNS);
    if !mentions_image {
        if let Some(query) = after_keyword(&folded, PLAY_WORDS) {
            return canonical("play", &query, &folded);
        }
    }

    if let Some(query) = after_keyword(&folded, SEARCH_WORDS) {
        let query = text::remove_fillers(&query, SEARCH_PLATFORMS);
        let prefix = if text::contains_phrase(&folded, "youtube") {
            "youtube search"
        } else {
            "google search"
        };
        return canonical(prefix, &query, &folded);
    }

    if let Some(cmd) = SYSTEM_COMMANDS
        .iter()
        .find(|cmd| text::contains_phrase(&folded, cmd))
    {
        return format!("system {cmd}");
    }

    raw.to_owned()
}

/// Application named in a close request.
///
/// Known targets resolve to fixed names. Otherwise the words after the first
/// close word are used, then the last meaningful word, then `unknown`.
pub fn close_target(raw: &str) -> String {
    let folded = text::fold(raw);

    for (needle, name) in FIXED_TARGETS {
        if text::contains_phrase(&folded, needle) {
            return (*name).to_owned();
        }
    }

    if let Some(rest) = after_keyword(&folded, CLOSE_WORDS) {
        if !rest.is_empty() {
            return rest;
        }
    }

    folded
        .split_whitespace()
        .rev()
        .find(|w| !CLOSE_WORDS.contains(w) && !FILLERS.contains(w))
        .map_or_else(|| "unknown".to_owned(), str::to_owned)
}

/// Filler-stripped words following the first occurrence of any keyword.
///
/// `None` when no keyword is present.
fn after_keyword(folded: &str, keywords: &[&str]) -> Option<String> {
    let words: Vec<&str> = folded.split_whitespace().collect();
    let pos = words.iter().position(|w| keywords.contains(w))?;
    let rest = words[pos + 1..].join(" ");
    Some(text::remove_fillers(&rest, FILLERS))
}

fn canonical(prefix: &str, target: &str, folded: &str) -> String {
    if target.is_empty() {
        folded.to_owned()
    } else {
        format!("{prefix} {target}")
    }
}
