//! Session-level directive matching.
//!
//! The home, exit, sleep, wake and interrupt checks form an ordered table of
//! (predicate, directive) rules. [`PhraseTable::evaluate`] returns the
//! directive of the first rule that matches, so precedence is the table
//! order:
//!
//! | # | Directive | Match |
//! |---|-----------|-------|
//! | 1 | `GoHome` | whole utterance equals a home phrase |
//! | 2 | `Exit` | whole utterance equals an exit phrase |
//! | 3 | `Sleep` | a sleep phrase occurs on word boundaries |
//! | 4 | `Wake` | a wake phrase occurs on word boundaries |
//! | 5 | `Interrupt` | whole utterance equals an interrupt phrase or the wake word |
//! | 6 | `Interrupt` + remainder | utterance starts with the wake word and is short |
//!
//! A remainder that is itself an interrupt phrase ("Jarvis, stop") carries
//! nothing to process, so rule 6 reports it as a bare interruption.
//!
//! All comparisons are case-insensitive and ignore punctuation. The phrase
//! lists come from [`PhraseConfig`] so recognizer-specific mishearings can be
//! swapped out without touching code.

use crate::config::PhraseConfig;
use crate::text;

/// A session-level command recognized from raw input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Navigate the presentation layer home.
    GoHome,
    /// Quit the assistant.
    Exit,
    /// Go to sleep.
    Sleep,
    /// Wake up.
    Wake,
    /// Stop speech output.
    ///
    /// `remainder` is the command that followed the wake word, if any; it
    /// still needs processing after the interruption.
    Interrupt { remainder: Option<String> },
}

/// Directive category without payload, used to describe table order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectiveKind {
    GoHome,
    Exit,
    Sleep,
    Wake,
    Interrupt,
}

#[derive(Debug, Clone)]
enum Matcher {
    /// Whole utterance equals one phrase.
    Exact(Vec<String>),
    /// One phrase occurs on word boundaries.
    Contains(Vec<String>),
    /// Utterance starts with the wake word and has at most `max_words` words.
    /// A remainder equal to one of `interrupt` is dropped.
    WakePrefix {
        wake_word: String,
        max_words: usize,
        interrupt: Vec<String>,
    },
}

#[derive(Debug, Clone)]
struct PhraseRule {
    kind: DirectiveKind,
    matcher: Matcher,
}

impl PhraseRule {
    fn apply(&self, raw: &str, folded: &str) -> Option<Directive> {
        let matched = match &self.matcher {
            Matcher::Exact(phrases) => text::equals_any(folded, phrases),
            Matcher::Contains(phrases) => phrases.iter().any(|p| text::contains_phrase(folded, p)),
            Matcher::WakePrefix {
                wake_word,
                max_words,
                interrupt,
            } => {
                return wake_prefix_remainder(raw, folded, wake_word, *max_words).map(|rest| {
                    let remainder = (!text::equals_any(&rest, interrupt)).then_some(rest);
                    Directive::Interrupt { remainder }
                });
            }
        };
        if !matched {
            return None;
        }
        Some(match self.kind {
            DirectiveKind::GoHome => Directive::GoHome,
            DirectiveKind::Exit => Directive::Exit,
            DirectiveKind::Sleep => Directive::Sleep,
            DirectiveKind::Wake => Directive::Wake,
            DirectiveKind::Interrupt => Directive::Interrupt { remainder: None },
        })
    }
}

/// Text following a leading wake word, taken from the raw input so the
/// remainder keeps its original casing.
fn wake_prefix_remainder(
    raw: &str,
    folded: &str,
    wake_word: &str,
    max_words: usize,
) -> Option<String> {
    let wake_words = wake_word.split_whitespace().count();
    if wake_words == 0 {
        return None;
    }
    let word_count = folded.split_whitespace().count();
    if word_count <= wake_words || word_count > max_words {
        return None;
    }
    let leading = folded
        .split_whitespace()
        .take(wake_words)
        .collect::<Vec<_>>()
        .join(" ");
    if leading != wake_word {
        return None;
    }
    let rest = raw
        .split_whitespace()
        .skip(wake_words)
        .collect::<Vec<_>>()
        .join(" ");
    let rest = rest.trim_start_matches([',', '.', '!', '?', ' ']).to_owned();
    (!text::fold(&rest).is_empty()).then_some(rest)
}

/// Ordered directive rules built from configuration.
#[derive(Debug, Clone)]
pub struct PhraseTable {
    rules: Vec<PhraseRule>,
}

impl PhraseTable {
    /// Build the table from phrase lists and the wake word.
    pub fn new(config: &PhraseConfig, wake_word: &str) -> Self {
        let wake_word = text::fold(wake_word);
        let mut interrupt = config.interrupt.clone();
        if !wake_word.is_empty() {
            interrupt.push(wake_word.clone());
        }

        let rules = vec![
            PhraseRule {
                kind: DirectiveKind::GoHome,
                matcher: Matcher::Exact(config.home.clone()),
            },
            PhraseRule {
                kind: DirectiveKind::Exit,
                matcher: Matcher::Exact(config.exit.clone()),
            },
            PhraseRule {
                kind: DirectiveKind::Sleep,
                matcher: Matcher::Contains(config.sleep.clone()),
            },
            PhraseRule {
                kind: DirectiveKind::Wake,
                matcher: Matcher::Contains(config.wake.clone()),
            },
            PhraseRule {
                kind: DirectiveKind::Interrupt,
                matcher: Matcher::Exact(interrupt.clone()),
            },
            PhraseRule {
                kind: DirectiveKind::Interrupt,
                matcher: Matcher::WakePrefix {
                    wake_word,
                    max_words: config.max_wake_prefix_words,
                    interrupt,
                },
            },
        ];
        Self { rules }
    }

    /// The directive of the first matching rule, if any.
    pub fn evaluate(&self, raw: &str) -> Option<Directive> {
        let folded = text::fold(raw);
        if folded.is_empty() {
            return None;
        }
        self.rules.iter().find_map(|rule| rule.apply(raw, &folded))
    }

    /// Rule kinds in evaluation order.
    pub fn order(&self) -> Vec<DirectiveKind> {
        self.rules.iter().map(|r| r.kind).collect()
    }
}

impl Default for PhraseTable {
    fn default() -> Self {
        Self::new(&PhraseConfig::default(), "jarvis")
    }
}
