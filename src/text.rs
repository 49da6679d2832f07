//! Text helpers shared by phrase matching, command normalization and the
//! listening loop.

/// Words that start a question. Recognized speech containing one of them is
/// terminated with `?` by [`polish_transcript`].
const QUESTION_WORDS: &[&str] = &[
    "how", "what", "who", "where", "when", "why", "which", "whose", "whom", "what's", "where's",
    "how's", "can you",
];

/// Strip punctuation that STT inserts (commas, periods, etc.) so that
/// phrase matching is resilient to transcription formatting differences.
/// For example, "that will do, jarvis" → "that will do jarvis".
pub fn strip_punctuation(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lower-case and strip punctuation: the canonical form every keyword
/// comparison runs against.
pub fn fold(text: &str) -> String {
    strip_punctuation(&text.to_lowercase())
}

/// Whether `phrase` occurs in `text` as a whole-word sequence.
///
/// Both arguments are folded first, so `"Can you close YouTube?"` contains
/// `"close youtube"` but `"stopwatch"` does not contain `"stop"`.
pub fn contains_phrase(text: &str, phrase: &str) -> bool {
    let words = fold(text);
    let needle = fold(phrase);
    if needle.is_empty() {
        return false;
    }
    let hay: Vec<&str> = words.split(' ').collect();
    let needle: Vec<&str> = needle.split(' ').collect();
    hay.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Whether any of `phrases` occurs in `text` as a whole-word sequence.
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| contains_phrase(text, p))
}

/// Whether the folded `text` equals one of the folded `phrases`.
pub fn equals_any<S: AsRef<str>>(text: &str, phrases: &[S]) -> bool {
    let folded = fold(text);
    !folded.is_empty() && phrases.iter().any(|p| fold(p.as_ref()) == folded)
}

/// Remove every occurrence of the given filler phrases (whole words only)
/// from already folded text.
pub fn remove_fillers(folded: &str, fillers: &[&str]) -> String {
    let mut words: Vec<&str> = folded.split_whitespace().collect();
    // Multi-word fillers first so "can you" is not left as a dangling "can".
    let mut ordered: Vec<Vec<&str>> = fillers
        .iter()
        .map(|f| f.split_whitespace().collect())
        .filter(|f: &Vec<&str>| !f.is_empty())
        .collect();
    ordered.sort_by_key(|f| std::cmp::Reverse(f.len()));

    for filler in &ordered {
        let mut i = 0;
        while i + filler.len() <= words.len() {
            if words[i..i + filler.len()] == filler[..] {
                words.drain(i..i + filler.len());
            } else {
                i += 1;
            }
        }
    }
    words.join(" ")
}

/// Tidy raw recognizer output: lower-case, capitalise, and end with `?` for
/// questions or `.` otherwise.
pub fn polish_transcript(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let body = lowered.trim_end_matches(['.', '?', '!']).trim_end();
    if body.is_empty() {
        return String::new();
    }

    let words: Vec<&str> = body.split_whitespace().collect();
    let is_question = QUESTION_WORDS.iter().any(|q| {
        let q: Vec<&str> = q.split_whitespace().collect();
        words.windows(q.len()).any(|w| w == q.as_slice())
    });

    let mut polished = capitalize(body);
    polished.push(if is_question { '?' } else { '.' });
    polished
}

/// Capitalize the first character of a string.
fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => {
            let mut result = c.to_uppercase().to_string();
            result.push_str(chars.as_str());
            result
        }
        None => String::new(),
    }
}
