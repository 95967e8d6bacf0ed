use std::sync::LazyLock;

use regex::Regex;

use crate::model::choice::Choice;

static BRACKET_QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"「([^」]+)」|『([^』]+)』").expect("bracket quote regex"));

static SQUARE_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]").expect("square bracket regex"));

static ATTACHMENT_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(?:img|image)").expect("attachment marker regex"));

static NUMBERED_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[.。)）、]\s*(.+)$").expect("numbered line regex"));

/// Find the options offered by a frame's text.
///
/// Families are tried in a fixed order: bracket quotes, then square
/// brackets, then numbered lines. The first family with more than one
/// match wins; a lone match is never a choice set.
pub fn detect_choices(text: &str) -> Vec<Choice> {
    let families: [fn(&str) -> Vec<Choice>; 3] = [bracket_quotes, square_brackets, numbered_lines];
    families
        .into_iter()
        .map(|family| family(text))
        .find(|choices| choices.len() > 1)
        .unwrap_or_default()
}

fn sequential(texts: impl Iterator<Item = String>) -> Vec<Choice> {
    texts
        .filter(|t| !t.is_empty())
        .zip(1..)
        .map(|(text, id)| Choice { id, text })
        .collect()
}

fn bracket_quotes(text: &str) -> Vec<Choice> {
    sequential(BRACKET_QUOTE_RE.captures_iter(text).filter_map(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
    }))
}

fn square_brackets(text: &str) -> Vec<Choice> {
    sequential(
        SQUARE_BRACKET_RE
            .captures_iter(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|inner| !ATTACHMENT_MARKER_RE.is_match(inner)),
    )
}

fn numbered_lines(text: &str) -> Vec<Choice> {
    text.lines()
        .filter_map(|line| {
            let caps = NUMBERED_LINE_RE.captures(line.trim())?;
            let id = caps[1].parse().ok()?;
            let text = caps[2].trim();
            (!text.is_empty()).then(|| Choice {
                id,
                text: text.to_string(),
            })
        })
        .collect()
}
