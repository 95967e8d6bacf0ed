use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::engine::markup::parse_markup;
use crate::engine::tokenizer::tokenize;
use crate::model::content::Token;
use crate::model::frame::{Frame, ImageRef};
use crate::model::transcript::{Transcript, TranscriptMessage};

static REASONING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<think(?:ing)?>.*?</think(?:ing)?>").expect("reasoning regex")
});

static OPEN_REASONING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<think(?:ing)?>.*$").expect("open reasoning regex"));

static IMAGE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)image###.*?###").expect("image marker regex"));

static REMNANT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</?(?:image|file_content|attachment_file)[^>]*>").expect("remnant regex")
});

// Tried in order; the first whose name passes validation wins.
static SPEAKER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r#"^([^:：\n]+?)[：:]\s*["「『]"#,
        r"^([^:：\n]+?)[：:]\s*\*",
        r"^([^:：\n]+?)[：:]\s*\(",
        r#"^([^:：\n]+?)[：:]\s*[^"「『*(]"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("speaker regex"))
    .collect()
});

static SPEAKER_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^:：\n]+?[：:]\s*").expect("speaker prefix regex"));

const MAX_SPEAKER_CHARS: usize = 20;

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('「', '」'), ('『', '』')];

/// Per-message inputs to [`parse_frames`].
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub initial_background: &'a ImageRef,
    pub default_speaker: Option<&'a str>,
    pub is_user: bool,
    /// First-class attachment; beats any inline image as the leading background.
    pub attachment: Option<&'a ImageRef>,
    pub message_index: usize,
}

/// Split a token stream into frames. Pure: the same tokens and context
/// always give the same frames.
pub fn parse_frames(tokens: &[Token], ctx: &ParseContext<'_>) -> Vec<Frame> {
    let mut background = ctx
        .attachment
        .cloned()
        .or_else(|| leading_image(tokens))
        .unwrap_or_else(|| ctx.initial_background.clone());
    let mut buffer = String::new();
    let mut frames = Vec::new();

    for token in tokens {
        match token {
            Token::Text(text) => buffer.push_str(text),
            Token::Image(image) => {
                // The image only affects what comes after it.
                flush(&mut buffer, &background, ctx, &mut frames);
                background = image.clone();
            }
            Token::Break => flush(&mut buffer, &background, ctx, &mut frames),
        }
    }
    flush(&mut buffer, &background, ctx, &mut frames);

    frames
}

fn flush(buffer: &mut String, background: &ImageRef, ctx: &ParseContext<'_>, out: &mut Vec<Frame>) {
    let cleaned = clean_text(buffer);
    buffer.clear();
    if cleaned.is_empty() {
        return;
    }

    let (speaker, text) = match split_speaker(&cleaned) {
        Some((name, rest)) if !rest.is_empty() => (Some(name), rest),
        _ => (ctx.default_speaker.map(str::to_string), cleaned),
    };

    out.push(Frame {
        text,
        speaker_name: speaker,
        is_user: ctx.is_user,
        background: background.clone(),
        source_message_index: ctx.message_index,
    });
}

/// An image that comes before any narrative text sets the message's
/// opening background.
fn leading_image(tokens: &[Token]) -> Option<ImageRef> {
    for token in tokens {
        match token {
            Token::Image(image) => return Some(image.clone()),
            Token::Text(text) if !clean_text(text).is_empty() => return None,
            _ => {}
        }
    }
    None
}

/// Strip reasoning spans and leftover markup, then trim.
pub fn clean_text(text: &str) -> String {
    let text = REASONING_RE.replace_all(text, "");
    let text = OPEN_REASONING_RE.replace(&text, "");
    let text = IMAGE_MARKER_RE.replace_all(&text, "");
    let text = REMNANT_TAG_RE.replace_all(&text, "");
    text.trim().to_string()
}

/// Find a leading `Name:` prefix. Returns the name and the remaining text
/// with the prefix and any single wrapping quote pair removed.
pub fn split_speaker(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    let name = SPEAKER_PATTERNS.iter().find_map(|pattern| {
        let caps = pattern.captures(text)?;
        let name = caps.get(1)?.as_str().trim();
        valid_speaker(name).then(|| name.to_string())
    })?;

    let rest = SPEAKER_PREFIX_RE.replace(text, "");
    Some((name, unwrap_quotes(rest.trim()).to_string()))
}

fn valid_speaker(name: &str) -> bool {
    let len = name.chars().count();
    len > 0 && len <= MAX_SPEAKER_CHARS && !name.contains(['<', '>', '{', '}'])
}

fn unwrap_quotes(text: &str) -> &str {
    for &(open, close) in QUOTE_PAIRS {
        let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        else {
            continue;
        };
        if !inner.contains(open) && !inner.contains(close) {
            return inner.trim();
        }
    }
    text
}

pub fn message_tokens(message: &TranscriptMessage) -> Vec<Token> {
    tokenize(&parse_markup(&message.raw_content))
}

/// Parse one stored message.
pub fn parse_message(
    message: &TranscriptMessage,
    message_index: usize,
    initial_background: &ImageRef,
) -> Vec<Frame> {
    parse_message_tokens(&message_tokens(message), message, message_index, initial_background)
}

fn parse_message_tokens(
    tokens: &[Token],
    message: &TranscriptMessage,
    message_index: usize,
    initial_background: &ImageRef,
) -> Vec<Frame> {
    let ctx = ParseContext {
        initial_background,
        default_speaker: Some(message.speaker_name.as_str()),
        is_user: message.is_user,
        attachment: message.attachments.first(),
        message_index,
    };
    parse_frames(tokens, &ctx)
}

/// Parse a whole transcript into history frames. Each message starts from
/// the background the previous one ended on.
pub fn parse_transcript(transcript: &Transcript) -> Vec<Frame> {
    let mut background = transcript.session_background();
    if background.is_placeholder() {
        warn!(
            character = %transcript.character.name,
            "no avatar for character, backgrounds fall back to placeholder"
        );
    }

    let mut frames = Vec::new();
    for (index, message) in transcript.messages.iter().enumerate() {
        let tokens = message_tokens(message);
        let parsed = parse_message_tokens(&tokens, message, index, &background);
        match parsed.last() {
            Some(last) => background = last.background.clone(),
            None => {
                if let Some(image) = message.attachments.first().cloned().or_else(|| {
                    tokens.iter().find_map(|t| match t {
                        Token::Image(image) => Some(image.clone()),
                        _ => None,
                    })
                }) {
                    background = image;
                }
            }
        }
        frames.extend(parsed);
    }
    frames
}
