//! Turns a message's stored text (light HTML plus newlines, the way chat
//! hosts keep it) into the generic content tree.
//!
//! Only a known set of tags is understood. Anything else is kept as literal
//! text so that nothing the model wrote silently disappears.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::model::content::ContentNode;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<(/?)([A-Za-z][A-Za-z0-9_-]*)((?:[^<>"']|"[^"]*"|'[^']*')*?)(/?)>"#)
        .expect("tag regex")
});

static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][A-Za-z0-9_:.-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>/]+))"#)
        .expect("attribute regex")
});

static MD_IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"!\[[^\]]*\]\(([^)\s]+)(?:\s+"[^"]*")?\)"#).expect("markdown image regex")
});

// A tag still being typed by the model at the very end of the buffer.
static TRAILING_FRAGMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Za-z/!][^<>]*$").expect("trailing fragment regex"));

const PAIRED_TAGS: &[&str] = &[
    "p", "div", "blockquote", "span", "em", "strong", "i", "b", "u", "s", "q", "font", "small",
    "big", "sup", "sub", "code", "pre", "center", "ul", "ol", "li", "a", "h1", "h2", "h3", "h4",
    "h5", "h6", "think", "thinking", "details", "summary", "script", "style", "select", "option",
    "button",
];

struct OpenElement {
    tag: String,
    classes: Vec<String>,
    children: Vec<ContentNode>,
}

#[derive(Default)]
struct TreeBuilder {
    root: Vec<ContentNode>,
    stack: Vec<OpenElement>,
}

impl TreeBuilder {
    fn push(&mut self, node: ContentNode) {
        match self.stack.last_mut() {
            Some(open) => open.children.push(node),
            None => self.root.push(node),
        }
    }

    fn open(&mut self, tag: String, classes: Vec<String>) {
        self.stack.push(OpenElement {
            tag,
            classes,
            children: Vec::new(),
        });
    }

    fn close(&mut self, tag: &str) {
        if !self.stack.iter().any(|open| open.tag == tag) {
            return;
        }
        while let Some(open) = self.stack.pop() {
            let matched = open.tag == tag;
            self.push(ContentNode::Element {
                tag: open.tag,
                classes: open.classes,
                children: open.children,
            });
            if matched {
                break;
            }
        }
    }

    fn finish(mut self) -> Vec<ContentNode> {
        // Unclosed elements run to the end of the message.
        while let Some(open) = self.stack.pop() {
            self.push(ContentNode::Element {
                tag: open.tag,
                classes: open.classes,
                children: open.children,
            });
        }
        self.root
    }

    fn push_text(&mut self, text: &str) {
        let mut lines = text.split('\n').peekable();
        while let Some(line) = lines.next() {
            self.push_inline(line);
            if lines.peek().is_some() {
                self.push(ContentNode::LineBreak);
            }
        }
    }

    fn push_inline(&mut self, line: &str) {
        let mut last = 0;
        for caps in MD_IMAGE_RE.captures_iter(line) {
            let Some(whole) = caps.get(0) else { continue };
            if whole.start() > last {
                self.push(ContentNode::Text(decode_entities(&line[last..whole.start()])));
            }
            self.push(ContentNode::image(&caps[1]));
            last = whole.end();
        }
        if last < line.len() {
            self.push(ContentNode::Text(decode_entities(&line[last..])));
        }
    }
}

/// Parse raw stored message text into a content tree. Never fails, and a
/// `<` that opens no complete tag stays literal text.
pub fn parse_markup(raw: &str) -> Vec<ContentNode> {
    build_tree(&raw.replace("\r\n", "\n"))
}

/// [`parse_markup`] for a buffer the model is still writing. A tag fragment
/// at the very end is withheld until a later pass sees it closed.
pub fn parse_markup_partial(raw: &str) -> Vec<ContentNode> {
    let normalized = raw.replace("\r\n", "\n");
    match TRAILING_FRAGMENT_RE.find(&normalized) {
        Some(fragment) => build_tree(&normalized[..fragment.start()]),
        None => build_tree(&normalized),
    }
}

fn build_tree(input: &str) -> Vec<ContentNode> {
    let mut builder = TreeBuilder::default();
    let mut last = 0;

    for caps in TAG_RE.captures_iter(input) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            builder.push_text(&input[last..whole.start()]);
        }
        last = whole.end();

        let closing = !caps[1].is_empty();
        let tag = caps[2].to_ascii_lowercase();
        let attrs = caps.get(3).map_or("", |m| m.as_str());
        let self_closing = !caps[4].is_empty();

        match tag.as_str() {
            "br" | "hr" => builder.push(ContentNode::LineBreak),
            "img" => {
                if closing {
                    continue;
                }
                if let Some(src) = attribute(attrs, "src").filter(|s| !s.is_empty()) {
                    builder.push(ContentNode::Image {
                        src,
                        classes: classes(attrs),
                    });
                }
            }
            "image" => match attribute(attrs, "src").filter(|s| !s.is_empty()) {
                Some(src) if !closing => builder.push(ContentNode::Image {
                    src,
                    classes: classes(attrs),
                }),
                _ => debug!("dropping legacy <image> marker without a source"),
            },
            t if PAIRED_TAGS.contains(&t) => {
                if closing {
                    builder.close(t);
                } else if self_closing {
                    builder.push(ContentNode::Element {
                        tag,
                        classes: classes(attrs),
                        children: Vec::new(),
                    });
                } else {
                    builder.open(tag, classes(attrs));
                }
            }
            _ => builder.push_text(whole.as_str()),
        }
    }

    if last < input.len() {
        builder.push_text(&input[last..]);
    }

    builder.finish()
}

fn attribute(attrs: &str, name: &str) -> Option<String> {
    ATTR_RE.captures_iter(attrs).find_map(|caps| {
        if !caps[1].eq_ignore_ascii_case(name) {
            return None;
        }
        caps.get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| decode_entities(m.as_str()))
    })
}

fn classes(attrs: &str) -> Vec<String> {
    attribute(attrs, "class")
        .map(|value| value.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|&end| end <= 10) {
            Some(end) => match decode_entity(&tail[1..end]) {
                Some(ch) => {
                    out.push(ch);
                    rest = &tail[end + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                name.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
