use crate::model::content::{ContentNode, Token};
use crate::model::frame::ImageRef;

/// Decides which parts of a content tree are part of the story.
pub trait NodeClassifier {
    fn is_narrative(&self, node: &ContentNode) -> bool;
}

const EXCLUDED_TAGS: &[&str] = &[
    "script", "style", "think", "thinking", "details", "select", "summary",
];

const EXCLUDED_CLASSES: &[&str] = &[
    "suggestion_box",
    "thinking",
    "cot",
    "reasoning",
    "inline-dropdown",
    "mes_button",
];

const DECORATIVE_IMAGE_CLASSES: &[&str] = &["emoji", "icon", "avatar_img"];

const PARAGRAPH_TAGS: &[&str] = &["p", "div", "blockquote"];

/// Reasoning blocks, UI controls and decorative images are not narrative.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultClassifier;

impl NodeClassifier for DefaultClassifier {
    fn is_narrative(&self, node: &ContentNode) -> bool {
        match node {
            ContentNode::Element { tag, .. } => {
                let tag = tag.to_ascii_lowercase();
                !EXCLUDED_TAGS.contains(&tag.as_str())
                    && !EXCLUDED_CLASSES.iter().any(|c| node.has_class(c))
            }
            ContentNode::Image { src, .. } => {
                !src.trim().is_empty()
                    && !DECORATIVE_IMAGE_CLASSES.iter().any(|c| node.has_class(c))
            }
            ContentNode::Text(_) | ContentNode::LineBreak => true,
        }
    }
}

pub fn tokenize(nodes: &[ContentNode]) -> Vec<Token> {
    tokenize_with(nodes, &DefaultClassifier)
}

/// Flatten a content tree into text, image and break tokens, dropping
/// everything the classifier rejects.
pub fn tokenize_with(nodes: &[ContentNode], classifier: &dyn NodeClassifier) -> Vec<Token> {
    let mut tokens = Vec::new();
    for node in nodes {
        walk(node, classifier, &mut tokens);
    }
    tokens
}

fn walk(node: &ContentNode, classifier: &dyn NodeClassifier, out: &mut Vec<Token>) {
    if !classifier.is_narrative(node) {
        return;
    }

    match node {
        ContentNode::Text(text) => {
            if !text.trim().is_empty() {
                out.push(Token::Text(text.clone()));
            }
        }
        ContentNode::Image { src, .. } => out.push(Token::Image(ImageRef::new(src.trim()))),
        ContentNode::LineBreak => out.push(Token::Break),
        ContentNode::Element { tag, children, .. } => {
            let paragraph = PARAGRAPH_TAGS.contains(&tag.to_ascii_lowercase().as_str());
            if paragraph {
                push_paragraph_break(out);
            }
            for child in children {
                walk(child, classifier, out);
            }
            if paragraph {
                push_paragraph_break(out);
            }
        }
    }
}

fn push_paragraph_break(out: &mut Vec<Token>) {
    if !matches!(out.last(), Some(Token::Break)) {
        out.push(Token::Break);
    }
}
