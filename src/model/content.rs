use crate::model::frame::ImageRef;

/// Generic structured view of one message's content, independent of how a
/// host renders it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    Text(String),
    Image {
        src: String,
        classes: Vec<String>,
    },
    /// Explicit line break (`<br>`, `<hr>`, newline).
    LineBreak,
    Element {
        tag: String,
        classes: Vec<String>,
        children: Vec<ContentNode>,
    },
}

impl ContentNode {
    pub fn text(value: impl Into<String>) -> Self {
        ContentNode::Text(value.into())
    }

    pub fn image(src: impl Into<String>) -> Self {
        ContentNode::Image {
            src: src.into(),
            classes: Vec::new(),
        }
    }

    pub fn element(tag: impl Into<String>, children: Vec<ContentNode>) -> Self {
        ContentNode::Element {
            tag: tag.into(),
            classes: Vec::new(),
            children,
        }
    }

    pub fn has_class(&self, name: &str) -> bool {
        match self {
            ContentNode::Image { classes, .. } | ContentNode::Element { classes, .. } => {
                classes.iter().any(|c| c == name)
            }
            _ => false,
        }
    }
}

/// Flat token stream consumed by the frame parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Text(String),
    Image(ImageRef),
    Break,
}
