use serde::{Deserialize, Serialize};

/// A selectable option found in a frame's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: u32,
    pub text: String,
}
