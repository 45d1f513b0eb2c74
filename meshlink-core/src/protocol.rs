//! Application message carried over the reliable channel.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single UTF-8 text value. Encoding is bincode; framing is length-prefix (see wire module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(String);

impl Message {
    pub fn new(text: impl Into<String>) -> Self {
        Message(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }

    pub fn into_text(self) -> String {
        self.0
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Message(s.to_string())
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Message(s)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
