use std::collections::HashMap;

use tracing::debug;
use trackport_frame::{leading_text, split_fields, MIN_FRAME_LEN};

use crate::parser::ProtocolParser;
use crate::variants;

/// Builds a fresh parser instance.
pub type ParserConstructor = fn() -> Box<dyn ProtocolParser>;

/// Maps protocol tags to parser constructors.
///
/// Read-only after startup; shared between connection workers and the parse
/// pass.
#[derive(Clone)]
pub struct ProtocolRegistry {
    constructors: HashMap<String, ParserConstructor>,
}

impl ProtocolRegistry {
    /// A registry with no tags.
    pub fn empty() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry with every built-in variant.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for (tag, constructor) in variants::builtin() {
            registry.register(tag, constructor);
        }
        registry
    }

    /// Register `constructor` under `tag` (case-insensitive). Returns the
    /// constructor it replaced.
    pub fn register(&mut self, tag: &str, constructor: ParserConstructor) -> Option<ParserConstructor> {
        self.constructors.insert(tag.to_ascii_uppercase(), constructor)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Select a parser for a received buffer.
    ///
    /// The buffer must hold at least [`MIN_FRAME_LEN`] bytes whose text
    /// prefix (up to the first NUL) splits into four or more comma-separated
    /// fields; the third field, upper-cased, is the tag. Surrounding blanks
    /// are part of the tag.
    pub fn select(&self, buf: &[u8]) -> Option<Box<dyn ProtocolParser>> {
        if buf.len() < MIN_FRAME_LEN {
            return None;
        }
        let text = leading_text(buf)?;
        let fields = split_fields(&text);
        if fields.len() < 4 {
            return None;
        }
        let tag = fields[2].to_ascii_uppercase();
        match self.constructors.get(&tag) {
            Some(constructor) => Some(constructor()),
            None => {
                debug!(tag = %tag, "no parser registered for tag");
                None
            }
        }
    }
}

impl Default for ProtocolRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
