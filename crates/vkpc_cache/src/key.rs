//! Cache key derivation.
//!
//! A cache key is the full text that identifies a build: tooling identities,
//! a description of the build options, the source language, and every
//! non-empty stage source in stage order. The text is hashed with FNV-1 to
//! locate candidate entries and stored next to each artifact to tell hash
//! collisions apart.

use std::fmt;

use vkpc_common::{KeyHash, ShaderStage, SourceLanguage};

/// The full key text of a build together with its hash.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheKey {
    text: String,
    hash: KeyHash,
}

impl CacheKey {
    /// Creates a key from its text, computing the hash.
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let hash = KeyHash::from_bytes(text.as_bytes());
        Self { text, hash }
    }

    /// Creates a key with an explicit hash.
    ///
    /// Only useful for exercising collision handling, where two different
    /// texts must share a hash.
    pub fn with_hash(text: impl Into<String>, hash: KeyHash) -> Self {
        Self {
            text: text.into(),
            hash,
        }
    }

    /// The full key text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The FNV-1 hash of the key text.
    pub fn hash(&self) -> KeyHash {
        self.hash
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({}, {} bytes)", self.hash, self.text.len())
    }
}

/// Builds a [`CacheKey`] from its parts in a fixed order.
///
/// Parts may be supplied in any order; [`finish`](Self::finish) always lays
/// them out as tooling identities, options, language, then stage sources in
/// [`ShaderStage::ALL`] order. Empty sources are skipped.
#[derive(Debug, Default, Clone)]
pub struct KeyBuilder {
    tools: Vec<String>,
    options: String,
    language: Option<SourceLanguage>,
    sources: Vec<(ShaderStage, String)>,
}

impl KeyBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a compiler or tool identity string (name plus version).
    ///
    /// Upgrading any tool changes its identity and so invalidates every
    /// entry it produced.
    pub fn tool(mut self, identity: impl Into<String>) -> Self {
        self.tools.push(identity.into());
        self
    }

    /// Sets the textual description of the build options.
    pub fn options(mut self, description: impl Into<String>) -> Self {
        self.options = description.into();
        self
    }

    /// Sets the source language.
    pub fn language(mut self, language: SourceLanguage) -> Self {
        self.language = Some(language);
        self
    }

    /// Adds the source text of one stage.
    pub fn source(mut self, stage: ShaderStage, text: impl Into<String>) -> Self {
        self.sources.push((stage, text.into()));
        self
    }

    /// Lays out the key text and hashes it.
    pub fn finish(mut self) -> CacheKey {
        // Stable, so several sources of one stage keep their relative order.
        self.sources.sort_by_key(|(stage, _)| *stage);

        let source_len: usize = self.sources.iter().map(|(_, s)| s.len() + 16).sum();
        let mut text = String::with_capacity(self.options.len() + source_len + 64);
        for tool in &self.tools {
            text.push_str(tool);
            text.push('\n');
        }
        text.push_str(&self.options);
        text.push('\n');
        if let Some(language) = self.language {
            text.push_str(language.name());
            text.push('\n');
        }
        for (stage, source) in self.sources.iter().filter(|(_, s)| !s.is_empty()) {
            text.push_str(stage.name());
            text.push(':');
            text.push_str(source);
        }
        CacheKey::new(text)
    }
}
