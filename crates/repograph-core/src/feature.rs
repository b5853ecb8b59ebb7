//! Semantic features: short verb+object behavioral descriptions.

use serde::{Deserialize, Serialize};

/// Maximum words a normalized description may keep.
const MAX_DESCRIPTION_WORDS: usize = 8;

/// The semantic half of every graph node: a behavioral description plus
/// keywords and optional sub-features (one verb-object phrase each).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticFeature {
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_features: Vec<String>,
}

impl SemanticFeature {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            keywords: Vec::new(),
            sub_features: Vec::new(),
        }
    }

    pub fn with_keywords(description: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            description: description.into(),
            keywords,
            sub_features: Vec::new(),
        }
    }

    /// Re-apply the feature-naming rules to this feature in place:
    /// lowercase, punctuation stripped, at most eight words, and
    /// multi-responsibility phrases ("x and y") split into sub-features.
    /// Keywords are lowercased and deduplicated preserving first-seen order.
    pub fn normalize(&mut self) {
        let parts = split_responsibilities(&self.description);
        let mut parts = parts.into_iter();
        if let Some(first) = parts.next() {
            self.description = clamp_words(&first, MAX_DESCRIPTION_WORDS);
        }
        for rest in parts {
            let phrase = clamp_words(&rest, MAX_DESCRIPTION_WORDS);
            if !phrase.is_empty() && !self.sub_features.contains(&phrase) {
                self.sub_features.push(phrase);
            }
        }

        for sub in self.sub_features.iter_mut() {
            *sub = clamp_words(sub, MAX_DESCRIPTION_WORDS);
        }
        self.sub_features.retain(|s| !s.is_empty());

        let mut seen = std::collections::HashSet::new();
        let mut kept = Vec::with_capacity(self.keywords.len());
        for kw in self.keywords.drain(..) {
            let kw = kw.trim().to_lowercase();
            if !kw.is_empty() && seen.insert(kw.clone()) {
                kept.push(kw);
            }
        }
        self.keywords = kept;
    }

    /// Normalized copy.
    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// The token pool used for keyword-overlap scoring: keywords plus
    /// description words.
    pub fn keyword_set(&self) -> std::collections::HashSet<String> {
        let mut set: std::collections::HashSet<String> =
            self.keywords.iter().map(|k| k.to_lowercase()).collect();
        for word in self.description.split_whitespace() {
            set.insert(word.to_lowercase());
        }
        set
    }
}

/// Split a multi-responsibility phrase on standalone "and" / "then" / ";"
/// separators. "parse config and validate flags" → two phrases.
/// Object-level "and" inside the last two words is left alone
/// ("merge nodes and edges" stays one phrase).
pub fn split_responsibilities(phrase: &str) -> Vec<String> {
    let cleaned = strip_punctuation(phrase);
    for sep in [" and then ", "; ", " then ", " and "] {
        if let Some((head, tail)) = cleaned.split_once(sep) {
            // A verb-led tail signals a second responsibility; a bare noun
            // tail is a compound object.
            if tail.split_whitespace().count() >= 2 {
                let mut out = vec![head.trim().to_string()];
                out.extend(split_responsibilities(tail));
                return out;
            }
        }
    }
    vec![cleaned.trim().to_string()]
}

fn strip_punctuation(text: &str) -> String {
    let lowered = text.to_lowercase();
    lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() || c == '-' || c == '_' || c == ';' {
                c
            } else {
                ' '
            }
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(" ;", ";")
}

fn clamp_words(text: &str, max_words: usize) -> String {
    text.replace(';', " ")
        .split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}
