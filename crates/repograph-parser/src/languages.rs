//! Language detection and tree-sitter grammar loading.

use repograph_core::SourceLanguage;

/// Supported languages of the AST surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Rust,
    Go,
    Java,
}

impl Language {
    /// Detect language from a file extension. Detection is by extension only.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "ts" | "tsx" => Some(Self::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "py" => Some(Self::Python),
            "rs" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    /// Detect language from a file path.
    pub fn from_path(path: &str) -> Option<Self> {
        path.rsplit_once('.').and_then(|(_, ext)| Self::from_extension(ext))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "typescript" => Some(Self::TypeScript),
            "javascript" => Some(Self::JavaScript),
            "python" => Some(Self::Python),
            "rust" => Some(Self::Rust),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    /// Extensions tried when resolving an extensionless import specifier.
    pub fn extension_set(&self) -> &'static [&'static str] {
        match self {
            Self::TypeScript => &["ts", "tsx", "js", "jsx"],
            Self::JavaScript => &["js", "jsx", "mjs", "cjs", "ts"],
            Self::Python => &["py"],
            Self::Rust => &["rs"],
            Self::Go => &["go"],
            Self::Java => &["java"],
        }
    }

    /// Core model equivalent.
    pub fn source_language(&self) -> SourceLanguage {
        match self {
            Self::TypeScript => SourceLanguage::TypeScript,
            Self::JavaScript => SourceLanguage::JavaScript,
            Self::Python => SourceLanguage::Python,
            Self::Rust => SourceLanguage::Rust,
            Self::Go => SourceLanguage::Go,
            Self::Java => SourceLanguage::Java,
        }
    }

    /// The tree-sitter grammar for parsing.
    pub fn ts_language(&self) -> tree_sitter::Language {
        match self {
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_by_extension_only() {
        assert_eq!(Language::from_extension("tsx"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("mjs"), Some(Language::JavaScript));
        assert_eq!(Language::from_extension("py"), Some(Language::Python));
        assert_eq!(Language::from_extension("rb"), None);
    }

    #[test]
    fn path_detection() {
        assert_eq!(Language::from_path("src/a.test.ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_path("Makefile"), None);
    }

    #[test]
    fn names_round_trip() {
        for lang in [
            Language::TypeScript,
            Language::JavaScript,
            Language::Python,
            Language::Rust,
            Language::Go,
            Language::Java,
        ] {
            assert_eq!(Language::from_name(lang.name()), Some(lang));
        }
    }
}
