//! MIME → preview type table.
//!
//! Keys are case-insensitive globs over the bare MIME string (parameters
//! such as `; charset=utf-8` are ignored). Literal patterns are checked
//! before globs; among globs the first declared match wins.

use std::collections::HashMap;

use globset::{GlobBuilder, GlobMatcher};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::model::PreviewKind;
use crate::error::{CoreError, CoreResult};

/// Value side of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    Text,
    Image,
    Pdf,
    Archive,
    Folder,
    /// Detect again with the fallback detector, then map once more.
    Remime,
}

impl RuleTarget {
    #[must_use]
    pub const fn kind(self) -> Option<PreviewKind> {
        match self {
            Self::Text => Some(PreviewKind::Text),
            Self::Image => Some(PreviewKind::Image),
            Self::Pdf => Some(PreviewKind::Pdf),
            Self::Archive => Some(PreviewKind::Archive),
            Self::Folder => Some(PreviewKind::Folder),
            Self::Remime => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MimeRules {
    exact: HashMap<String, RuleTarget>,
    globs: Vec<(GlobMatcher, RuleTarget)>,
}

impl MimeRules {
    pub fn compile(table: &IndexMap<String, RuleTarget>) -> CoreResult<Self> {
        let mut exact = HashMap::new();
        let mut globs = Vec::new();

        for (pattern, &target) in table {
            let pattern = pattern.trim().to_ascii_lowercase();
            if pattern.contains(['*', '?', '[', '{']) {
                let matcher = GlobBuilder::new(&pattern)
                    .case_insensitive(true)
                    .build()?
                    .compile_matcher();
                globs.push((matcher, target));
            } else {
                exact.entry(pattern).or_insert(target);
            }
        }

        Ok(Self { exact, globs })
    }

    #[must_use]
    pub fn defaults() -> Self {
        Self::compile(&Self::default_table()).unwrap_or_else(|_| Self {
            exact: HashMap::new(),
            globs: Vec::new(),
        })
    }

    #[must_use]
    pub fn lookup(&self, mime: &str) -> Option<RuleTarget> {
        let bare = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if let Some(target) = self.exact.get(&bare) {
            return Some(*target);
        }

        self.globs
            .iter()
            .find(|(matcher, _)| matcher.is_match(&bare))
            .map(|(_, target)| *target)
    }

    /// [`lookup`](Self::lookup), failing with [`CoreError::NoMimeRule`] on a miss.
    pub fn resolve(&self, mime: &str) -> CoreResult<RuleTarget> {
        self.lookup(mime).ok_or_else(|| CoreError::no_mime_rule(mime))
    }

    #[must_use]
    pub fn default_table() -> IndexMap<String, RuleTarget> {
        [
            ("text/*", RuleTarget::Text),
            ("image/*", RuleTarget::Image),
            ("application/pdf", RuleTarget::Pdf),
            ("application/zip", RuleTarget::Archive),
            ("application/x-tar", RuleTarget::Archive),
            ("application/gzip", RuleTarget::Archive),
            ("application/x-gzip", RuleTarget::Archive),
            ("application/x-bzip2", RuleTarget::Archive),
            ("application/x-xz", RuleTarget::Archive),
            ("application/x-rar", RuleTarget::Archive),
            ("application/vnd.rar", RuleTarget::Archive),
            ("application/x-rar-compressed", RuleTarget::Archive),
            ("inode/directory", RuleTarget::Folder),
            ("inode/x-empty", RuleTarget::Text),
            ("application/x-empty", RuleTarget::Text),
            ("application/json", RuleTarget::Text),
            ("application/xml", RuleTarget::Text),
            ("application/javascript", RuleTarget::Text),
            ("application/toml", RuleTarget::Text),
            ("application/x-sh", RuleTarget::Text),
            ("application/octet-stream", RuleTarget::Text),
        ]
        .into_iter()
        .map(|(pattern, target)| (pattern.to_string(), target))
        .collect()
    }
}

impl Default for MimeRules {
    fn default() -> Self {
        Self::defaults()
    }
}
