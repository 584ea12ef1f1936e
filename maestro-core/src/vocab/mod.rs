//! Vocabulary & alias layer (C6, §4.6).
//!
//! Two roles: supply a bounded boost-term prompt to the provider, and
//! rewrite a recognized phrase to its canonical command in command mode.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::Mode;

/// Number of boost terms handed to the provider as an initial prompt
/// (§4.6: "up to 50 terms").
const MAX_BOOST_TERMS: usize = 50;

/// `{ categories, aliases, boost_words }` persisted as JSON (§3, §6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VocabularyStore {
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub aliases: BTreeMap<String, String>,
    pub boost_words: Vec<String>,
}

impl VocabularyStore {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        crate::files::atomic_write_json(path, self)
    }

    /// Up to `MAX_BOOST_TERMS` terms for the provider's initial prompt
    /// (§4.6 role 1). Preserves `boost_words` ordering.
    pub fn boost_prompt(&self) -> Vec<String> {
        self.boost_words.iter().take(MAX_BOOST_TERMS).cloned().collect()
    }

    /// Alias rewrite (§4.6 role 2, I4): a no-op outside command mode;
    /// trimmed lowercase whole-utterance lookup; idempotent, since the
    /// table is only ever consulted with the original (pre-rewrite) text
    /// never re-looked-up against its own output.
    pub fn resolve_alias(&self, text: &str, mode: Mode) -> String {
        if mode != Mode::Command {
            return text.to_string();
        }
        let key = text.trim().to_lowercase();
        match self.aliases.get(&key) {
            Some(canonical) => canonical.clone(),
            None => text.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> VocabularyStore {
        let mut aliases = BTreeMap::new();
        aliases.insert("hit it".to_string(), "play".to_string());
        VocabularyStore {
            categories: BTreeMap::new(),
            aliases,
            boost_words: (0..60).map(|i| format!("term{i}")).collect(),
        }
    }

    #[test]
    fn boost_prompt_caps_at_fifty() {
        assert_eq!(store().boost_prompt().len(), MAX_BOOST_TERMS);
    }

    #[test]
    fn alias_rewrite_matches_case_insensitively_after_trim() {
        let s = store();
        assert_eq!(s.resolve_alias("  Hit It  ", Mode::Command), "play");
    }

    #[test]
    fn alias_rewrite_is_noop_in_dictation_mode() {
        let s = store();
        assert_eq!(s.resolve_alias("hit it", Mode::Dictation), "hit it");
    }

    #[test]
    fn alias_rewrite_is_idempotent() {
        let s = store();
        let once = s.resolve_alias("hit it", Mode::Command);
        let twice = s.resolve_alias(&once, Mode::Command);
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_phrase_passes_through_unchanged() {
        let s = store();
        assert_eq!(s.resolve_alias("solo track one", Mode::Command), "solo track one");
    }

    #[test]
    fn load_missing_file_returns_default() {
        let store = VocabularyStore::load(Path::new("/nonexistent/vocab.json")).unwrap();
        assert!(store.aliases.is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = std::env::temp_dir().join(format!("maestro-vocab-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("vocab.json");
        let s = store();
        s.save(&path).unwrap();
        let loaded = VocabularyStore::load(&path).unwrap();
        assert_eq!(loaded.aliases.get("hit it"), Some(&"play".to_string()));
    }
}
