use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::level::Level;

pub const STORAGE_KEY: &str = "jumpingManHighScores";
pub const SIGNATURE_MAX_LEN: usize = 10;

/// The logical read/write contract the store needs from persistence
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

impl KeyValueStore for web_sys::Storage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_item(key)
            .map_err(|err| anyhow!("Could not read '{}' : {:#?}", key, err))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_item(key, value)
            .map_err(|err| anyhow!("Could not write '{}' : {:#?}", key, err))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.remove_item(key)
            .map_err(|err| anyhow!("Could not remove '{}' : {:#?}", key, err))
    }
}

/// In-memory stand-in, used when localStorage is unavailable and in tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    pub fn with_item(key: &str, value: &str) -> Self {
        let store = MemoryStore::default();
        store
            .items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        store
    }

    pub fn item(&self, key: &str) -> Option<String> {
        self.items.borrow().get(key).cloned()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.item(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.items
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.items.borrow_mut().remove(key);
        Ok(())
    }
}

/// Browser persistence, or memory when the page may not touch localStorage
pub enum ScoreStorage {
    Local(web_sys::Storage),
    Memory(MemoryStore),
}

impl ScoreStorage {
    pub fn open() -> Self {
        match crate::browser::local_storage() {
            Ok(storage) => ScoreStorage::Local(storage),
            Err(err) => {
                error!("High scores will not persist : {:#?}", err);
                ScoreStorage::Memory(MemoryStore::new())
            }
        }
    }
}

impl KeyValueStore for ScoreStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            ScoreStorage::Local(storage) => KeyValueStore::get(storage, key),
            ScoreStorage::Memory(memory) => memory.get(key),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        match self {
            ScoreStorage::Local(storage) => KeyValueStore::set(storage, key, value),
            ScoreStorage::Memory(memory) => memory.set(key, value),
        }
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self {
            ScoreStorage::Local(storage) => KeyValueStore::remove(storage, key),
            ScoreStorage::Memory(memory) => memory.remove(key),
        }
    }
}

/// One level's stored best. Old saves hold a bare number of seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HighScore {
    Legacy(f64),
    Record {
        time: f64,
        #[serde(default)]
        signature: String,
        #[serde(default)]
        date: String,
    },
}

impl HighScore {
    /// Seconds this entry stands for
    pub fn time(&self) -> f64 {
        match self {
            HighScore::Legacy(time) => *time,
            HighScore::Record { time, .. } => *time,
        }
    }

    pub fn signature(&self) -> Option<&str> {
        match self {
            HighScore::Record { signature, .. } if !signature.is_empty() => Some(signature),
            _ => None,
        }
    }
}

/// A trimmed, non-empty player name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    pub fn parse(raw: &str) -> Option<Signature> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Signature(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Every level's best time, cached from storage. Entries are kept as raw
/// JSON so one unreadable level doesn't cost the others.
pub struct HighScoreStore<S: KeyValueStore> {
    storage: S,
    scores: Map<String, Value>,
}

impl<S: KeyValueStore> HighScoreStore<S> {
    /// Read the table. Unreadable text loads as empty; a table of the wrong
    /// shape also loads as empty and is deleted from storage.
    pub fn load(storage: S) -> Self {
        let scores = match storage.get(STORAGE_KEY) {
            Ok(Some(text)) => parse_table(&storage, &text),
            Ok(None) => Map::new(),
            Err(err) => {
                error!("Could not load high scores : {:#?}", err);
                Map::new()
            }
        };
        HighScoreStore { storage, scores }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Best entry for `level`; malformed or non-positive times don't count
    pub fn best(&self, level: Level) -> Option<HighScore> {
        let value = self.scores.get(&level.key())?;
        serde_json::from_value::<HighScore>(value.clone())
            .ok()
            .filter(|score| score.time().is_finite() && score.time() > 0.0)
    }

    /// Strictly faster than the stored best; a tie keeps the old entry
    pub fn is_new_best(&self, level: Level, time: f64) -> bool {
        match self.best(level) {
            Some(best) => time < best.time(),
            None => true,
        }
    }

    /// Record a new best and persist the table. The in-memory table is
    /// updated even if writing it out fails.
    pub fn commit(
        &mut self,
        level: Level,
        time: f64,
        signature: &Signature,
        date: &str,
    ) -> Result<()> {
        let record = HighScore::Record {
            time,
            signature: signature.as_str().to_string(),
            date: date.to_string(),
        };
        self.scores.insert(level.key(), serde_json::to_value(&record)?);
        log!(
            "New best for {} : {:.3}s by {}",
            level.key(),
            time,
            signature.as_str()
        );
        let text = serde_json::to_string(&self.scores)?;
        self.storage.set(STORAGE_KEY, &text)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.scores.clear();
        self.storage.remove(STORAGE_KEY)
    }
}

fn parse_table<S: KeyValueStore>(storage: &S, text: &str) -> Map<String, Value> {
    let discard = |reason: &str| {
        log!("Discarding stored high scores : {}", reason);
        if let Err(err) = storage.remove(STORAGE_KEY) {
            error!("Could not remove high scores : {:#?}", err);
        }
        Map::new()
    };

    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(table)) => {
            if table.values().any(Value::is_array) {
                discard("a level entry is a list")
            } else {
                table
            }
        }
        Ok(_) => discard("not an object"),
        Err(err) => {
            error!("Could not parse high scores : {:#?}", err);
            Map::new()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureInput {
    Edited,
    Submit(Signature),
    Ignored,
}

/// Text being typed for a new best time
#[derive(Debug, Default, Clone)]
pub struct SignatureBuffer {
    text: String,
}

impl SignatureBuffer {
    pub fn new() -> Self {
        SignatureBuffer::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Apply one `KeyboardEvent.key` value
    pub fn handle_key(&mut self, key: &str) -> SignatureInput {
        match key {
            "Enter" => self.submit(),
            "Backspace" => {
                if self.text.pop().is_some() {
                    SignatureInput::Edited
                } else {
                    SignatureInput::Ignored
                }
            }
            _ => {
                let mut chars = key.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None)
                        if (c.is_ascii_alphanumeric() || c == ' ')
                            && self.text.chars().count() < SIGNATURE_MAX_LEN =>
                    {
                        self.text.push(c);
                        SignatureInput::Edited
                    }
                    _ => SignatureInput::Ignored,
                }
            }
        }
    }

    /// Blank text can't be submitted
    pub fn submit(&self) -> SignatureInput {
        match Signature::parse(&self.text) {
            Some(signature) => SignatureInput::Submit(signature),
            None => SignatureInput::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn signed(name: &str) -> Signature {
        Signature::parse(name).unwrap()
    }

    #[test]
    fn legacy_numbers_and_records_share_effective_time() {
        let storage = MemoryStore::with_item(
            STORAGE_KEY,
            r#"{"level1": 42.5, "level2": {"time": 61.25, "signature": "ANA", "date": "2024-01-02"}}"#,
        );
        let store = HighScoreStore::load(storage);
        assert_relative_eq!(store.best(Level::One).unwrap().time(), 42.5);
        assert_eq!(store.best(Level::One).unwrap().signature(), None);
        let record = store.best(Level::Two).unwrap();
        assert_relative_eq!(record.time(), 61.25);
        assert_eq!(record.signature(), Some("ANA"));
        assert!(store.best(Level::Three).is_none());
    }

    #[test]
    fn ties_do_not_beat_the_record() {
        let store = HighScoreStore::load(MemoryStore::with_item(STORAGE_KEY, r#"{"level1": 40}"#));
        assert!(!store.is_new_best(Level::One, 40.0));
        assert!(!store.is_new_best(Level::One, 40.5));
        assert!(store.is_new_best(Level::One, 39.999));
        assert!(store.is_new_best(Level::Two, 500.0));
    }

    #[test]
    fn unparsable_text_loads_empty_and_stays_put() {
        let store = HighScoreStore::load(MemoryStore::with_item(STORAGE_KEY, "{not json"));
        assert!(store.best(Level::One).is_none());
        assert_eq!(store.storage().item(STORAGE_KEY).as_deref(), Some("{not json"));
    }

    #[test]
    fn wrong_top_level_shape_is_deleted() {
        let store = HighScoreStore::load(MemoryStore::with_item(STORAGE_KEY, "[1, 2]"));
        assert!(store.best(Level::One).is_none());
        assert_eq!(store.storage().item(STORAGE_KEY), None);
    }

    #[test]
    fn malformed_entry_counts_as_no_record_and_is_overwritten() {
        let storage = MemoryStore::with_item(
            STORAGE_KEY,
            r#"{"level1": "fast", "level2": {"signature": "X"}, "level3": -4}"#,
        );
        let mut store = HighScoreStore::load(storage);
        for level in Level::ALL {
            assert!(store.best(level).is_none());
            assert!(store.is_new_best(level, 100.0));
        }
        store.commit(Level::One, 55.0, &signed("BO"), "2024-05-06").unwrap();
        assert_relative_eq!(store.best(Level::One).unwrap().time(), 55.0);
    }

    #[test]
    fn commit_persists_the_whole_table() {
        let mut store = HighScoreStore::load(MemoryStore::new());
        store.commit(Level::Two, 33.3, &signed("  Zed  "), "2025-07-08").unwrap();
        let text = store.storage().item(STORAGE_KEY).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["level2"]["signature"], "Zed");
        assert_eq!(value["level2"]["date"], "2025-07-08");
        assert_relative_eq!(value["level2"]["time"].as_f64().unwrap(), 33.3);
    }

    #[test]
    fn score_storage_dispatches_through_the_store_trait() {
        let mut store = HighScoreStore::load(ScoreStorage::Memory(MemoryStore::new()));
        store.commit(Level::Three, 70.25, &signed("Ivy"), "2025-07-09").unwrap();

        let text = KeyValueStore::get(store.storage(), STORAGE_KEY).unwrap().unwrap();
        let reloaded = HighScoreStore::load(ScoreStorage::Memory(MemoryStore::with_item(STORAGE_KEY, &text)));
        assert_relative_eq!(reloaded.best(Level::Three).unwrap().time(), 70.25);

        let mut cleared = reloaded;
        cleared.clear().unwrap();
        assert!(cleared.storage().get(STORAGE_KEY).unwrap().is_none());
    }

    struct ReadOnly;

    impl KeyValueStore for ReadOnly {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(anyhow!("quota exceeded"))
        }
    }

    #[test]
    fn failed_write_still_updates_memory() {
        let mut store = HighScoreStore::load(ReadOnly);
        assert!(store.commit(Level::One, 12.0, &signed("A"), "2024-01-01").is_err());
        assert_relative_eq!(store.best(Level::One).unwrap().time(), 12.0);
        assert!(!store.is_new_best(Level::One, 12.0));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut store = HighScoreStore::load(MemoryStore::with_item(STORAGE_KEY, r#"{"level3": 20}"#));
        store.clear().unwrap();
        assert!(store.best(Level::Three).is_none());
        assert_eq!(store.storage().item(STORAGE_KEY), None);
    }

    #[test]
    fn signature_buffer_filters_and_caps_input() {
        let mut buffer = SignatureBuffer::new();
        for key in ["A", "-", "b", " ", "9", "Shift", "é"] {
            buffer.handle_key(key);
        }
        assert_eq!(buffer.text(), "Ab 9");
        assert_eq!(buffer.handle_key("Backspace"), SignatureInput::Edited);
        assert_eq!(buffer.text(), "Ab ");
        for _ in 0..20 {
            buffer.handle_key("x");
        }
        assert_eq!(buffer.text().len(), SIGNATURE_MAX_LEN);
        assert_eq!(
            buffer.handle_key("Enter"),
            SignatureInput::Submit(signed("Ab xxxxxxx"))
        );
    }

    #[test]
    fn blank_signatures_are_rejected() {
        let mut buffer = SignatureBuffer::new();
        assert_eq!(buffer.handle_key("Enter"), SignatureInput::Ignored);
        buffer.handle_key(" ");
        buffer.handle_key(" ");
        assert_eq!(buffer.submit(), SignatureInput::Ignored);
        assert_eq!(Signature::parse("   "), None);
    }
}
