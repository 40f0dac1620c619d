//! Browser-only checks, run with `wasm-pack test --headless --firefox`
#![cfg(target_arch = "wasm32")]

use jumping_man::level::Level;
use jumping_man::score::{HighScoreStore, KeyValueStore, ScoreStorage, Signature, STORAGE_KEY};
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn scores_round_trip_through_local_storage() {
    let storage = ScoreStorage::open();
    storage.remove(STORAGE_KEY).unwrap();

    let mut store = HighScoreStore::load(storage);
    let signature = Signature::parse("Web").unwrap();
    store
        .commit(Level::Two, 12.5, &signature, "2024-01-01")
        .unwrap();

    let reloaded = HighScoreStore::load(ScoreStorage::open());
    assert_eq!(reloaded.best(Level::Two).unwrap().time(), 12.5);

    let mut cleanup = reloaded;
    cleanup.clear().unwrap();
    assert!(ScoreStorage::open().get(STORAGE_KEY).unwrap().is_none());
}
