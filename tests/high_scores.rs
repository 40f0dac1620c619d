use approx::assert_relative_eq;
use jumping_man::level::Level;
use jumping_man::score::{
    HighScoreStore, MemoryStore, Signature, SignatureBuffer, SignatureInput, STORAGE_KEY,
};
use jumping_man::timer::{format_time, LevelTimer};

fn signature(name: &str) -> Signature {
    Signature::parse(name).expect("non-blank signature")
}

#[test]
fn best_times_only_improve() {
    let mut store = HighScoreStore::load(MemoryStore::new());

    assert!(store.is_new_best(Level::One, 42.5));
    store
        .commit(Level::One, 42.5, &signature("ANA"), "2024-06-01")
        .unwrap();

    assert!(!store.is_new_best(Level::One, 50.0));
    assert_relative_eq!(store.best(Level::One).unwrap().time(), 42.5);

    assert!(store.is_new_best(Level::One, 30.0));
    store
        .commit(Level::One, 30.0, &signature("BEN"), "2024-06-02")
        .unwrap();

    let best = store.best(Level::One).unwrap();
    assert_relative_eq!(best.time(), 30.0);
    assert_eq!(best.signature(), Some("BEN"));
}

#[test]
fn committed_scores_survive_a_reload() {
    let mut store = HighScoreStore::load(MemoryStore::new());
    store
        .commit(Level::Three, 88.8, &signature("Cy"), "2024-06-03")
        .unwrap();
    let text = store.storage().item(STORAGE_KEY).unwrap();

    let reloaded = HighScoreStore::load(MemoryStore::with_item(STORAGE_KEY, &text));
    assert_relative_eq!(reloaded.best(Level::Three).unwrap().time(), 88.8);
    assert!(reloaded.best(Level::One).is_none());
}

#[test]
fn a_list_valued_level_discards_the_whole_store() {
    let storage = MemoryStore::with_item(STORAGE_KEY, r#"{"level1": [1, 2, 3], "level2": 20.0}"#);
    let store = HighScoreStore::load(storage);

    for level in Level::ALL {
        assert!(store.best(level).is_none());
    }
    assert_eq!(store.storage().item(STORAGE_KEY), None);
}

#[test]
fn typed_signature_is_trimmed_and_saved() {
    let mut buffer = SignatureBuffer::new();
    for key in [" ", "M", "a", "x", " "] {
        buffer.handle_key(key);
    }
    let signed = match buffer.handle_key("Enter") {
        SignatureInput::Submit(signed) => signed,
        other => panic!("expected a submission, got {:?}", other),
    };
    assert_eq!(signed.as_str(), "Max");

    let mut store = HighScoreStore::load(MemoryStore::new());
    store.commit(Level::Two, 61.005, &signed, "2024-06-04").unwrap();
    assert_eq!(store.best(Level::Two).unwrap().signature(), Some("Max"));
}

#[test]
fn timer_feeds_the_final_time() {
    let mut timer = LevelTimer::new();
    timer.reset(0.0);
    for frame in 1..=3004 {
        timer.tick(f64::from(frame) * 25.0, 25.0);
    }
    assert_eq!(format_time(timer.elapsed_seconds()), "1:15.100");
    assert_eq!(format_time(75.123), "1:15.123");
}
