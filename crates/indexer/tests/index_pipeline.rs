//! Integration tests for the indexing pipeline and retrieval path

use scene_search_captioning::{CaptionError, CaptionModel};
use scene_search_indexer::{
    build_index, caption_scene_directory, find_matches, IndexConfig, SceneStore,
};
use std::cell::RefCell;
use std::path::Path;
use tempfile::tempdir;

/// Test double that records every caption call
struct CountingModel {
    calls: RefCell<usize>,
    fail_on: Option<&'static str>,
}

impl CountingModel {
    fn new() -> Self {
        Self {
            calls: RefCell::new(0),
            fail_on: None,
        }
    }

    fn failing_on(name: &'static str) -> Self {
        Self {
            calls: RefCell::new(0),
            fail_on: Some(name),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.borrow()
    }
}

impl CaptionModel for CountingModel {
    fn caption(&self, path: &Path) -> Result<String, CaptionError> {
        *self.calls.borrow_mut() += 1;
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        if self.fail_on.is_some_and(|f| name == f) {
            return Err(CaptionError::EmptyResponse);
        }
        Ok(format!("caption for {name}"))
    }
}

#[test]
fn existing_store_short_circuits_with_no_caption_calls() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("scene_captions.json");
    let scenes_dir = dir.path().join("scene_images");

    let mut store = SceneStore::new();
    store.insert("s1.jpg".to_string(), "a red car driving".to_string());
    store.save(&store_path).unwrap();

    let model = CountingModel::new();
    let result = build_index(
        &model,
        "some entirely different query",
        &scenes_dir,
        &store_path,
        &IndexConfig::default(),
    )
    .unwrap();

    assert_eq!(result, store_path);
    assert_eq!(model.calls(), 0, "cache hit must not re-caption anything");
    // The stale query is deliberately ignored: the store is untouched.
    let reloaded = SceneStore::load(&store_path).unwrap();
    assert_eq!(reloaded, store);
}

#[test]
fn one_bad_image_does_not_abort_the_batch() {
    let dir = tempdir().unwrap();
    for name in ["a.jpg", "bad.jpg", "c.jpg"] {
        std::fs::write(dir.path().join(name), b"not really a jpeg").unwrap();
    }

    let model = CountingModel::failing_on("bad.jpg");
    let store = caption_scene_directory(&model, dir.path()).unwrap();

    assert_eq!(model.calls(), 3);
    assert_eq!(store.len(), 2);
    let keys: Vec<&String> = store.iter().map(|(k, _)| k).collect();
    assert!(keys.iter().all(|k| !k.ends_with("bad.jpg")));
}

#[test]
fn captioned_directory_round_trips_through_store_and_search() {
    let dir = tempdir().unwrap();
    let scenes_dir = dir.path().join("scene_images");
    std::fs::create_dir_all(&scenes_dir).unwrap();
    std::fs::write(scenes_dir.join("s1.jpg"), b"x").unwrap();
    std::fs::write(scenes_dir.join("s2.jpg"), b"x").unwrap();

    struct Fixed;
    impl CaptionModel for Fixed {
        fn caption(&self, path: &Path) -> Result<String, CaptionError> {
            let name = path.file_name().unwrap().to_string_lossy();
            Ok(if name == "s1.jpg" {
                "a red car driving".to_string()
            } else {
                "a blue house".to_string()
            })
        }
    }

    let store_path = dir.path().join("scene_captions.json");
    let store = caption_scene_directory(&Fixed, &scenes_dir).unwrap();
    store.save(&store_path).unwrap();

    let matches = find_matches("car", &store_path, 70.0);
    assert_eq!(matches.len(), 1);
    assert!(matches[0].ends_with("s1.jpg"));
}
