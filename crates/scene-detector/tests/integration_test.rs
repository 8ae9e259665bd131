use std::path::Path;
use scene_search_scenes::{detect_scenes, SceneDetectorConfig};

#[test]
#[ignore] // Needs ffmpeg and a local video: cargo test --package scene-search-scenes --test integration_test -- --ignored
fn test_scene_detection_covers_whole_video() {
    scene_search_frames::init().expect("FFmpeg init failed");

    let video_path = Path::new("tests/data/sample.mp4");

    if !video_path.exists() {
        eprintln!("Test video not found at {video_path:?}, skipping test");
        return;
    }

    let config = SceneDetectorConfig {
        threshold: 5.0, // Low threshold to detect some scenes
        min_scene_len: 0,
    };

    let scenes = detect_scenes(video_path, &config).expect("Scene detection failed");
    assert!(!scenes.is_empty());

    for (i, scene) in scenes.iter().enumerate() {
        println!(
            "Scene {}: {:.2}s - {:.2}s (score: {:.2})",
            i + 1,
            scene.start_time,
            scene.end_time,
            scene.score
        );
    }

    // First scene starts at the beginning and consecutive scenes are contiguous
    assert!(scenes[0].start_time.abs() < f64::EPSILON);
    for pair in scenes.windows(2) {
        assert!((pair[0].end_time - pair[1].start_time).abs() < f64::EPSILON);
    }
}
