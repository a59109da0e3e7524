// autoenc-core/tests/discovery_tests.rs

use autoenc_core::discovery::{find_processable_files, has_video_extension};
use autoenc_core::error::CoreError;
use std::fs::{self, File};
use std::path::Path;
use tempfile::tempdir;

#[test]
fn test_find_processable_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input_dir = dir.path();

    File::create(input_dir.join("video2.MKV"))?; // Test case insensitivity
    File::create(input_dir.join("video1.mkv"))?;
    File::create(input_dir.join("disc.m2ts"))?;
    File::create(input_dir.join("document.txt"))?;
    File::create(input_dir.join("image.jpg"))?;
    fs::create_dir(input_dir.join("subdir"))?;
    File::create(input_dir.join("subdir").join("nested_video.mkv"))?; // Not searched

    let files = find_processable_files(input_dir)?;
    let names: Vec<_> = files
        .iter()
        .map(|f| f.file_name().unwrap().to_string_lossy().to_string())
        .collect();

    // Sorted by path, original case preserved
    assert_eq!(names, vec!["disc.m2ts", "video1.mkv", "video2.MKV"]);

    dir.close()?;
    Ok(())
}

#[test]
fn test_find_processable_files_empty() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let input_dir = dir.path();

    File::create(input_dir.join("document.txt"))?;
    fs::create_dir(input_dir.join("subdir"))?;

    match find_processable_files(input_dir) {
        Err(CoreError::NoFilesFound) => {}
        other => panic!("Unexpected result: {other:?}"),
    }

    dir.close()?;
    Ok(())
}

#[test]
fn test_find_processable_files_missing_dir() {
    let result = find_processable_files(Path::new("/definitely/not/here/autoenc"));
    assert!(matches!(result, Err(CoreError::Io(_))));
}

#[test]
fn test_has_video_extension() {
    assert!(has_video_extension(Path::new("a.mkv")));
    assert!(has_video_extension(Path::new("a.Mp4")));
    assert!(has_video_extension(Path::new("/x/y/a.webm")));
    assert!(!has_video_extension(Path::new("a.mkv.part")));
    assert!(!has_video_extension(Path::new("mkv")));
}
