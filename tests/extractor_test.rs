#![cfg(unix)]

mod common;

use std::time::Duration;
use tempfile::TempDir;

use common::{FAKE_FFMPEG, HANGING_FFMPEG, STALLING_FFMPEG, entries, write_script};
use reelaudio::extractor::{AudioExtractor, ExtractionError, FailureReason};
use reelaudio::retrieval::MediaArtifact;

fn media(dir: &TempDir) -> MediaArtifact {
    let path = dir.path().join("clip.mp4");
    std::fs::write(&path, b"video").unwrap();
    MediaArtifact { path, title: None }
}

#[tokio::test]
async fn test_extract_writes_destination() {
    let dir = TempDir::new().unwrap();
    let tool = write_script(dir.path(), "ffmpeg", FAKE_FFMPEG);
    let extractor = AudioExtractor::new(tool.to_str().unwrap(), Duration::from_secs(10));
    let destination = dir.path().join("out/clip_1.mp3");

    let audio = extractor.extract(&media(&dir), &destination).await.unwrap();

    assert_eq!(audio.filename, "clip_1.mp3");
    assert_eq!(audio.path, destination);
    assert_eq!(std::fs::read(&destination).unwrap(), b"ID3-fake-mp3");
    assert_eq!(entries(&dir.path().join("out")), vec![destination]);
}

#[tokio::test]
async fn test_missing_input_is_reported() {
    let dir = TempDir::new().unwrap();
    let tool = write_script(dir.path(), "ffmpeg", FAKE_FFMPEG);
    let extractor = AudioExtractor::new(tool.to_str().unwrap(), Duration::from_secs(10));
    let missing = MediaArtifact {
        path: dir.path().join("gone.mp4"),
        title: None,
    };
    let destination = dir.path().join("out/gone.mp3");

    let err = extractor.extract(&missing, &destination).await.unwrap_err();

    assert!(matches!(
        err,
        ExtractionError::ExtractionFailed(FailureReason::InputMissing)
    ));
    assert!(entries(&dir.path().join("out")).is_empty());
}

#[tokio::test]
async fn test_timeout_kills_transcoder_and_leaves_nothing() {
    let dir = TempDir::new().unwrap();
    let tool = write_script(dir.path(), "ffmpeg", HANGING_FFMPEG);
    let extractor = AudioExtractor::new(tool.to_str().unwrap(), Duration::from_millis(200));
    let destination = dir.path().join("out/slow.mp3");

    let err = extractor.extract(&media(&dir), &destination).await.unwrap_err();

    assert!(matches!(err, ExtractionError::Timeout(d) if d == Duration::from_millis(200)));
    assert!(entries(&dir.path().join("out")).is_empty());
}

#[tokio::test]
async fn test_tool_lookup_by_name_uses_path() {
    let extractor = AudioExtractor::new("definitely-not-a-real-transcoder", Duration::from_secs(1));
    assert!(extractor.locate_tool().is_none());

    let dir = TempDir::new().unwrap();
    let err = extractor
        .extract(&media(&dir), &dir.path().join("x.mp3"))
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractionError::ToolMissing(name) if name == "definitely-not-a-real-transcoder"));
}

#[tokio::test]
async fn test_cancelled_extraction_leaves_no_partial_file() {
    let dir = TempDir::new().unwrap();
    let tool = write_script(dir.path(), "ffmpeg", STALLING_FFMPEG);
    let extractor = AudioExtractor::new(tool.to_str().unwrap(), Duration::from_secs(30));
    let media = media(&dir);
    let out_dir = dir.path().join("out");
    let destination = out_dir.join("clip_1.mp3");

    let task = tokio::spawn(async move { extractor.extract(&media, &destination).await });

    // Wait until the transcoder has started writing
    for _ in 0..100 {
        if !entries(&out_dir).is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(entries(&out_dir), vec![out_dir.join("clip_1.mp3.part")]);

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());
    assert!(entries(&out_dir).is_empty());
}
