// Recorder engine tests, driving the capture thread through its handle

mod common;

use chrono::{Local, TimeZone};
use std::sync::Arc;
use std::time::Duration;

use common::{MemoryBackend, ScriptedDevice, test_config, wait_for_event};
use parcelcam::recorder::{
    EncodeError, ErrorKind, ManualClock, Recorder, RecorderError, RecorderEvent, SessionError,
    SessionState, StopReason, Y4mBackend,
};
use parcelcam::{ArtifactKey, MetadataStore};

/// Poll status until at least `frames` have been recorded
async fn wait_for_frames(recorder: &Recorder, frames: u64) {
    let wait = async {
        loop {
            let status = recorder.status().await.unwrap();
            if status.frame_count >= frames {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), wait)
        .await
        .expect("timed out waiting for frames");
}

#[tokio::test]
async fn test_start_and_stop_counts_written_frames() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::default();
    let (device, _control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(backend.clone()))
        .with_device(device)
        .spawn()
        .unwrap();

    let info = recorder.start("ABC123").await.unwrap();
    assert_eq!(info.tracking_number, "ABC123");
    assert_eq!(info.codec, "avc1");
    assert_eq!(info.path.parent(), Some(dir.path()));
    let key = ArtifactKey::parse_path(&info.path).unwrap();
    assert_eq!(key.tracking_number, "ABC123");

    wait_for_event(&mut events, |e| matches!(e, RecorderEvent::SessionStarted { .. })).await;
    wait_for_frames(&recorder, 5).await;

    let summary = recorder.stop().await.unwrap().unwrap();
    assert!(summary.frame_count >= 5);
    assert_eq!(summary.frame_count, backend.frames());
    assert_eq!(backend.finishes(), 1);

    let stopped = wait_for_event(&mut events, |e| {
        matches!(e, RecorderEvent::SessionStopped { .. })
    })
    .await;
    match stopped {
        RecorderEvent::SessionStopped { summary: s, reason } => {
            assert_eq!(reason, StopReason::Operator);
            assert_eq!(s.frame_count, summary.frame_count);
        }
        other => panic!("unexpected event {:?}", other),
    }

    // Frames keep flowing to preview but are no longer recorded
    tokio::time::sleep(Duration::from_millis(20)).await;
    let status = recorder.status().await.unwrap();
    assert_eq!(status.state, SessionState::Idle);
    assert_eq!(status.frame_count, summary.frame_count);
    assert_eq!(backend.frames(), summary.frame_count);
}

#[tokio::test]
async fn test_second_start_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (device, _control) = ScriptedDevice::new();
    let (recorder, _events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(MemoryBackend::default()))
        .with_device(device)
        .spawn()
        .unwrap();

    recorder.start("FIRST1").await.unwrap();
    let err = recorder.start("SECOND").await.unwrap_err();
    assert!(matches!(
        err,
        RecorderError::Session(SessionError::AlreadyRecording(ref id)) if id == "FIRST1"
    ));

    let status = recorder.status().await.unwrap();
    assert_eq!(status.state, SessionState::Recording);
    assert_eq!(status.tracking_number.as_deref(), Some("FIRST1"));
}

#[tokio::test]
async fn test_stop_while_idle_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let (device, _control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(MemoryBackend::default()))
        .with_device(device)
        .spawn()
        .unwrap();

    let before = recorder.status().await.unwrap();
    assert!(recorder.stop().await.unwrap().is_none());
    let after = recorder.status().await.unwrap();

    assert_eq!(before.state, SessionState::Idle);
    assert_eq!(after.state, SessionState::Idle);
    assert_eq!(after.frame_count, before.frame_count);
    assert!(events.try_recv_control().is_none());
}

#[tokio::test]
async fn test_no_codec_available_stays_idle() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend {
        reject_all: true,
        ..Default::default()
    };
    let (device, _control) = ScriptedDevice::new();
    let (recorder, _events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(backend))
        .with_device(device)
        .spawn()
        .unwrap();

    let err = recorder.start("ABC123").await.unwrap_err();
    match err {
        RecorderError::Encode(EncodeError::NoCodecAvailable { tried }) => {
            assert_eq!(tried, vec!["avc1", "mp4v", "XVID", "I420"]);
        }
        other => panic!("unexpected error {}", other),
    }
    assert_eq!(recorder.status().await.unwrap().state, SessionState::Idle);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_write_failure_latches_until_stop() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::failing_after(3);
    let (device, _control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(backend.clone()))
        .with_device(device)
        .spawn()
        .unwrap();

    recorder.start("ABC123").await.unwrap();
    let error = wait_for_event(&mut events, |e| matches!(e, RecorderEvent::Error { .. })).await;
    assert!(matches!(error, RecorderEvent::Error { kind: ErrorKind::Encode, .. }));

    // Preview keeps running while the session stays failed
    tokio::time::sleep(Duration::from_millis(30)).await;
    let status = recorder.status().await.unwrap();
    assert_eq!(status.state, SessionState::Error);
    assert_eq!(status.frame_count, 3);
    assert_eq!(backend.finishes(), 1);
    assert!(matches!(
        recorder.start("OTHER1").await,
        Err(RecorderError::Session(SessionError::ErrorLatched))
    ));

    let summary = recorder.stop().await.unwrap().unwrap();
    assert_eq!(summary.frame_count, 3);
    assert_eq!(recorder.status().await.unwrap().state, SessionState::Idle);

    // Exactly one error was surfaced
    let mut extra_errors = 0;
    while let Some(event) = events.try_recv_control() {
        if matches!(event, RecorderEvent::Error { .. }) {
            extra_errors += 1;
        }
    }
    assert_eq!(extra_errors, 0);
}

#[tokio::test]
async fn test_device_failure_escalates_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let (device, control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(MemoryBackend::default()))
        .with_device(device)
        .spawn()
        .unwrap();

    recorder.start("ABC123").await.unwrap();
    wait_for_frames(&recorder, 2).await;
    control.set_failing(true);

    let error = wait_for_event(&mut events, |e| matches!(e, RecorderEvent::Error { .. })).await;
    assert!(matches!(error, RecorderEvent::Error { kind: ErrorKind::Device, .. }));
    assert_eq!(recorder.status().await.unwrap().state, SessionState::Error);

    // Not ready until the device delivers again
    recorder.reset().await.unwrap();
    assert!(matches!(
        recorder.start("NEXT01").await,
        Err(RecorderError::Device(_))
    ));

    control.set_failing(false);
    tokio::time::sleep(Duration::from_millis(30)).await;
    recorder.start("NEXT01").await.unwrap();
}

#[tokio::test]
async fn test_warning_then_timeout_on_simulated_clock() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.max_duration_secs = 10;
    config.warning_window_secs = 2;

    let wall = Local.with_ymd_and_hms(2025, 1, 7, 14, 30, 0).single().unwrap();
    let clock = ManualClock::new(wall);
    let (device, _control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(config)
        .with_backend(Arc::new(MemoryBackend::default()))
        .with_clock(Arc::new(clock.clone()))
        .with_device(device)
        .spawn()
        .unwrap();

    let info = recorder.start("ABC123").await.unwrap();
    assert_eq!(info.path, dir.path().join("ABC123_20250107_143000.mp4"));

    clock.advance(Duration::from_secs(8));
    let warning = wait_for_event(&mut events, |e| matches!(e, RecorderEvent::Warning { .. })).await;
    assert!(matches!(warning, RecorderEvent::Warning { remaining_secs: 2 }));
    assert!(recorder.status().await.unwrap().warning_fired);

    clock.advance(Duration::from_secs(2));
    let timed_out = wait_for_event(&mut events, |e| {
        matches!(e, RecorderEvent::TimedOut { .. } | RecorderEvent::Warning { .. })
    })
    .await;
    match timed_out {
        RecorderEvent::TimedOut { summary } => {
            assert_eq!(summary.tracking_number, "ABC123");
            assert_eq!(summary.duration, Duration::from_secs(10));
        }
        other => panic!("expected timeout, got {:?}", other),
    }
    assert_eq!(recorder.status().await.unwrap().state, SessionState::Idle);
}

#[tokio::test]
async fn test_shutdown_finalizes_recording() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.codec = "I420".to_string();
    let (device, control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(config)
        .with_backend(Arc::new(Y4mBackend))
        .with_device(device)
        .spawn()
        .unwrap();

    let info = recorder.start("ABC123").await.unwrap();
    assert_eq!(info.path.extension().and_then(|e| e.to_str()), Some("y4m"));
    wait_for_frames(&recorder, 3).await;

    recorder.shutdown().await.unwrap();
    assert!(control.is_closed());

    let stopped = wait_for_event(&mut events, |e| {
        matches!(e, RecorderEvent::SessionStopped { .. })
    })
    .await;
    let RecorderEvent::SessionStopped { summary, reason } = stopped else {
        unreachable!()
    };
    assert_eq!(reason, StopReason::Shutdown);

    // 4x4 I420 frame: 16 luma + 8 chroma bytes behind a 6 byte marker
    let bytes = std::fs::read(&info.path).unwrap();
    let header_len = bytes.iter().position(|b| *b == b'\n').unwrap() + 1;
    assert_eq!(bytes.len(), header_len + summary.frame_count as usize * (6 + 24));
    assert!(events.recv_control().await.is_none());
}

#[tokio::test]
async fn test_annotate_through_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (device, _control) = ScriptedDevice::new();
    let (recorder, _events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(MemoryBackend::default()))
        .with_device(device)
        .spawn()
        .unwrap();

    let key = ArtifactKey::parse("ABC123_20250107_143000.mp4").unwrap();
    let saved = recorder
        .annotate(key.clone(), vec!["damaged".to_string()], "box crushed")
        .await
        .unwrap();

    let loaded = MetadataStore::new(dir.path()).load(&key);
    assert_eq!(loaded.problems, saved.problems);
    assert_eq!(loaded.notes, "box crushed");
}

#[tokio::test]
async fn test_preview_frames_and_stopped_engine() {
    let dir = tempfile::tempdir().unwrap();
    let (device, _control) = ScriptedDevice::new();
    let (recorder, mut events) = Recorder::builder(test_config(dir.path()))
        .with_backend(Arc::new(MemoryBackend::default()))
        .with_device(device)
        .spawn()
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(RecorderEvent::FrameReady(frame)) = events.recv().await {
                return frame;
            }
        }
    })
    .await
    .unwrap();
    assert!(frame.is_well_formed());

    recorder.request_shutdown();
    tokio::time::timeout(Duration::from_secs(5), async {
        while recorder.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    assert!(matches!(recorder.status().await, Err(RecorderError::EngineStopped)));
}
