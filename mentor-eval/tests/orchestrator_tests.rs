//! Stage orchestrator integration tests
//!
//! Drives full pipeline runs against an in-memory database and mock
//! collaborators.

mod helpers;

use chrono::Utc;
use helpers::{lecture_transcript, CallCounts, LlmMode, MockSetup, TestHarness};
use mentor_common::events::MentorEvent;
use mentor_eval::db;
use mentor_eval::models::{ModalityScoreSet, SessionStatus, Stage, TranscriptRecord};
use mentor_eval::scoring::Modality;
use mentor_eval::services::{PipelineError, PipelineSettings, StageOrchestrator};
use serde_json::json;

async fn new_session(harness: &TestHarness) -> uuid::Uuid {
    db::sessions::create_session(&harness.pool, "lecture.mp4", None)
        .await
        .unwrap()
        .id
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<MentorEvent>) -> Vec<MentorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_full_run_completes_session() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = new_session(&harness).await;

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);
    assert!(outcome.error.is_none());

    let record = outcome.score.expect("complete outcome carries the score");
    assert!((0.0..=10.0).contains(&record.final_score.mentor_score));
    assert_eq!(record.category_scores.len(), 5);

    let session = db::sessions::load_session(&harness.pool, id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert_eq!(session.stages_completed, Stage::ALL.to_vec());
    assert_eq!(session.last_successful_stage, Some(Stage::Complete));

    let metadata = session.completion_metadata.unwrap();
    assert_eq!(metadata["mentor_score"], json!(record.final_score.mentor_score));
    assert_eq!(metadata["model_versions"]["whisper"], json!("mock-whisper"));
    assert_eq!(metadata["model_versions"]["llm"], json!("mock-llm"));
    assert_eq!(metadata["runtime_diagnostics"]["video_filename"], json!("lecture.mp4"));

    for modality in Modality::ALL {
        assert!(
            db::artifacts::load_modality_scores(&harness.pool, id, modality)
                .await
                .unwrap()
                .is_some(),
            "{} scores missing",
            modality
        );
    }

    let report = db::artifacts::load_report(&harness.pool, id).await.unwrap().unwrap();
    assert!(!report.report.fallback);
    assert_eq!(report.report.strengths.len(), 2);
    assert_eq!(report.explanations.len(), 5);

    assert_eq!(CallCounts::get(&harness.counts.transcribe), 1);
    assert_eq!(CallCounts::get(&harness.counts.detect_frame), 10);
}

#[tokio::test]
async fn test_second_run_does_no_work() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = new_session(&harness).await;

    let first = harness.orchestrator.process(id).await.unwrap();
    let calls_after_first = harness.counts.total();

    let second = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(second.status, SessionStatus::Complete);
    assert_eq!(harness.counts.total(), calls_after_first);
    assert_eq!(
        first.score.unwrap().final_score,
        second.score.unwrap().final_score
    );
}

#[tokio::test]
async fn test_concurrent_triggers_run_once() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = new_session(&harness).await;

    let (a, b) = tokio::join!(harness.orchestrator.process(id), harness.orchestrator.process(id));
    assert_eq!(a.unwrap().status, SessionStatus::Complete);
    assert_eq!(b.unwrap().status, SessionStatus::Complete);

    assert_eq!(CallCounts::get(&harness.counts.transcribe), 1);
    assert_eq!(CallCounts::get(&harness.counts.sample_frames), 1);

    let session = db::sessions::load_session(&harness.pool, id).await.unwrap().unwrap();
    assert_eq!(session.stages_completed.len(), Stage::ALL.len());
}

#[tokio::test]
async fn test_stt_failure_marks_session_failed() {
    let harness = TestHarness::new(MockSetup {
        stt_fails: true,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&harness).await;
    let mut rx = harness.event_bus.subscribe();

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("whisper offline"));

    let session = db::sessions::load_session(&harness.pool, id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stages_completed, vec![Stage::Prepare]);
    assert!(session.error_message().unwrap().contains("stt stage failed"));

    let metadata = session.completion_metadata.unwrap();
    assert_eq!(metadata["failed_stage"], json!("stt"));
    assert_eq!(metadata["partial_completion"], json!(true));
    assert!(metadata["pipeline_stages"].is_object());

    assert_eq!(CallCounts::get(&harness.counts.detect_silence), 0);
    assert!(db::artifacts::load_final_score(&harness.pool, id).await.unwrap().is_none());

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        MentorEvent::PipelineFailed { stage: Some(stage), .. } if stage == "stt"
    )));
}

#[tokio::test]
async fn test_failed_session_requires_restart() {
    let harness = TestHarness::new(MockSetup {
        stt_fails: true,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&harness).await;
    harness.orchestrator.process(id).await.unwrap();

    let err = harness.orchestrator.process(id).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidState(_)));
    assert_eq!(CallCounts::get(&harness.counts.transcribe), 1);
}

#[tokio::test]
async fn test_restart_recovers_failed_session() {
    let failing = TestHarness::new(MockSetup {
        stt_fails: true,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&failing).await;
    failing.orchestrator.process(id).await.unwrap();

    // Same database, working collaborators
    let (collaborators, counts) = MockSetup::default().build();
    let healthy = StageOrchestrator::new(
        failing.pool.clone(),
        failing.event_bus.clone(),
        failing.cache.clone(),
        collaborators,
        PipelineSettings::default(),
    );

    let outcome = healthy.restart(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);
    assert_eq!(CallCounts::get(&counts.transcribe), 1);

    let session = db::sessions::load_session(&failing.pool, id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Complete);
    assert!(session.error_message().is_none());
}

#[tokio::test]
async fn test_restart_recomputes_everything() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = new_session(&harness).await;
    harness.orchestrator.process(id).await.unwrap();

    let mut rx = harness.event_bus.subscribe();
    let outcome = harness.orchestrator.restart(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);

    assert_eq!(CallCounts::get(&harness.counts.transcribe), 2);
    assert_eq!(CallCounts::get(&harness.counts.sample_frames), 2);
    assert_eq!(CallCounts::get(&harness.counts.report_prompts), 2);

    let events = drain(&mut rx);
    assert!(matches!(events.first(), Some(MentorEvent::SessionReset { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, MentorEvent::PipelineStarted { restart: true, .. })));
    // Only the text stage is skipped: its scores ride along with transcription
    let skipped: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            MentorEvent::StageSkipped { stage, .. } => Some(stage.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["text"]);
}

#[tokio::test]
async fn test_restart_unknown_session() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let err = harness.orchestrator.restart(uuid::Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, PipelineError::SessionNotFound(_)));
}

#[tokio::test]
async fn test_resume_skips_stored_artifacts() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = new_session(&harness).await;

    // A previous run got through transcription and audio before stopping
    db::artifacts::save_transcript(
        &harness.pool,
        &TranscriptRecord {
            session_id: id,
            transcript: lecture_transcript(),
            created_at: Utc::now(),
        },
    )
    .await
    .unwrap();
    let audio: mentor_eval::scoring::RawScores = [("audio_overall", 9.2), ("clarity_score", 8.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), json!(v)))
        .collect();
    db::artifacts::save_modality_scores(
        &harness.pool,
        &ModalityScoreSet::new(id, Modality::Audio, audio, json!({"wpm": 130.0})),
    )
    .await
    .unwrap();
    for stage in [Stage::Prepare, Stage::Stt, Stage::Audio] {
        db::sessions::add_completed_stage(&harness.pool, id, stage).await.unwrap();
    }

    let mut rx = harness.event_bus.subscribe();
    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);

    assert_eq!(CallCounts::get(&harness.counts.transcribe), 0);
    assert_eq!(CallCounts::get(&harness.counts.detect_silence), 0);
    // Text set was never stored, so the text stage catches up
    assert_eq!(CallCounts::get(&harness.counts.text_prompts), 1);
    assert_eq!(CallCounts::get(&harness.counts.sample_frames), 1);

    let skipped: Vec<String> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            MentorEvent::StageSkipped { stage, .. } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(skipped, vec!["stt".to_string(), "audio".to_string()]);

    let session = db::sessions::load_session(&harness.pool, id).await.unwrap().unwrap();
    assert_eq!(session.stages_completed, Stage::ALL.to_vec());
}

#[tokio::test]
async fn test_llm_outage_degrades_to_fallbacks() {
    let harness = TestHarness::new(MockSetup {
        llm: LlmMode::Down,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&harness).await;

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);

    let text = db::artifacts::load_modality_scores(&harness.pool, id, Modality::Text)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(text.score("clarity_score"), Some(0.0));

    let report = db::artifacts::load_report(&harness.pool, id).await.unwrap().unwrap();
    assert!(report.report.fallback);
    assert!(!report.report.actionable_tips.is_empty());
    assert!(CallCounts::get(&harness.counts.report_prompts) >= 1);
}

#[tokio::test]
async fn test_unparseable_report_falls_back() {
    let harness = TestHarness::new(MockSetup {
        llm: LlmMode::Garbage,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&harness).await;

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);

    let report = db::artifacts::load_report(&harness.pool, id).await.unwrap().unwrap();
    assert!(report.report.fallback);
}

#[tokio::test]
async fn test_clarity_failure_scores_zero_clarity() {
    let harness = TestHarness::new(MockSetup {
        clarity_fails: true,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&harness).await;

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Complete);

    let audio = db::artifacts::load_modality_scores(&harness.pool, id, Modality::Audio)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(audio.score("clarity_score"), Some(0.0));
    assert_eq!(audio.score("wpm_score"), Some(10.0));
}

#[tokio::test]
async fn test_visual_failure_is_fatal() {
    let harness = TestHarness::new(MockSetup {
        detector_fails: true,
        ..MockSetup::default()
    })
    .await;
    let id = new_session(&harness).await;

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);

    let session = db::sessions::load_session(&harness.pool, id).await.unwrap().unwrap();
    assert_eq!(
        session.stages_completed,
        vec![Stage::Prepare, Stage::Stt, Stage::Audio]
    );
    assert_eq!(session.completion_metadata.unwrap()["failed_stage"], json!("visual"));
}

#[tokio::test]
async fn test_unknown_subject_fails_in_prepare() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = db::sessions::create_session(&harness.pool, "lecture.mp4", Some("astrology".to_string()))
        .await
        .unwrap()
        .id;

    let outcome = harness.orchestrator.process(id).await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(harness.counts.total(), 0);
}

#[tokio::test]
async fn test_event_sequence_of_a_fresh_run() {
    let harness = TestHarness::new(MockSetup::default()).await;
    let id = new_session(&harness).await;
    let mut rx = harness.event_bus.subscribe();

    harness.orchestrator.process(id).await.unwrap();

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(MentorEvent::PipelineStarted { restart: false, .. })
    ));
    assert!(matches!(events.last(), Some(MentorEvent::PipelineCompleted { .. })));

    let completed: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            MentorEvent::StageCompleted { stage, .. } => Some(stage.clone()),
            _ => None,
        })
        .collect();
    let expected: Vec<String> = Stage::ALL
        .iter()
        .filter(|s| **s != Stage::Text)
        .map(|s| s.to_string())
        .collect();
    assert_eq!(completed, expected);
    assert!(events
        .iter()
        .any(|e| matches!(e, MentorEvent::StageSkipped { stage, .. } if stage == "text")));
    assert!(events.iter().all(|e| e.session_id() == id));
}
