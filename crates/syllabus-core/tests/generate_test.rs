//! End-to-end generation through a fake generator CLI, then persistence.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use syllabus_core::error::{ExtractionError, PlanError};
use syllabus_core::pipeline::{
    CommandGenerator, GenerationRequest, Pipeline, PipelineConfig, RetryPolicy, generate_plan,
};
use syllabus_core::plan::{SaveOutcome, save_plan};
use syllabus_core::progress::{plan_stats, toggle_task};
use syllabus_db::queries::tasks as task_queries;
use syllabus_test_utils::{create_test_db, drop_test_db};

/// Write an executable shell script that answers by stage.
///
/// The architect prompt is the only one asking for a JSON object, so the
/// script keys off that phrase.
fn fake_generator(dir: &Path, architect_reply: &str) -> String {
    let reply_path = dir.join("architect_reply.txt");
    std::fs::write(&reply_path, architect_reply).unwrap();

    let script_path = dir.join("fake_llm.sh");
    std::fs::write(
        &script_path,
        format!(
            "#!/bin/sh\n\
             prompt=$(cat)\n\
             case \"$prompt\" in\n\
               *'single JSON object'*) cat '{}' ;;\n\
               *'research scout'*) echo 'Week 1: The Book. Week 2: Rustlings.' ;;\n\
               *) echo 'Week 1 ownership, week 2 traits, week 3 async, week 4 project.' ;;\n\
             esac\n",
            reply_path.display()
        ),
    )
    .unwrap();

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    script_path.to_str().unwrap().to_string()
}

fn pipeline(program: String) -> Pipeline {
    Pipeline::standard(
        Arc::new(CommandGenerator::new(program, vec![])),
        PipelineConfig {
            stage_timeout: Duration::from_secs(10),
            retry: RetryPolicy::none(),
        },
    )
}

fn four_week_reply() -> String {
    let milestones: Vec<String> = (1..=4)
        .map(|w| {
            format!(
                r#"{{"week": {w}, "title": "Week {w}", "objectives": ["o{w}"],
                    "resources": [{{"title": "r", "url": "https://example.com/{w}", "type": "article"}}],
                    "daily_tasks": ["d1", "d2", "d3", "d4", "d5"]}}"#
            )
        })
        .collect();
    format!(
        "Here is the plan you asked for:\n```json\n{{\"goal\": \"Learn Rust\", \"weeks\": 4, \"milestones\": [{}]}}\n```\nEnjoy!",
        milestones.join(",")
    )
}

#[tokio::test]
async fn learn_rust_four_weeks_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let program = fake_generator(tmp.path(), &four_week_reply());
    let (pool, db_name) = create_test_db().await;

    let request = GenerationRequest::new("Learn Rust", 4).unwrap();
    let plan = generate_plan(&pipeline(program), &request).await.unwrap();
    assert_eq!(plan.milestones.len(), 4);

    let saved = match save_plan(&pool, "alice", &request, &plan).await.unwrap() {
        SaveOutcome::Created(p) => p,
        SaveOutcome::Duplicate(p) => panic!("unexpected duplicate {}", p.id),
    };

    let tasks = task_queries::list_tasks_for_plan(&pool, saved.id).await.unwrap();
    let n = tasks.len();
    assert_eq!(n, 20);
    let first = tasks.iter().find(|t| t.week_number == 1).unwrap();
    toggle_task(&pool, "alice", saved.id, first.id, true).await.unwrap();

    let stats = plan_stats(&pool, "alice", saved.id).await.unwrap();
    assert_eq!(stats.total_tasks, n);
    assert_eq!(stats.completed_tasks, 1);
    assert_eq!(stats.percentage, 100.0 / n as f64);
    assert_eq!(stats.completed_weeks, 0);
    assert_eq!(stats.current_week, 1);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn truncated_architect_output_is_an_extraction_error() {
    let tmp = tempfile::tempdir().unwrap();
    let reply = four_week_reply();
    // Cut the reply off before the outer object closes.
    let cut = reply.rfind("]}").unwrap();
    let program = fake_generator(tmp.path(), &reply[..cut + 1]);

    let request = GenerationRequest::new("Learn Rust", 4).unwrap();
    let err = generate_plan(&pipeline(program), &request).await.unwrap_err();
    assert!(matches!(
        err,
        PlanError::Extraction(ExtractionError::Unbalanced { .. })
    ));
}

#[tokio::test]
async fn week_mismatch_is_a_validation_error() {
    let tmp = tempfile::tempdir().unwrap();
    let program = fake_generator(tmp.path(), &four_week_reply());

    let request = GenerationRequest::new("Learn Rust", 3).unwrap();
    let err = generate_plan(&pipeline(program), &request).await.unwrap_err();
    assert!(matches!(err, PlanError::Validation(ref v) if v.field == "weeks"));
}

#[tokio::test]
async fn failing_generator_is_transient_upstream() {
    let tmp = tempfile::tempdir().unwrap();
    let script_path = tmp.path().join("down.sh");
    std::fs::write(&script_path, "#!/bin/sh\necho 'service unavailable' >&2\nexit 1\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let request = GenerationRequest::new("Learn Rust", 2).unwrap();
    let err = generate_plan(
        &pipeline(script_path.to_str().unwrap().to_string()),
        &request,
    )
    .await
    .unwrap_err();
    match err {
        PlanError::TransientUpstream { stage, reason } => {
            assert_eq!(stage, "strategist");
            assert!(reason.contains("service unavailable"), "reason: {reason}");
        }
        other => panic!("expected TransientUpstream, got {other:?}"),
    }
}
