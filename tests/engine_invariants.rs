//! Cross-cutting engine invariants: telemetry ordering, terminal-event
//! uniqueness, and hard-cap clamping.

use serial_test::serial;
use tempfile::TempDir;

use superclaude::config::{EngineConfig, limits};
use superclaude::executor::test_support::TestHarness;
use superclaude::executor::ExecuteRequest;

#[tokio::test]
#[serial]
async fn every_run_has_monotonic_seq_and_one_terminal_event() {
    let harness = TestHarness::new(&["anthropic"]);
    harness.provider("anthropic").push_text("analysis one");

    let first = harness
        .executor
        .execute(ExecuteRequest::new("/sc:analyze \"first\"", harness.root()))
        .await
        .unwrap();

    harness.provider("anthropic").push_text("analysis two");
    let second = harness
        .executor
        .execute(ExecuteRequest::new("/sc:analyze \"second\"", harness.root()))
        .await
        .unwrap();

    for result in [&first, &second] {
        let events = harness.events_for(&result.run_id);
        assert!(!events.is_empty());

        // Monotonic seq starting at 1, no gaps
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.seq, i as u64 + 1, "seq gap in run {}", result.run_id);
        }

        let finished = events
            .iter()
            .filter(|e| e.kind.as_str() == "run.finished")
            .count();
        assert_eq!(finished, 1, "exactly one run.finished per run");

        let assessed = events
            .iter()
            .filter(|e| e.kind.as_str() == "assessment.final")
            .count();
        assert_eq!(assessed, 1, "exactly one assessment.final per run");
    }

    // Runs are independent streams
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
#[serial]
async fn iterations_used_never_exceed_the_hard_ceiling() {
    let harness = TestHarness::new(&["anthropic"]);

    let mut request = ExecuteRequest::new("/sc:analyze \"bounded\"", harness.root());
    // Ask for far more than the ceiling allows
    request.max_iterations = Some(50);

    let result = harness.executor.execute(request).await.unwrap();
    assert!(result.iterations_used <= limits::HARD_MAX_ITERATIONS);
}

#[test]
#[serial]
fn env_iteration_raises_are_clamped() {
    // SAFETY: serialized test; the variable is removed before exit
    unsafe {
        std::env::set_var(limits::MAX_ITERATIONS_ENV, "10");
    }

    let dir = TempDir::new().unwrap();
    let config = EngineConfig::discover_from(dir.path()).unwrap();
    assert_eq!(
        config.engine.effective_max_iterations(),
        limits::HARD_MAX_ITERATIONS
    );

    // SAFETY: cleaning up the variable set above
    unsafe {
        std::env::remove_var(limits::MAX_ITERATIONS_ENV);
    }
}

#[tokio::test]
#[serial]
async fn selection_and_scoring_are_pure_across_identical_runs() {
    let harness = TestHarness::new(&["anthropic"]);
    harness.provider("anthropic").push_text("same answer");

    let first = harness
        .executor
        .execute(ExecuteRequest::new(
            "/sc:analyze \"analyze the api endpoint\"",
            harness.root(),
        ))
        .await
        .unwrap();

    harness.provider("anthropic").push_text("same answer");
    let second = harness
        .executor
        .execute(ExecuteRequest::new(
            "/sc:analyze \"analyze the api endpoint\"",
            harness.root(),
        ))
        .await
        .unwrap();

    let agent_of = |run: &superclaude::ExecuteResult| {
        harness
            .events_for(&run.run_id)
            .into_iter()
            .find(|e| e.kind.as_str() == "agent.selected")
            .map(|e| e.payload["agent"].as_str().unwrap_or_default().to_string())
            .unwrap_or_default()
    };
    assert_eq!(agent_of(&first), agent_of(&second));
    assert_eq!(
        first.final_assessment.unwrap().final_score,
        second.final_assessment.unwrap().final_score
    );
}
