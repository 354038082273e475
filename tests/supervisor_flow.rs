//! End-to-end supervisor turns over the seeded corpus with a scripted
//! LLM: fast-path gating, message ordering, partial failure
//! containment, cancellation, and input validation.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{
    GREETING_INTENT, LEGAL_INTENT, SEARCH_PLAN, SYNTH_ANSWER, SleepyTeam, TOOL_PLAN_LEASE,
    harness, harness_with_teams, test_config,
};
use jibsa::core::{IntentType, TeamKind, TurnStatus};
use jibsa::error::EngineError;
use jibsa::memory::MessageStore;
use jibsa::team::TeamExecutor;

#[tokio::test]
async fn test_greeting_fast_path() {
    let h = harness(vec![GREETING_INTENT]);
    let outcome = h
        .supervisor
        .process_query("안녕하세요", "s1", None, None)
        .await
        .expect("turn");

    assert_eq!(outcome.intent, Some(IntentType::Greeting));
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert!(outcome.teams_used.is_empty());
    assert!(!outcome.answer.is_empty());
    // Exactly one LLM call: the classifier. Template synthesis is free.
    assert_eq!(h.client.call_count(), 1);

    // Both turn messages persisted, user before assistant.
    let messages = h.store.recent("s1", 10).expect("recent");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "안녕하세요");
    assert_eq!(messages[1].content, outcome.answer);
    assert!(messages[0].created_at < messages[1].created_at);
}

#[tokio::test]
async fn test_full_legal_turn() {
    let h = harness(vec![LEGAL_INTENT, SEARCH_PLAN, TOOL_PLAN_LEASE, SYNTH_ANSWER]);
    let outcome = h
        .supervisor
        .process_query("전세금 인상 한도는 얼마야?", "s1", None, None)
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert_eq!(outcome.teams_used, vec![TeamKind::Search]);
    assert_eq!(outcome.answer, SYNTH_ANSWER);
    assert!(!outcome.sources.is_empty());
    assert!(outcome.data.contains_key("search"));
    assert!(outcome.total_tokens > 0);
    // intent + team select + tool plan + synthesis
    assert_eq!(h.client.call_count(), 4);
}

#[tokio::test]
async fn test_message_ordering_across_turns() {
    // Two greeting turns back to back (property P5 shape).
    let h = harness(vec![GREETING_INTENT, GREETING_INTENT]);
    h.supervisor
        .process_query("안녕하세요", "s1", None, None)
        .await
        .expect("turn 1");
    h.supervisor
        .process_query("고마워요", "s1", None, None)
        .await
        .expect("turn 2");

    let messages = h.store.recent("s1", 10).expect("recent");
    assert_eq!(messages.len(), 4);
    let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
    assert_eq!(roles, vec!["user", "assistant", "user", "assistant"]);
    for pair in messages.windows(2) {
        assert!(pair[0].created_at < pair[1].created_at);
    }
}

#[tokio::test]
async fn test_partial_failure_containment() {
    // Search succeeds; analysis sleeps past the 400ms team timeout.
    let plan = r#"{"steps": [{"team": "search", "subquery": "강남 시세 근거 법령", "depends_on": []}, {"team": "analysis", "subquery": "강남 시세 분석", "depends_on": [0]}], "execution_mode": "mixed", "skip_execution": false}"#;
    let analysis: Arc<dyn TeamExecutor> = Arc::new(SleepyTeam {
        team: TeamKind::Analysis,
        sleep: Duration::from_secs(30),
        records: 1,
    });
    let h = harness_with_teams(
        vec![LEGAL_INTENT, plan, TOOL_PLAN_LEASE, SYNTH_ANSWER],
        vec![analysis],
        test_config(),
    );

    let outcome = h
        .supervisor
        .process_query("강남구 아파트 시세 분석해줘", "s1", None, None)
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Partial);
    assert!(!outcome.answer.is_empty());
    // Both teams appear; search data preserved despite analysis timeout.
    assert!(outcome.teams_used.contains(&TeamKind::Search));
    assert!(outcome.teams_used.contains(&TeamKind::Analysis));
    assert!(!outcome.data["search"].is_empty());

    // Assistant message still persisted.
    let messages = h.store.recent("s1", 10).expect("recent");
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_unregistered_team_marked_failed() {
    let plan = r#"{"steps": [{"team": "search", "subquery": "전세", "depends_on": []}, {"team": "document", "subquery": "계약서 초안", "depends_on": [0]}], "execution_mode": "sequential", "skip_execution": false}"#;
    let h = harness(vec![LEGAL_INTENT, plan, TOOL_PLAN_LEASE, SYNTH_ANSWER]);
    let outcome = h
        .supervisor
        .process_query("전세 계약서 초안 써줘", "s1", None, None)
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Partial);
    assert!(outcome.teams_used.contains(&TeamKind::Document));
}

#[tokio::test]
async fn test_empty_query_rejected_without_side_effects() {
    let h = harness(vec![]);
    let result = h.supervisor.process_query("   ", "s1", None, None).await;
    assert!(matches!(result, Err(EngineError::InputRejected { .. })));
    assert_eq!(h.client.call_count(), 0);
    assert!(h.store.recent("s1", 10).expect("recent").is_empty());
}

#[tokio::test]
async fn test_oversized_query_rejected() {
    let h = harness(vec![]);
    let huge = "가".repeat(100_000);
    let result = h.supervisor.process_query(&huge, "s1", None, None).await;
    assert!(matches!(result, Err(EngineError::InputRejected { .. })));
}

#[tokio::test]
async fn test_cancellation_before_execution() {
    let token = CancellationToken::new();
    token.cancel();
    let h = harness(vec![LEGAL_INTENT, SEARCH_PLAN]);
    let outcome = h
        .supervisor
        .process_query("전세금 인상 한도", "s1", None, Some(token))
        .await
        .expect("turn");

    assert_eq!(outcome.status, TurnStatus::Cancelled);
    assert!(!outcome.answer.is_empty());
    // Cancelled turns still persist both messages.
    let messages = h.store.recent("s1", 10).expect("recent");
    assert_eq!(messages.len(), 2);
}

#[tokio::test]
async fn test_synthesis_failure_degrades_to_summary() {
    let h = harness(vec![LEGAL_INTENT, SEARCH_PLAN, TOOL_PLAN_LEASE, "<error>"]);
    let outcome = h
        .supervisor
        .process_query("전세금 인상 한도", "s1", None, None)
        .await
        .expect("turn");

    // Degraded deterministic summary, not an error.
    assert_eq!(outcome.status, TurnStatus::Partial);
    assert!(outcome.answer.contains("주택임대차보호법"));
}

#[tokio::test]
async fn test_planning_failure_degrades_to_clarification() {
    // Both classification attempts fail to parse.
    let h = harness(vec!["junk", "junk again"]);
    let outcome = h
        .supervisor
        .process_query("???", "s1", None, None)
        .await
        .expect("turn");

    assert_eq!(outcome.intent, Some(IntentType::Unclear));
    assert_eq!(outcome.status, TurnStatus::Completed);
    assert!(outcome.teams_used.is_empty());
}

#[tokio::test]
async fn test_checkpoints_recorded_in_node_order() {
    let h = harness(vec![GREETING_INTENT]);
    h.supervisor
        .process_query("안녕하세요", "s1", None, None)
        .await
        .expect("turn");

    let steps: Vec<String> = h
        .checkpoints
        .all("s1")
        .into_iter()
        .map(|c| c.step)
        .collect();
    assert_eq!(
        steps,
        vec!["initialize", "persist_user_turn", "plan", "synthesize"]
    );
}

#[tokio::test]
async fn test_progress_events_stream_to_sink() {
    use jibsa::core::progress::ChannelSink;

    let (sink, mut rx) = ChannelSink::new();
    let h = harness(vec![LEGAL_INTENT, SEARCH_PLAN, TOOL_PLAN_LEASE, SYNTH_ANSWER]);
    h.supervisor
        .process_query(
            "전세금 인상 한도",
            "s1",
            Some(Arc::new(sink)),
            None,
        )
        .await
        .expect("turn");

    let mut events = Vec::new();
    while let Ok((session, event)) = rx.try_recv() {
        assert_eq!(session, "s1");
        events.push(event);
    }
    assert!(events.len() >= 5);
    assert_eq!(events[0].step, "initialize");
    let last = events.last().expect("events");
    assert_eq!(last.progress, 100);
    // Percentages never regress.
    for pair in events.windows(2) {
        assert!(pair[0].progress <= pair[1].progress);
    }
}

#[tokio::test]
async fn test_concurrent_sessions_do_not_interleave_messages() {
    let h = Arc::new(harness(vec![
        GREETING_INTENT,
        GREETING_INTENT,
        GREETING_INTENT,
        GREETING_INTENT,
    ]));
    let a = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.supervisor
                .process_query("안녕하세요", "a", None, None)
                .await
        })
    };
    let b = {
        let h = Arc::clone(&h);
        tokio::spawn(async move {
            h.supervisor
                .process_query("안녕하세요", "b", None, None)
                .await
        })
    };
    a.await.expect("join").expect("turn a");
    b.await.expect("join").expect("turn b");

    for session in ["a", "b"] {
        let messages = h.store.recent(session, 10).expect("recent");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role.as_str(), "user");
        assert_eq!(messages[1].role.as_str(), "assistant");
    }
}
