//! Integration tests for the dialer engine.
//!
//! These drive the public event surface of [`PowerDialer`] end to end
//! against a real engine: shared status store, live recency worker and the
//! SQLite-backed call record pipeline.

use anyhow::Result;
use powerdial_engine::prelude::*;
use std::sync::Arc;

async fn create_test_engine() -> Result<DialerEngine> {
    // In-memory database, default dial ratio of 2
    let engine = DialerEngine::new(DialerConfig::default()).await?;
    Ok(engine)
}

#[tokio::test]
async fn fresh_login_dials_at_the_ratio() {
    let engine = create_test_engine().await.expect("engine creation failed");

    // The agent is unknown, so the store reports offline
    assert_eq!(engine.status_store().get("test_id"), AgentState::Offline);

    let mut session = engine.session("test_id");
    session.on_agent_login();

    assert_eq!(engine.status_store().get("test_id"), AgentState::Idle);
    assert_eq!(session.numbers.len(), 2);
    engine.shutdown().await;
}

#[tokio::test]
async fn logout_goes_offline() {
    let engine = create_test_engine().await.expect("engine creation failed");
    engine.status_store().set("test_id", AgentState::Idle);

    let mut session = engine.session("test_id");
    session.on_agent_logout();

    assert_eq!(engine.status_store().get("test_id"), AgentState::Offline);
    assert!(session.numbers.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn logout_wins_even_while_busy() {
    let engine = create_test_engine().await.expect("engine creation failed");
    engine.status_store().set("test_id", AgentState::Busy);

    let mut session = engine.session("test_id");
    session.on_agent_logout();

    assert_eq!(engine.status_store().get("test_id"), AgentState::Offline);
    engine.shutdown().await;
}

#[tokio::test]
async fn call_started_marks_the_agent_busy() {
    let engine = create_test_engine().await.expect("engine creation failed");
    engine.status_store().set("test_id", AgentState::Idle);

    let mut session = engine.session("test_id");
    session.on_call_started("(212) 555-0100");

    assert_eq!(engine.status_store().get("test_id"), AgentState::Busy);
    assert_eq!(
        engine.call_metrics().in_flight_number("test_id").as_deref(),
        Some("(212) 555-0100")
    );
    // A connect initiates nothing on its own
    assert!(session.numbers.is_empty());
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_call_is_replaced_while_idle() {
    let engine = create_test_engine().await.expect("engine creation failed");
    engine.status_store().set("test_id", AgentState::Idle);

    let mut session = engine.session("test_id");
    session.on_call_failed("(212) 555-0101");

    assert_eq!(session.numbers.len(), 1);
    assert_eq!(engine.status_store().get("test_id"), AgentState::Idle);
    engine.shutdown().await;
}

#[tokio::test]
async fn failed_call_is_not_replaced_while_busy() {
    let engine = create_test_engine().await.expect("engine creation failed");
    engine.status_store().set("test_id", AgentState::Busy);

    let mut session = engine.session("test_id");
    session.on_call_failed("(212) 555-0101");

    // The agent is on a connected call; the sibling dial is accepted as lost
    assert!(session.numbers.is_empty());
    assert_eq!(engine.status_store().get("test_id"), AgentState::Busy);
    engine.shutdown().await;
}

#[tokio::test]
async fn ended_call_frees_the_agent_and_redials() {
    let engine = create_test_engine().await.expect("engine creation failed");
    engine.status_store().set("test_id", AgentState::Idle);

    let mut session = engine.session("test_id");
    session.on_call_started("(212) 555-0100");

    let mut session = engine.session("test_id");
    session.on_call_ended("(212) 555-0100");

    assert_eq!(engine.status_store().get("test_id"), AgentState::Idle);
    assert!(engine.call_metrics().in_flight_number("test_id").is_none());
    assert_eq!(session.numbers.len(), 2);

    // Shutdown drains the completion queue into the store
    engine.shutdown().await;
    assert_eq!(engine.record_store().record_count().await.unwrap(), 1);
}

#[tokio::test]
async fn ended_call_while_offline_repairs_to_idle() {
    let engine = create_test_engine().await.expect("engine creation failed");

    // No login, no call started: the end event is a protocol violation
    let mut session = engine.session("test_id");
    session.on_call_ended("(212) 555-0100");

    // The state is repaired rather than stranded offline, the half-recorded
    // call is dropped, and dialing resumes for the now-idle agent
    assert_eq!(engine.status_store().get("test_id"), AgentState::Idle);
    assert_eq!(session.numbers.len(), 2);
    engine.shutdown().await;
    assert_eq!(engine.record_store().record_count().await.unwrap(), 0);
}

#[tokio::test]
async fn concurrent_agents_keep_their_own_state() {
    let engine = Arc::new(create_test_engine().await.expect("engine creation failed"));

    let mut handles = Vec::new();
    for i in 0..8 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            let agent_id = format!("agent_{i:04}");

            let mut session = engine.session(&agent_id);
            session.on_agent_login();
            let number = session.numbers[0].clone();

            let mut session = engine.session(&agent_id);
            session.on_call_started(&number);

            let mut session = engine.session(&agent_id);
            session.on_call_ended(&number);

            agent_id
        }));
    }

    for handle in handles {
        let agent_id = handle.await.expect("agent task panicked");
        assert_eq!(engine.status_store().get(&agent_id), AgentState::Idle);
        assert!(engine.call_metrics().in_flight_number(&agent_id).is_none());
    }

    engine.shutdown().await;
    assert_eq!(engine.record_store().record_count().await.unwrap(), 8);
}

#[tokio::test]
async fn file_backed_records_feed_the_report() {
    let path = std::env::temp_dir().join(format!("powerdial-test-{}.db", uuid::Uuid::new_v4()));
    let config = DialerConfig::default().with_database_path(path.to_string_lossy());
    let engine = DialerEngine::new(config).await.expect("engine creation failed");

    let mut session = engine.session("test_id");
    session.on_agent_login();

    let mut session = engine.session("test_id");
    session.on_call_started("(212) 555-0100");

    let mut session = engine.session("test_id");
    session.on_call_ended("(212) 555-0100");

    engine.shutdown().await;

    let report = engine.record_store().agent_report().await.expect("report failed");
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].agent_id, "test_id");
    assert_eq!(report[0].calls, 1);
    assert!(report[0].avg_call_seconds >= 0.0);

    std::fs::remove_file(&path).ok();
}
