//! Unit tests for concord-core.

use crate::{ConsensusEngine, EngineConfig, TaskStatus};
use serde_json::json;

#[test]
fn test_crate_structure() {
    // Smoke test - one cycle through the public facade
    let engine = ConsensusEngine::in_memory(EngineConfig::default()).unwrap();
    engine.register_user("u1", Vec::new(), Default::default()).unwrap();
    engine
        .create_task("t1", "forecast", &json!({"question": "Will it rain?", "resolution": "yes"}))
        .unwrap();
    engine
        .capture_feedback("t1", "u1", json!({"outcome": "yes", "probability": 0.8}))
        .unwrap();
    let report = engine.process_task("t1").unwrap();
    assert!(report.record.result.is_consensus());
    assert_eq!(engine.close_task("t1").unwrap().status, TaskStatus::Closed);
}
