//! # Property Tests
//!
//! Engine-level guarantees over generated users, credentials and feedback.

use concord_core::{
    ConsensusEngine, Credential, CredentialType, EngineConfig, ScoreStore, TaskStatus, User,
    UserScores,
};
use proptest::prelude::*;
use serde_json::json;

const LABELS: [&str; 4] = ["spam", "ham", "promo", "phishing"];

fn credential() -> impl Strategy<Value = Credential> {
    prop_oneof![
        prop::sample::select(vec!["phd", "masters", "bachelors", "unknown"])
            .prop_map(|v| Credential::verified(CredentialType::AcademicDegree, v)),
        (0u32..60).prop_map(|y| Credential::verified(CredentialType::YearsExperience, y.to_string())),
        (0u32..500).prop_map(|p| Credential::verified(CredentialType::Publications, p.to_string())),
        (0u32..40).prop_map(|e| Credential::verified(CredentialType::PeerEndorsement, e.to_string())),
        Just(Credential::new(CredentialType::ProfessionalLicense, "active", false)),
    ]
}

fn run_cycle(votes: &[(usize, f64)]) -> ConsensusEngine {
    let engine = ConsensusEngine::in_memory(EngineConfig::default()).unwrap();
    engine
        .create_task("t", "classification", &json!({"item": "subject"}))
        .unwrap();
    for (i, (label, authority)) in votes.iter().enumerate() {
        let id = format!("u{}", i);
        engine
            .store()
            .insert_user(User {
                id: id.clone(),
                scores: UserScores {
                    authority: *authority,
                    baseline: 0.0,
                    track_record: 0.5,
                },
                credentials: Vec::new(),
                profile: Default::default(),
            })
            .unwrap();
        engine
            .capture_feedback("t", &id, json!({"label": LABELS[*label]}))
            .unwrap();
    }
    engine
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_registered_scores_in_range(creds in prop::collection::vec(credential(), 0..12)) {
        let engine = ConsensusEngine::in_memory(EngineConfig::default()).unwrap();
        let user = engine.register_user("u", creds, Default::default()).unwrap();
        prop_assert!((0.0..=2.0).contains(&user.scores.baseline));
        prop_assert!((0.0..=2.0).contains(&user.scores.authority));
    }

    #[test]
    fn prop_cycle_keeps_scores_in_range(
        votes in prop::collection::vec((0..LABELS.len(), 0.0f64..=2.0), 1..25),
    ) {
        let engine = run_cycle(&votes);
        let report = engine.process_task("t").unwrap();
        prop_assert_eq!(report.updates.len(), votes.len());
        for update in &report.updates {
            prop_assert!((0.0..=1.0).contains(&update.current.track_record));
            prop_assert!((0.0..=2.0).contains(&update.current.authority));
            prop_assert!(
                (update.current.track_record - update.previous.track_record).abs() <= 0.05 + 1e-12
            );
        }
        prop_assert_eq!(engine.task("t").unwrap().status, TaskStatus::Aggregated);
    }

    #[test]
    fn prop_reaggregation_is_idempotent(
        votes in prop::collection::vec((0..LABELS.len(), 0.0f64..=2.0), 1..25),
    ) {
        let engine = run_cycle(&votes);
        let first = engine.process_task("t").unwrap().record;
        let second = engine.reaggregate("t").unwrap();
        prop_assert_eq!(
            serde_json::to_vec(&first.result).unwrap(),
            serde_json::to_vec(&second.result).unwrap()
        );
        prop_assert_eq!(first.primary_position, second.primary_position);
    }
}
