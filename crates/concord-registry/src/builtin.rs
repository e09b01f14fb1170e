//! Built-in task types.
//!
//! | Tag | Position | Consistency | Ground truth |
//! |-----|----------|-------------|--------------|
//! | `classification` | normalized `label` | exact match | `true_label` |
//! | `question_answer` | normalized `answer` | token overlap on `answer` | `reference_answer` |
//! | `forecast` | exact `outcome` | exact match | `resolution` |
//! | `rating` | `score` floored to whole points | proximity on `score` (tolerance 4) | `reference_score` |

use crate::models::FieldKind::{Any, Array, Number, String as Text};
use crate::registry::{schema, TaskTypeDefinition};
use crate::rules::{ConsistencyRule, EqualityRule};

pub const CLASSIFICATION: &str = "classification";
pub const QUESTION_ANSWER: &str = "question_answer";
pub const FORECAST: &str = "forecast";
pub const RATING: &str = "rating";

fn prompts(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|s| s.to_string()).collect()
}

pub(crate) fn definitions() -> Vec<TaskTypeDefinition> {
    vec![classification(), question_answer(), forecast(), rating()]
}

fn classification() -> TaskTypeDefinition {
    TaskTypeDefinition::new(
        CLASSIFICATION,
        EqualityRule::NormalizedText {
            field: "label".into(),
        },
        ConsistencyRule::ExactMatch,
    )
    .with_description("Assign one label to an item")
    .with_input_schema(schema(&[
        ("item", Any, true),
        ("label_options", Array, false),
        ("true_label", Text, false),
    ]))
    .with_feedback_schema(schema(&[
        ("label", Text, true),
        ("confidence", Number, false),
        ("reasoning", Text, false),
    ]))
    .with_ground_truth(vec!["true_label".into()])
    .with_critical_prompts(prompts(&[
        "Argue for the strongest label other than the obvious one.",
        "Identify features of the item that the majority label ignores.",
    ]))
}

fn question_answer() -> TaskTypeDefinition {
    TaskTypeDefinition::new(
        QUESTION_ANSWER,
        EqualityRule::NormalizedText {
            field: "answer".into(),
        },
        ConsistencyRule::TokenOverlap {
            field: "answer".into(),
        },
    )
    .with_description("Answer a free-text question")
    .with_input_schema(schema(&[
        ("question", Text, true),
        ("context", Text, false),
        ("reference_answer", Text, false),
    ]))
    .with_feedback_schema(schema(&[
        ("answer", Text, true),
        ("reasoning", Text, false),
        ("sources", Array, false),
    ]))
    .with_ground_truth(vec!["reference_answer".into()])
    .with_critical_prompts(prompts(&[
        "Look for an interpretation of the question under which the expected answer is wrong.",
        "List assumptions the candidate answer depends on and test each one.",
    ]))
}

fn forecast() -> TaskTypeDefinition {
    TaskTypeDefinition::new(
        FORECAST,
        EqualityRule::Exact {
            fields: vec!["outcome".into()],
        },
        ConsistencyRule::ExactMatch,
    )
    .with_description("Predict the outcome of a future event")
    .with_input_schema(schema(&[
        ("question", Text, true),
        ("outcomes", Array, false),
        ("resolution", Any, false),
    ]))
    .with_feedback_schema(schema(&[
        ("outcome", Any, true),
        ("probability", Number, false),
        ("reasoning", Text, false),
    ]))
    .with_ground_truth(vec!["resolution".into()])
    .with_critical_prompts(prompts(&[
        "Construct the most plausible scenario in which the consensus outcome does not happen.",
        "Check whether base rates support the expected outcome.",
    ]))
}

fn rating() -> TaskTypeDefinition {
    TaskTypeDefinition::new(
        RATING,
        EqualityRule::NumericBucket {
            field: "score".into(),
            width: 1.0,
        },
        ConsistencyRule::NumericProximity {
            field: "score".into(),
            tolerance: 4.0,
        },
    )
    .with_description("Rate a subject on a numeric scale")
    .with_input_schema(schema(&[
        ("subject", Any, true),
        ("scale_max", Number, false),
        ("reference_score", Number, false),
    ]))
    .with_feedback_schema(schema(&[
        ("score", Number, true),
        ("reasoning", Text, false),
    ]))
    .with_ground_truth(vec!["reference_score".into()])
    .with_critical_prompts(prompts(&[
        "Rate from the perspective of the most demanding plausible user.",
        "Name the single weakest aspect of the subject and weigh it fully.",
    ]))
}
