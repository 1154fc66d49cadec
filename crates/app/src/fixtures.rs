//! Small built-in question bank used by `seed` and `demo`.

use quiz_core::model::{CategoryId, OptionDraft, OptionId, QuestionDraft, QuestionId, QuestionKind};
use services::{ContentError, ContentService};

struct Fixture {
    category: u64,
    prompt: &'static str,
    explanation: &'static str,
    options: [&'static str; 4],
    correct: usize,
}

const CATEGORIES: [(u64, &str, &str); 2] = [
    (1, "Geography", "Capitals and landmarks"),
    (2, "Arithmetic", "Mental math warm-ups"),
];

const QUESTIONS: [Fixture; 6] = [
    Fixture {
        category: 1,
        prompt: "What is the capital of Canada?",
        explanation: "Ottawa became the capital in 1857.",
        options: ["Toronto", "Ottawa", "Montreal", "Vancouver"],
        correct: 1,
    },
    Fixture {
        category: 1,
        prompt: "Which river flows through Cairo?",
        explanation: "The Nile runs north through Cairo into the Mediterranean.",
        options: ["Nile", "Tigris", "Danube", "Congo"],
        correct: 0,
    },
    Fixture {
        category: 1,
        prompt: "Mount Kilimanjaro is located in which country?",
        explanation: "It lies in northern Tanzania near the Kenyan border.",
        options: ["Kenya", "Uganda", "Tanzania", "Ethiopia"],
        correct: 2,
    },
    Fixture {
        category: 2,
        prompt: "What is 12 × 12?",
        explanation: "12 × 12 = 144.",
        options: ["124", "144", "132", "154"],
        correct: 1,
    },
    Fixture {
        category: 2,
        prompt: "What is 15% of 200?",
        explanation: "0.15 × 200 = 30.",
        options: ["15", "20", "25", "30"],
        correct: 3,
    },
    Fixture {
        category: 2,
        prompt: "What is the square root of 81?",
        explanation: "9 × 9 = 81.",
        options: ["9", "8", "7", "11"],
        correct: 0,
    },
];

/// Upsert the built-in categories and questions. Safe to run repeatedly.
///
/// Returns the number of questions written.
pub async fn load(content: &ContentService) -> Result<usize, ContentError> {
    for (id, name, description) in CATEGORIES {
        content
            .create_category(
                CategoryId::new(id),
                name,
                Some(description.to_string()),
                i32::try_from(id).unwrap_or(i32::MAX),
            )
            .await?;
    }

    for (index, fixture) in (1_u64..).zip(QUESTIONS.iter()) {
        let options = (0_u64..)
            .zip(fixture.options.iter())
            .map(|(offset, text)| {
                OptionDraft::new(
                    OptionId::new(index * 10 + offset),
                    *text,
                    usize::try_from(offset).is_ok_and(|o| o == fixture.correct),
                )
            })
            .collect();
        content
            .save_question(QuestionDraft {
                id: QuestionId::new(index),
                category_id: CategoryId::new(fixture.category),
                prompt: fixture.prompt.to_string(),
                explanation: Some(fixture.explanation.to_string()),
                kind: QuestionKind::SingleChoice,
                options,
            })
            .await?;
    }

    tracing::info!(questions = QUESTIONS.len(), "fixtures loaded");
    Ok(QUESTIONS.len())
}
