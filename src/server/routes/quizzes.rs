use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use serde_aux::field_attributes::deserialize_option_number_from_string;
use sqlx::SqlitePool;

use crate::{
    db::{queries::questions::get_quiz_candidates, Question},
    server::app::AppState,
    telemetry::QUIZ_QUESTIONS_SERVED,
};

use super::{ApiError, ApiResponse, Success};

/// Category id that stands for "all categories".
const ALL_CATEGORIES: i64 = 0;

#[derive(Deserialize)]
struct QuizRequest {
    quiz_category: Option<QuizCategory>,
    previous_questions: Option<Vec<i64>>,
}

#[derive(Deserialize)]
struct QuizCategory {
    #[serde(default, deserialize_with = "deserialize_option_number_from_string")]
    id: Option<i64>,
}

/// `question` is left out once the pool is exhausted.
#[derive(Serialize)]
struct QuizRound {
    #[serde(skip_serializing_if = "Option::is_none")]
    question: Option<Question>,
}

async fn next_quiz_question(
    State(pool): State<SqlitePool>,
    body: Result<Json<QuizRequest>, JsonRejection>,
) -> ApiResponse<QuizRound> {
    let Json(request) = body?;
    let (Some(QuizCategory { id: Some(category) }), Some(previous_questions)) =
        (request.quiz_category, request.previous_questions)
    else {
        return Err(ApiError::BadRequest);
    };

    let category = (category != ALL_CATEGORIES).then_some(category);
    let candidates = get_quiz_candidates(&pool, category, &previous_questions).await?;
    let question = candidates.choose(&mut rand::thread_rng()).cloned();

    match &question {
        Some(q) => {
            QUIZ_QUESTIONS_SERVED
                .with_label_values(&[q.category.to_string().as_str()])
                .inc();
        }
        None => tracing::debug!(
            "Quiz pool exhausted after {} questions",
            previous_questions.len()
        ),
    }
    Ok(Success::new(QuizRound { question }))
}

pub fn quizzes_router(state: AppState) -> Router {
    Router::new()
        .route("/quizzes", post(next_quiz_question))
        .with_state(state)
}
