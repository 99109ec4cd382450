use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;

use crate::{
    db::{
        queries::{categories::get_all_categories, questions},
        NewQuestion, Question,
    },
    server::app::AppState,
    telemetry::{QUESTIONS_CREATED, QUESTIONS_DELETED},
};

use super::categories::{category_names, CategoryNames};
use super::{ApiError, ApiResponse, Success};

pub const QUESTIONS_PER_PAGE: u32 = 10;

#[derive(Deserialize)]
struct PageQuery {
    page: Option<u32>,
}

// Fields stay untyped here: a missing or null field is a bad request, while a
// present value of the wrong type is unprocessable.
#[derive(Deserialize)]
struct QuestionsBody {
    #[serde(rename = "searchTerm")]
    search_term: Option<Value>,
    question: Option<Value>,
    answer: Option<Value>,
    category: Option<Value>,
    difficulty: Option<Value>,
}

/// The text to search for when `searchTerm` is truthy. Falsy values
/// (`""`, `0`, `false`, empty arrays and objects) select creation instead.
fn search_term(value: Option<Value>) -> Option<String> {
    match value? {
        Value::Null | Value::Bool(false) => None,
        Value::String(term) => (!term.is_empty()).then_some(term),
        Value::Number(n) => (n.as_f64() != Some(0.0)).then(|| n.to_string()),
        Value::Array(items) if items.is_empty() => None,
        Value::Object(fields) if fields.is_empty() => None,
        other => Some(other.to_string()),
    }
}

fn text_field(name: &str, value: Value) -> Result<String, ApiError> {
    match value {
        Value::String(text) => Ok(text),
        Value::Number(n) => Ok(n.to_string()),
        other => {
            tracing::warn!("Cannot store {other} as question {name}");
            Err(ApiError::Unprocessable)
        }
    }
}

// the frontend sends category ids as strings
fn integer_field(name: &str, value: Value) -> Result<i64, ApiError> {
    let parsed = match &value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        tracing::warn!("Cannot store {value} as question {name}");
        ApiError::Unprocessable
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionsPage {
    questions: Vec<Question>,
    total_questions: i64,
    categories: CategoryNames,
    current_category: Option<String>,
}

#[derive(Serialize)]
struct Deleted {
    id: i64,
}

// snake_case total is what existing clients read
#[derive(Serialize)]
struct SearchResults {
    questions: Vec<Question>,
    total_questions: usize,
}

async fn list_questions(
    State(pool): State<SqlitePool>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResponse<QuestionsPage> {
    let Query(PageQuery { page }) = query?;
    let page = page.unwrap_or(1);
    if page == 0 {
        return Err(ApiError::NotFound);
    }

    let questions = questions::get_questions_page(&pool, page, QUESTIONS_PER_PAGE).await?;
    let categories = get_all_categories(&pool).await?;
    if questions.is_empty() || categories.is_empty() {
        return Err(ApiError::NotFound);
    }

    Ok(Success::new(QuestionsPage {
        questions,
        total_questions: questions::count_questions(&pool).await?,
        categories: category_names(categories),
        current_category: None,
    }))
}

async fn delete_question(
    State(pool): State<SqlitePool>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResponse<Deleted> {
    let Path(id) = id?;
    questions::delete_question(&pool, id).await.map_err(|e| {
        tracing::warn!("Failed to delete question {id}: {e}");
        ApiError::Unprocessable
    })?;
    QUESTIONS_DELETED.inc();
    tracing::info!("Deleted question {id}");
    Ok(Success::new(Deleted { id }))
}

async fn search_or_create_question(
    State(pool): State<SqlitePool>,
    body: Result<Json<QuestionsBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    match search_term(body.search_term) {
        Some(term) => {
            let questions = questions::search_questions(&pool, &term).await?;
            Ok(Success::new(SearchResults {
                total_questions: questions.len(),
                questions,
            })
            .into_response())
        }
        None => {
            let (Some(question), Some(answer), Some(category), Some(difficulty)) =
                (body.question, body.answer, body.category, body.difficulty)
            else {
                return Err(ApiError::BadRequest);
            };
            let new_question = NewQuestion {
                question: text_field("question", question)?,
                answer: text_field("answer", answer)?,
                category: integer_field("category", category)?,
                difficulty: integer_field("difficulty", difficulty)?,
            };
            let id = questions::create_question(&pool, &new_question)
                .await
                .map_err(|e| {
                    tracing::warn!("Failed to create question: {e}");
                    ApiError::Unprocessable
                })?;
            QUESTIONS_CREATED.inc();
            tracing::info!("Created question {id}");
            Ok(Success::new(()).into_response())
        }
    }
}

pub fn questions_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/questions",
            get(list_questions).post(search_or_create_question),
        )
        .route("/questions/{id}", delete(delete_question))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn search_term_follows_truthiness() {
        assert_eq!(search_term(None), None);
        assert_eq!(search_term(Some(json!(""))), None);
        assert_eq!(search_term(Some(json!(0))), None);
        assert_eq!(search_term(Some(json!(false))), None);
        assert_eq!(search_term(Some(json!([]))), None);
        assert_eq!(search_term(Some(json!("title"))), Some("title".to_owned()));
        assert_eq!(search_term(Some(json!(5))), Some("5".to_owned()));
    }

    #[test]
    fn integer_fields_accept_numeric_strings() {
        assert_eq!(integer_field("category", json!(3)).unwrap(), 3);
        assert_eq!(integer_field("category", json!(" 4 ")).unwrap(), 4);
        assert!(matches!(
            integer_field("difficulty", json!("hard")),
            Err(ApiError::Unprocessable)
        ));
        assert!(matches!(
            integer_field("difficulty", json!(1.5)),
            Err(ApiError::Unprocessable)
        ));
        assert!(matches!(
            text_field("answer", json!({"a": 1})),
            Err(ApiError::Unprocessable)
        ));
    }
}
