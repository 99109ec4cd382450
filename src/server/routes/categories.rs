use std::collections::BTreeMap;

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Router,
};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::{
    db::{
        queries::{
            categories::{get_all_categories, get_category},
            questions::get_questions_for_category,
        },
        Category, Question,
    },
    server::app::AppState,
};

use super::{ApiError, ApiResponse, Success};

/// Category id to type name. Ids serialize as string keys.
pub(super) type CategoryNames = BTreeMap<i64, String>;

pub(super) fn category_names(categories: Vec<Category>) -> CategoryNames {
    categories.into_iter().map(|c| (c.id, c.kind)).collect()
}

#[derive(Serialize)]
struct CategoriesBody {
    categories: CategoryNames,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CategoryQuestions {
    questions: Vec<Question>,
    total_questions: usize,
    current_category: String,
}

async fn get_categories(State(pool): State<SqlitePool>) -> ApiResponse<CategoriesBody> {
    let categories = get_all_categories(&pool).await?;
    if categories.is_empty() {
        return Err(ApiError::NotFound);
    }
    Ok(Success::new(CategoriesBody {
        categories: category_names(categories),
    }))
}

async fn questions_for_category(
    State(pool): State<SqlitePool>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResponse<CategoryQuestions> {
    let Path(id) = id?;
    let category = get_category(&pool, id).await?;
    let questions = get_questions_for_category(&pool, id).await?;
    Ok(Success::new(CategoryQuestions {
        total_questions: questions.len(),
        questions,
        current_category: category.kind,
    }))
}

pub fn category_router(state: AppState) -> Router {
    Router::new()
        .route("/categories", get(get_categories))
        .route("/categories/{id}/questions", get(questions_for_category))
        .with_state(state)
}
