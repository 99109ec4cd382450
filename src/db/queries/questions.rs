use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub question: String,
    pub answer: String,
    pub category: i64,
    pub difficulty: i64,
}

pub struct NewQuestion {
    pub question: String,
    pub answer: String,
    pub category: i64,
    pub difficulty: i64,
}

const QUESTION_COLUMNS: &str = "SELECT id, question, answer, category, difficulty FROM questions";

pub async fn get_all_questions(pool: &SqlitePool) -> sqlx::Result<Vec<Question>> {
    sqlx::query_as::<_, Question>(&format!("{QUESTION_COLUMNS} ORDER BY id"))
        .fetch_all(pool)
        .await
}

pub async fn get_question_by_id(pool: &SqlitePool, id: i64) -> sqlx::Result<Question> {
    sqlx::query_as::<_, Question>(&format!("{QUESTION_COLUMNS} WHERE questions.id = ?1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub async fn count_questions(pool: &SqlitePool) -> sqlx::Result<i64> {
    sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM questions
        "#,
    )
    .fetch_one(pool)
    .await
}

/// Returns the 1-indexed `page` of questions ordered by id. Pages past the end are empty.
pub async fn get_questions_page(
    pool: &SqlitePool,
    page: u32,
    per_page: u32,
) -> sqlx::Result<Vec<Question>> {
    let offset = i64::from(page.saturating_sub(1)) * i64::from(per_page);
    sqlx::query_as::<_, Question>(&format!("{QUESTION_COLUMNS} ORDER BY id LIMIT ?1 OFFSET ?2"))
        .bind(i64::from(per_page))
        .bind(offset)
        .fetch_all(pool)
        .await
}

pub async fn get_questions_for_category(
    pool: &SqlitePool,
    category: i64,
) -> sqlx::Result<Vec<Question>> {
    sqlx::query_as::<_, Question>(&format!(
        "{QUESTION_COLUMNS} WHERE questions.category = ?1 ORDER BY id"
    ))
    .bind(category)
    .fetch_all(pool)
    .await
}

/// Case-insensitive substring match on the question text. Matching runs on
/// fetched rows because SQLite `LIKE` only folds ASCII letters.
pub async fn search_questions(pool: &SqlitePool, term: &str) -> sqlx::Result<Vec<Question>> {
    let needle = term.to_lowercase();
    let questions = get_all_questions(pool).await?;
    Ok(questions
        .into_iter()
        .filter(|q| q.question.to_lowercase().contains(&needle))
        .collect())
}

/// Questions eligible for the next quiz round. `category` of `None` spans all categories.
pub async fn get_quiz_candidates(
    pool: &SqlitePool,
    category: Option<i64>,
    previous_questions: &[i64],
) -> sqlx::Result<Vec<Question>> {
    let mut query = QueryBuilder::<Sqlite>::new(QUESTION_COLUMNS);
    query.push(" WHERE 1 = 1");
    if let Some(category) = category {
        query.push(" AND questions.category = ").push_bind(category);
    }
    if !previous_questions.is_empty() {
        query.push(" AND questions.id NOT IN (");
        let mut ids = query.separated(", ");
        for id in previous_questions {
            ids.push_bind(*id);
        }
        ids.push_unseparated(")");
    }
    query.push(" ORDER BY id");
    let candidates = query.build_query_as::<Question>().fetch_all(pool).await?;
    Ok(candidates)
}

pub async fn create_question(pool: &SqlitePool, question: &NewQuestion) -> sqlx::Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO questions (question, answer, category, difficulty) VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(&question.question)
    .bind(&question.answer)
    .bind(question.category)
    .bind(question.difficulty)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

async fn insert_question_with_id(pool: &SqlitePool, question: &Question) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO questions (id, question, answer, category, difficulty)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(question.id)
    .bind(&question.question)
    .bind(&question.answer)
    .bind(question.category)
    .bind(question.difficulty)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_question(pool: &SqlitePool, question: &Question) -> sqlx::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE questions SET question=?1, answer=?2, category=?3, difficulty=?4
        WHERE questions.id = ?5
        "#,
    )
    .bind(&question.question)
    .bind(&question.answer)
    .bind(question.category)
    .bind(question.difficulty)
    .bind(question.id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Fails with `RowNotFound` when no question has this id.
pub async fn delete_question(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM questions WHERE questions.id = ?1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

/// Makes the stored questions match `questions`, keyed by id.
pub async fn import_questions(pool: &SqlitePool, questions: Vec<Question>) -> sqlx::Result<()> {
    let existing_ids: HashSet<i64> = get_all_questions(pool)
        .await?
        .iter()
        .map(|q| q.id)
        .collect();
    let new_ids: HashSet<i64> = questions.iter().map(|q| q.id).collect();
    for id in existing_ids.difference(&new_ids) {
        delete_question(pool, *id).await?;
    }
    for question in questions {
        if existing_ids.contains(&question.id) {
            update_question(pool, &question).await?;
        } else {
            insert_question_with_id(pool, &question).await?;
        }
    }
    tracing::info!("Imported {} questions", new_ids.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    fn new_question(text: &str, category: i64) -> NewQuestion {
        NewQuestion {
            question: text.to_owned(),
            answer: "answer".to_owned(),
            category,
            difficulty: 1,
        }
    }

    #[tokio::test]
    async fn pages_are_capped_and_ordered() {
        let pool = memory_pool().await;
        for n in 0..23 {
            create_question(&pool, &new_question(&format!("Question {n}"), 1))
                .await
                .unwrap();
        }

        let first = get_questions_page(&pool, 1, 10).await.unwrap();
        let third = get_questions_page(&pool, 3, 10).await.unwrap();
        let fourth = get_questions_page(&pool, 4, 10).await.unwrap();

        assert_eq!(first.len(), 10);
        assert_eq!(first[0].question, "Question 0");
        assert_eq!(third.len(), 3);
        assert_eq!(third[0].question, "Question 20");
        assert!(fourth.is_empty());
        assert_eq!(count_questions(&pool).await.unwrap(), 23);
    }

    #[tokio::test]
    async fn search_ignores_case_and_wildcards() {
        let pool = memory_pool().await;
        create_question(&pool, &new_question("What is the TITLE of the book?", 1))
            .await
            .unwrap();
        create_question(&pool, &new_question("Who scored 100% in 1990?", 2))
            .await
            .unwrap();
        create_question(&pool, &new_question("Which river is longest?", 3))
            .await
            .unwrap();

        let found = search_questions(&pool, "title").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question, "What is the TITLE of the book?");

        let percent = search_questions(&pool, "100%").await.unwrap();
        assert_eq!(percent.len(), 1);

        let percent_only = search_questions(&pool, "%").await.unwrap();
        assert_eq!(percent_only.len(), 1);
        assert!(search_questions(&pool, "s0meth1ngn0tex1st")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn search_folds_non_ascii_case() {
        let pool = memory_pool().await;
        create_question(&pool, &new_question("Où se trouve l'ÉCOLE polytechnique?", 1))
            .await
            .unwrap();
        create_question(&pool, &new_question("Wie heißt die STRASSE?", 1))
            .await
            .unwrap();

        let found = search_questions(&pool, "école").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].question, "Où se trouve l'ÉCOLE polytechnique?");

        let upper = search_questions(&pool, "OÙ SE").await.unwrap();
        assert_eq!(upper.len(), 1);
    }

    #[tokio::test]
    async fn quiz_candidates_exclude_previous_questions() {
        let pool = memory_pool().await;
        let a = create_question(&pool, &new_question("a", 1)).await.unwrap();
        let b = create_question(&pool, &new_question("b", 1)).await.unwrap();
        let c = create_question(&pool, &new_question("c", 2)).await.unwrap();

        let all: Vec<i64> = get_quiz_candidates(&pool, None, &[b])
            .await
            .unwrap()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(all, vec![a, c]);

        let science: Vec<i64> = get_quiz_candidates(&pool, Some(1), &[a])
            .await
            .unwrap()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(science, vec![b]);

        assert!(get_quiz_candidates(&pool, Some(2), &[c])
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_question_fails() {
        let pool = memory_pool().await;
        let id = create_question(&pool, &new_question("a", 1)).await.unwrap();

        delete_question(&pool, id).await.unwrap();
        assert!(matches!(
            get_question_by_id(&pool, id).await,
            Err(sqlx::Error::RowNotFound)
        ));
        assert!(matches!(
            delete_question(&pool, id).await,
            Err(sqlx::Error::RowNotFound)
        ));
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let pool = memory_pool().await;
        let first = create_question(&pool, &new_question("a", 1)).await.unwrap();
        delete_question(&pool, first).await.unwrap();
        let second = create_question(&pool, &new_question("b", 1)).await.unwrap();
        assert!(second > first);
    }
}
