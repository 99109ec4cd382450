use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Category {
    pub id: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
}

pub async fn get_all_categories(pool: &SqlitePool) -> sqlx::Result<Vec<Category>> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, "type" FROM categories ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn get_category(pool: &SqlitePool, id: i64) -> sqlx::Result<Category> {
    sqlx::query_as::<_, Category>(
        r#"
        SELECT id, "type" FROM categories WHERE categories.id = ?1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub async fn create_category(pool: &SqlitePool, kind: &str) -> sqlx::Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO categories ("type") VALUES (?1)
        "#,
    )
    .bind(kind)
    .execute(pool)
    .await?
    .last_insert_rowid();

    Ok(id)
}

async fn insert_category_with_id(pool: &SqlitePool, category: &Category) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO categories (id, "type") VALUES (?1, ?2)
        "#,
    )
    .bind(category.id)
    .bind(&category.kind)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn update_category(pool: &SqlitePool, category: &Category) -> sqlx::Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE categories SET "type"=?1 WHERE categories.id = ?2
        "#,
    )
    .bind(&category.kind)
    .bind(category.id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    Ok(())
}

pub async fn delete_category(pool: &SqlitePool, id: i64) -> sqlx::Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM categories WHERE categories.id = ?1
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

/// Makes the stored categories match `categories`, keyed by id.
pub async fn import_categories(pool: &SqlitePool, categories: Vec<Category>) -> sqlx::Result<()> {
    let existing_ids: HashSet<i64> = get_all_categories(pool)
        .await?
        .iter()
        .map(|c| c.id)
        .collect();
    let new_ids: HashSet<i64> = categories.iter().map(|c| c.id).collect();
    for id in existing_ids.difference(&new_ids) {
        delete_category(pool, *id).await?;
    }
    for category in categories {
        if existing_ids.contains(&category.id) {
            update_category(pool, &category).await?;
        } else {
            insert_category_with_id(pool, &category).await?;
        }
    }
    tracing::info!("Imported {} categories", new_ids.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn categories_are_listed_in_id_order() {
        let pool = memory_pool().await;
        let science = create_category(&pool, "Science").await.unwrap();
        let art = create_category(&pool, "Art").await.unwrap();

        let categories = get_all_categories(&pool).await.unwrap();
        assert_eq!(
            categories,
            vec![
                Category {
                    id: science,
                    kind: "Science".into(),
                },
                Category {
                    id: art,
                    kind: "Art".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn missing_category_is_row_not_found() {
        let pool = memory_pool().await;
        let err = get_category(&pool, 42).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::RowNotFound));
    }

    #[tokio::test]
    async fn import_replaces_updates_and_inserts() {
        let pool = memory_pool().await;
        create_category(&pool, "Science").await.unwrap();
        create_category(&pool, "Art").await.unwrap();

        import_categories(
            &pool,
            vec![
                Category {
                    id: 2,
                    kind: "Fine Art".into(),
                },
                Category {
                    id: 7,
                    kind: "Sports".into(),
                },
            ],
        )
        .await
        .unwrap();

        let categories = get_all_categories(&pool).await.unwrap();
        assert_eq!(
            categories,
            vec![
                Category {
                    id: 2,
                    kind: "Fine Art".into(),
                },
                Category {
                    id: 7,
                    kind: "Sports".into(),
                },
            ]
        );
    }
}
