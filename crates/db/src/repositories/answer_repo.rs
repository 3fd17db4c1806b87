//! Repositories for `answers`, `answer_pages` and `question_part_answers`.

use examsplit_core::types::DbId;
use sqlx::{PgPool, Postgres, Transaction};

use crate::models::answer::{
    Answer, AnswerPage, NewAnswer, NewAnswerPage, NewQuestionPartAnswer, QuestionPartAnswer,
    UnassignedPage,
};

/// Column list for `answers` queries.
const COLUMNS: &str = "\
    id, exam_id, upload_id, booklet_index, owner_id, page_count, \
    document_path, image_prefix, created_at, updated_at";

/// Column list for `answer_pages` queries.
const PAGE_COLUMNS: &str =
    "id, answer_id, page_number, image_path, large_image_path, created_at, updated_at";

/// Column list for `question_part_answers` queries.
const PART_COLUMNS: &str = "id, answer_id, question_part_id, pages, created_at, updated_at";

/// Provides operations for student answer booklets.
pub struct AnswerRepo;

impl AnswerRepo {
    /// Insert an answer with all of its pages and question-part answers.
    ///
    /// Runs in a single transaction in the order answer → pages → question
    /// parts. Either every row becomes visible or none does.
    pub async fn create_with_children(
        pool: &PgPool,
        answer: &NewAnswer,
        pages: &[NewAnswerPage],
        parts: &[NewQuestionPartAnswer],
    ) -> Result<Answer, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let insert = format!(
            "INSERT INTO answers \
                (exam_id, upload_id, booklet_index, owner_id, page_count, document_path, image_prefix) \
             VALUES ($1, $2, $3, NULL, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let created = sqlx::query_as::<_, Answer>(&insert)
            .bind(answer.exam_id)
            .bind(answer.upload_id)
            .bind(answer.booklet_index)
            .bind(answer.page_count)
            .bind(&answer.document_path)
            .bind(&answer.image_prefix)
            .fetch_one(&mut *tx)
            .await?;

        Self::insert_pages(&mut tx, created.id, pages).await?;
        Self::insert_parts(&mut tx, created.id, parts).await?;

        tx.commit().await?;
        Ok(created)
    }

    async fn insert_pages(
        tx: &mut Transaction<'_, Postgres>,
        answer_id: DbId,
        pages: &[NewAnswerPage],
    ) -> Result<(), sqlx::Error> {
        for page in pages {
            sqlx::query(
                "INSERT INTO answer_pages (answer_id, page_number, image_path, large_image_path) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(answer_id)
            .bind(page.page_number)
            .bind(&page.image_path)
            .bind(&page.large_image_path)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    async fn insert_parts(
        tx: &mut Transaction<'_, Postgres>,
        answer_id: DbId,
        parts: &[NewQuestionPartAnswer],
    ) -> Result<(), sqlx::Error> {
        for part in parts {
            sqlx::query(
                "INSERT INTO question_part_answers (answer_id, question_part_id, pages) \
                 VALUES ($1, $2, $3)",
            )
            .bind(answer_id)
            .bind(part.question_part_id)
            .bind(&part.pages)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    /// Find an answer by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Answer>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM answers WHERE id = $1");
        sqlx::query_as::<_, Answer>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find the answer built for booklet `booklet_index` of an upload.
    pub async fn find_by_booklet(
        pool: &PgPool,
        upload_id: DbId,
        booklet_index: i32,
    ) -> Result<Option<Answer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM answers WHERE upload_id = $1 AND booklet_index = $2"
        );
        sqlx::query_as::<_, Answer>(&query)
            .bind(upload_id)
            .bind(booklet_index)
            .fetch_optional(pool)
            .await
    }

    /// List all answers of an upload in booklet order.
    pub async fn list_by_upload(
        pool: &PgPool,
        upload_id: DbId,
    ) -> Result<Vec<Answer>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM answers WHERE upload_id = $1 ORDER BY booklet_index"
        );
        sqlx::query_as::<_, Answer>(&query)
            .bind(upload_id)
            .fetch_all(pool)
            .await
    }

    /// Count the answers of an upload.
    pub async fn count_by_upload(pool: &PgPool, upload_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM answers WHERE upload_id = $1")
            .bind(upload_id)
            .fetch_one(pool)
            .await
    }
}

/// Provides read access to answer pages.
pub struct AnswerPageRepo;

impl AnswerPageRepo {
    /// List the pages of an answer in page order.
    pub async fn list_by_answer(
        pool: &PgPool,
        answer_id: DbId,
    ) -> Result<Vec<AnswerPage>, sqlx::Error> {
        let query = format!(
            "SELECT {PAGE_COLUMNS} FROM answer_pages WHERE answer_id = $1 ORDER BY page_number"
        );
        sqlx::query_as::<_, AnswerPage>(&query)
            .bind(answer_id)
            .fetch_all(pool)
            .await
    }

    /// First pages of an exam's booklets whose owner is still unset.
    ///
    /// This is what a reviewer sees when assigning booklets to students.
    pub async fn list_unassigned_first_pages(
        pool: &PgPool,
        exam_id: DbId,
    ) -> Result<Vec<UnassignedPage>, sqlx::Error> {
        sqlx::query_as::<_, UnassignedPage>(
            "SELECT p.id AS page_id, a.id AS answer_id, a.upload_id, a.booklet_index, \
                    p.image_path, p.large_image_path \
             FROM answer_pages p \
             JOIN answers a ON a.id = p.answer_id \
             WHERE a.exam_id = $1 AND a.owner_id IS NULL AND p.page_number = 1 \
             ORDER BY a.upload_id, a.booklet_index",
        )
        .bind(exam_id)
        .fetch_all(pool)
        .await
    }
}

/// Provides read access to question-part answers.
pub struct QuestionPartAnswerRepo;

impl QuestionPartAnswerRepo {
    /// List the question-part answers of an answer.
    pub async fn list_by_answer(
        pool: &PgPool,
        answer_id: DbId,
    ) -> Result<Vec<QuestionPartAnswer>, sqlx::Error> {
        let query = format!(
            "SELECT {PART_COLUMNS} FROM question_part_answers \
             WHERE answer_id = $1 \
             ORDER BY question_part_id"
        );
        sqlx::query_as::<_, QuestionPartAnswer>(&query)
            .bind(answer_id)
            .fetch_all(pool)
            .await
    }
}
