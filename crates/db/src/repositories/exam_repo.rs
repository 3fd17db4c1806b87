//! Repositories for the `exams` and `question_parts` tables.

use examsplit_core::types::DbId;
use sqlx::PgPool;

use crate::models::exam::{CreateExam, CreateQuestionPart, Exam, QuestionPart};

/// Column list for `exams` queries.
const COLUMNS: &str = "id, name, sheet_count, created_at, updated_at";

/// Column list for `question_parts` queries.
const PART_COLUMNS: &str =
    "id, exam_id, question_number, part_number, pages, created_at, updated_at";

/// Provides CRUD operations for exams.
pub struct ExamRepo;

impl ExamRepo {
    /// Insert a new exam.
    pub async fn create(pool: &PgPool, input: &CreateExam) -> Result<Exam, sqlx::Error> {
        let query = format!(
            "INSERT INTO exams (name, sheet_count) VALUES ($1, $2) RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Exam>(&query)
            .bind(&input.name)
            .bind(input.sheet_count)
            .fetch_one(pool)
            .await
    }

    /// Find an exam by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Exam>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM exams WHERE id = $1");
        sqlx::query_as::<_, Exam>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}

/// Provides CRUD operations for question parts.
pub struct QuestionPartRepo;

impl QuestionPartRepo {
    /// Insert a new question part.
    pub async fn create(
        pool: &PgPool,
        input: &CreateQuestionPart,
    ) -> Result<QuestionPart, sqlx::Error> {
        let query = format!(
            "INSERT INTO question_parts (exam_id, question_number, part_number, pages) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {PART_COLUMNS}"
        );
        sqlx::query_as::<_, QuestionPart>(&query)
            .bind(input.exam_id)
            .bind(input.question_number)
            .bind(input.part_number)
            .bind(&input.pages)
            .fetch_one(pool)
            .await
    }

    /// List all question parts of an exam in question/part order.
    pub async fn list_by_exam(
        pool: &PgPool,
        exam_id: DbId,
    ) -> Result<Vec<QuestionPart>, sqlx::Error> {
        let query = format!(
            "SELECT {PART_COLUMNS} FROM question_parts \
             WHERE exam_id = $1 \
             ORDER BY question_number, part_number"
        );
        sqlx::query_as::<_, QuestionPart>(&query)
            .bind(exam_id)
            .fetch_all(pool)
            .await
    }
}
