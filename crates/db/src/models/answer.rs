//! Answer booklet models: answers, their pages and question-part answers.

use examsplit_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `answers` table. One per student booklet.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Answer {
    pub id: DbId,
    pub exam_id: DbId,
    pub upload_id: DbId,
    pub booklet_index: i32,
    /// Unset until roster matching resolves who wrote the booklet.
    pub owner_id: Option<DbId>,
    pub page_count: i32,
    pub document_path: String,
    pub image_prefix: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert DTO for an answer.
#[derive(Debug, Clone)]
pub struct NewAnswer {
    pub exam_id: DbId,
    pub upload_id: DbId,
    pub booklet_index: i32,
    pub page_count: i32,
    pub document_path: String,
    pub image_prefix: String,
}

/// A row from the `answer_pages` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AnswerPage {
    pub id: DbId,
    pub answer_id: DbId,
    pub page_number: i32,
    pub image_path: String,
    pub large_image_path: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert DTO for one page of an answer.
#[derive(Debug, Clone)]
pub struct NewAnswerPage {
    pub page_number: i32,
    pub image_path: String,
    pub large_image_path: String,
}

/// A row from the `question_part_answers` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionPartAnswer {
    pub id: DbId,
    pub answer_id: DbId,
    pub question_part_id: DbId,
    /// Comma-separated physical pages, e.g. `"1,3"`.
    pub pages: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert DTO for one question-part answer.
#[derive(Debug, Clone)]
pub struct NewQuestionPartAnswer {
    pub question_part_id: DbId,
    pub pages: String,
}

/// First page of a booklet still awaiting roster matching.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UnassignedPage {
    pub page_id: DbId,
    pub answer_id: DbId,
    pub upload_id: DbId,
    pub booklet_index: i32,
    pub image_path: String,
    pub large_image_path: String,
}
