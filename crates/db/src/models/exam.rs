//! Exam and question-part models.

use examsplit_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `exams` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Exam {
    pub id: DbId,
    pub name: String,
    /// Front sheets per student booklet. Each sheet is scanned front and back.
    pub sheet_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating an exam.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateExam {
    pub name: String,
    pub sheet_count: i32,
}

/// A row from the `question_parts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct QuestionPart {
    pub id: DbId,
    pub exam_id: DbId,
    pub question_number: i32,
    pub part_number: i32,
    /// Comma-separated logical (front-only) pages, e.g. `"1,2"`.
    pub pages: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a question part.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuestionPart {
    pub exam_id: DbId,
    pub question_number: i32,
    pub part_number: i32,
    pub pages: String,
}
