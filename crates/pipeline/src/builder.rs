//! Answer record builder.
//!
//! Turns one split booklet into persisted records: the booklet document
//! goes to the document store, then the answer, its pages and its
//! question-part answers are inserted in one transaction. A failure at any
//! point removes the stored document, so no partial answer is ever visible.

use examsplit_core::error::CoreError;
use examsplit_core::naming::{booklet_locators, NamingLaw};
use examsplit_core::pages::physical_page_list;
use examsplit_core::types::DbId;
use examsplit_db::models::answer::{Answer, NewAnswer, NewAnswerPage, NewQuestionPartAnswer};
use examsplit_db::models::exam::{Exam, QuestionPart};
use examsplit_db::repositories::AnswerRepo;
use examsplit_db::DbPool;

use crate::error::PipelineError;
use crate::scratch;
use crate::splitter::StudentAnswerDocument;
use crate::store::{document_key, DocumentStore};

/// A persisted answer and whether it already existed.
#[derive(Debug, Clone)]
pub struct BuiltAnswer {
    pub answer: Answer,
    /// `true` when a previous run had already built this booklet.
    pub reused: bool,
}

/// Builds answer records for the booklets of one upload.
pub struct AnswerBuilder<'a> {
    pool: &'a DbPool,
    store: &'a dyn DocumentStore,
    naming: NamingLaw,
}

impl<'a> AnswerBuilder<'a> {
    pub fn new(pool: &'a DbPool, store: &'a dyn DocumentStore, naming: NamingLaw) -> Self {
        Self {
            pool,
            store,
            naming,
        }
    }

    /// Persist one student's booklet under `prefix`.
    ///
    /// The booklet's scratch file is removed whatever the outcome. When the
    /// booklet was already built for this upload, the existing answer is
    /// returned unchanged and `prefix` is ignored.
    pub async fn build(
        &self,
        exam: &Exam,
        question_parts: &[QuestionPart],
        upload_id: DbId,
        student: &StudentAnswerDocument,
        prefix: &str,
    ) -> Result<BuiltAnswer, PipelineError> {
        let result = self
            .build_inner(exam, question_parts, upload_id, student, prefix)
            .await;

        if let Err(e) = scratch::remove_file(&student.path).await {
            tracing::warn!(
                path = %student.path.display(),
                error = %e,
                "Failed to remove booklet scratch file",
            );
        }

        result
    }

    async fn build_inner(
        &self,
        exam: &Exam,
        question_parts: &[QuestionPart],
        upload_id: DbId,
        student: &StudentAnswerDocument,
        prefix: &str,
    ) -> Result<BuiltAnswer, PipelineError> {
        let booklet_index = student.booklet_index as i32;

        if let Some(answer) = AnswerRepo::find_by_booklet(self.pool, upload_id, booklet_index).await? {
            tracing::debug!(
                upload_id,
                booklet_index,
                answer_id = answer.id,
                "Booklet already built, reusing answer",
            );
            return Ok(BuiltAnswer {
                answer,
                reused: true,
            });
        }

        let expected_pages = i64::from(exam.sheet_count) * 2;
        if i64::from(student.page_count) != expected_pages {
            return Err(CoreError::Validation(format!(
                "Booklet {booklet_index} has {} pages, exam {} expects {expected_pages}",
                student.page_count, exam.id
            ))
            .into());
        }

        // Resolve everything that can fail on bad input before touching storage.
        let pages: Vec<NewAnswerPage> = booklet_locators(&self.naming, prefix, student.page_count)
            .into_iter()
            .map(|locators| NewAnswerPage {
                page_number: locators.page_number as i32,
                image_path: locators.image_path,
                large_image_path: locators.large_image_path,
            })
            .collect();

        let parts = question_parts
            .iter()
            .map(|part| {
                Ok(NewQuestionPartAnswer {
                    question_part_id: part.id,
                    pages: physical_page_list(&part.pages)?,
                })
            })
            .collect::<Result<Vec<_>, CoreError>>()?;

        let key = document_key(prefix);
        let bytes = tokio::fs::read(&student.path).await?;
        self.store.put(&key, bytes).await?;

        let new_answer = NewAnswer {
            exam_id: exam.id,
            upload_id,
            booklet_index,
            page_count: student.page_count as i32,
            document_path: key.clone(),
            image_prefix: prefix.to_string(),
        };

        match AnswerRepo::create_with_children(self.pool, &new_answer, &pages, &parts).await {
            Ok(answer) => {
                tracing::debug!(
                    upload_id,
                    booklet_index,
                    answer_id = answer.id,
                    pages = pages.len(),
                    question_parts = parts.len(),
                    "Answer built",
                );
                Ok(BuiltAnswer {
                    answer,
                    reused: false,
                })
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete(&key).await {
                    tracing::error!(
                        upload_id,
                        booklet_index,
                        key = %key,
                        error = %cleanup,
                        "Failed to remove stored document after rollback",
                    );
                }
                Err(e.into())
            }
        }
    }
}
