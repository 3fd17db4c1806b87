//! Stage 1: turn one uploaded exam into answers and dispatch jobs.
//!
//! Lifecycle on the upload row:
//! `pending → splitting → building → partitioned_and_dispatching → done`,
//! or `failed` from any step. Document-level problems fail the upload;
//! a booklet that cannot be persisted is logged and left out of its batch
//! while the others carry on.

use examsplit_core::error::CoreError;
use examsplit_core::pages::{pages_per_student, TruncationPolicy};
use examsplit_core::partition::partition;
use examsplit_core::types::DbId;
use examsplit_db::models::status::UploadStatus;
use examsplit_db::models::upload::UploadLayout;
use examsplit_db::repositories::{DispatchBatchRepo, ExamRepo, QuestionPartRepo, UploadRepo};
use examsplit_events::{event_types, PipelineEvent};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::builder::AnswerBuilder;
use crate::context::PipelineContext;
use crate::error::PipelineError;
use crate::jobs::{enqueue_dispatch, DispatchPayload, IngestPayload};
use crate::scratch::ScratchDir;
use crate::splitter::split_to_scratch;

/// Booklets persisted concurrently within one batch.
const BUILD_CONCURRENCY: usize = 4;

/// What one ingest run did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub upload_id: DbId,
    pub student_count: u32,
    pub dropped_pages: u32,
    pub answers_built: usize,
    pub answers_reused: usize,
    pub build_failures: usize,
    pub batches_enqueued: usize,
    /// The upload was already settled; nothing was done.
    pub skipped: bool,
}

/// Run Stage 1 for one upload.
///
/// The upload's scratch directory is released whatever the outcome, and
/// any error marks the upload failed. The source PDF stays in scratch
/// until then, so a run killed part-way can be claimed again and resumes:
/// booklets already persisted are reused, the rest are built.
pub async fn run_ingest(
    ctx: &PipelineContext,
    job_id: DbId,
    payload: &IngestPayload,
) -> Result<IngestSummary, PipelineError> {
    let scratch = ScratchDir::adopt(payload.scratch_dir.clone());
    let result = ingest_upload(ctx, job_id, payload, &scratch).await;

    if let Err(e) = &result {
        tracing::error!(
            job_id,
            upload_id = payload.upload_id,
            document_error = e.is_document_error(),
            error = %e,
            "Ingest failed",
        );
        if let Err(db) = UploadRepo::fail(&ctx.pool, payload.upload_id, &e.to_string()).await {
            tracing::error!(upload_id = payload.upload_id, error = %db, "Failed to mark upload failed");
        }
    }

    if let Err(e) = scratch.release().await {
        tracing::warn!(
            upload_id = payload.upload_id,
            path = %payload.scratch_dir.display(),
            error = %e,
            "Failed to release scratch directory",
        );
    }

    result
}

async fn ingest_upload(
    ctx: &PipelineContext,
    job_id: DbId,
    payload: &IngestPayload,
    scratch: &ScratchDir,
) -> Result<IngestSummary, PipelineError> {
    let pool = &ctx.pool;
    let config = &ctx.config;

    let upload = UploadRepo::find_by_id(pool, payload.upload_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "upload",
            id: payload.upload_id,
        })?;

    if UploadStatus::from_id(upload.status_id).is_some_and(UploadStatus::is_terminal) {
        tracing::info!(job_id, upload_id = upload.id, "Upload already settled, skipping");
        return Ok(IngestSummary {
            upload_id: upload.id,
            skipped: true,
            ..Default::default()
        });
    }

    let exam = ExamRepo::find_by_id(pool, upload.exam_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "exam",
            id: upload.exam_id,
        })?;
    let question_parts = QuestionPartRepo::list_by_exam(pool, exam.id).await?;

    // -- split --

    UploadRepo::set_status(pool, upload.id, UploadStatus::Splitting).await?;
    let sheet_count = u32::try_from(exam.sheet_count).map_err(|_| {
        CoreError::Validation(format!("Exam {} has a negative sheet count", exam.id))
    })?;
    let k = pages_per_student(sheet_count)?;

    let outcome = split_to_scratch(
        &scratch.source_path(),
        scratch,
        exam.id,
        k,
        config.truncation_policy,
    )
    .await?;
    let layout = outcome.layout;

    UploadRepo::record_layout(
        pool,
        upload.id,
        &UploadLayout {
            source_page_count: layout.total_pages as i32,
            student_count: layout.student_count as i32,
            dropped_pages: layout.dropped_pages as i32,
        },
    )
    .await?;

    if layout.is_truncated() {
        match config.truncation_policy {
            TruncationPolicy::Warn => {
                tracing::warn!(
                    job_id,
                    upload_id = upload.id,
                    total_pages = layout.total_pages,
                    pages_per_student = layout.pages_per_student,
                    dropped_pages = layout.dropped_pages,
                    "Trailing pages do not form a complete booklet and were dropped",
                );
                ctx.publish(
                    PipelineEvent::new(event_types::UPLOAD_TRUNCATED)
                        .for_job(job_id)
                        .for_upload(upload.id)
                        .with_payload(serde_json::json!({
                            "total_pages": layout.total_pages,
                            "pages_per_student": layout.pages_per_student,
                            "dropped_pages": layout.dropped_pages,
                        })),
                );
            }
            TruncationPolicy::Drop | TruncationPolicy::Reject => {
                tracing::debug!(upload_id = upload.id, dropped_pages = layout.dropped_pages, "Trailing pages dropped");
            }
        }
    }

    // -- partition and build --

    let batches = partition(outcome.students, config.batch_size, config.prefix_length)?;
    UploadRepo::set_status(pool, upload.id, UploadStatus::Building).await?;

    let builder = AnswerBuilder::new(pool, ctx.store.as_ref(), config.naming_law);
    let mut summary = IngestSummary {
        upload_id: upload.id,
        student_count: layout.student_count,
        dropped_pages: layout.dropped_pages,
        ..Default::default()
    };
    let mut built_batches: Vec<(u32, Vec<DbId>)> = Vec::with_capacity(batches.len());

    for batch in &batches {
        let builds: Vec<_> = batch
            .entries
            .iter()
            .map(|entry| {
                let booklet_index = entry.student.booklet_index;
                let build =
                    builder.build(&exam, &question_parts, upload.id, &entry.student, &entry.prefix);
                async move { (booklet_index, build.await) }
            })
            .collect();
        let results: Vec<_> = stream::iter(builds)
            .buffered(BUILD_CONCURRENCY)
            .collect()
            .await;

        let mut answer_ids = Vec::with_capacity(results.len());
        for (booklet_index, result) in results {
            match result {
                Ok(built) => {
                    if built.reused {
                        summary.answers_reused += 1;
                    } else {
                        summary.answers_built += 1;
                    }
                    answer_ids.push(built.answer.id);
                }
                Err(e) => {
                    summary.build_failures += 1;
                    tracing::error!(
                        job_id,
                        upload_id = upload.id,
                        batch_index = batch.index,
                        booklet_index,
                        error = %e,
                        "Failed to build answer, booklet excluded from dispatch",
                    );
                    ctx.publish(
                        PipelineEvent::new(event_types::ANSWER_BUILD_FAILED)
                            .for_job(job_id)
                            .for_upload(upload.id)
                            .with_payload(serde_json::json!({
                                "booklet_index": booklet_index,
                                "batch_index": batch.index,
                                "error": e.to_string(),
                            })),
                    );
                }
            }
        }
        built_batches.push((batch.index, answer_ids));
    }

    if summary.answers_built + summary.answers_reused == 0 {
        return Err(CoreError::Internal(format!(
            "none of the {} booklet(s) could be persisted",
            layout.student_count
        ))
        .into());
    }

    // -- dispatch --

    UploadRepo::set_status(pool, upload.id, UploadStatus::PartitionedAndDispatching).await?;

    for (batch_index, answer_ids) in built_batches {
        if answer_ids.is_empty() {
            tracing::warn!(upload_id = upload.id, batch_index, "Batch has no built answers, not dispatched");
            continue;
        }

        let members = answer_ids.len() as i32;
        let record =
            DispatchBatchRepo::create_or_get(pool, upload.id, batch_index as i32, members).await?;

        // A booklet that failed in an interrupted run and built now joins
        // its batch, which has to go out again.
        if record.student_count < members
            && DispatchBatchRepo::grow(pool, record.id, members).await?
        {
            tracing::info!(
                upload_id = upload.id,
                batch_id = record.id,
                batch_index,
                previous = record.student_count,
                members,
                "Batch gained members, reopened for dispatch",
            );
        }

        let enqueued = enqueue_dispatch(
            pool,
            &DispatchPayload {
                upload_id: upload.id,
                batch_id: record.id,
                batch_index,
                answer_ids,
            },
            config.max_dispatch_attempts,
        )
        .await?;

        if enqueued.is_some() {
            summary.batches_enqueued += 1;
        }
    }

    UploadRepo::complete(pool, upload.id).await?;

    tracing::info!(
        job_id,
        upload_id = upload.id,
        students = summary.student_count,
        built = summary.answers_built,
        reused = summary.answers_reused,
        failed = summary.build_failures,
        batches = summary.batches_enqueued,
        "Upload ingested",
    );

    Ok(summary)
}
