//! Integration tests for uploads, answers and dispatch batches.
//!
//! Covers:
//! - Upload create-or-get idempotency and terminal status guard
//! - Atomic answer creation with pages and question-part answers
//! - Rollback when any child row fails
//! - Unassigned first-page listing
//! - Dispatch batch lifecycle

use sqlx::PgPool;
use examsplit_db::models::answer::{NewAnswer, NewAnswerPage, NewQuestionPartAnswer};
use examsplit_db::models::exam::{CreateExam, CreateQuestionPart};
use examsplit_db::models::status::{DispatchStatus, UploadStatus};
use examsplit_db::models::upload::UploadLayout;
use examsplit_db::repositories::{
    AnswerPageRepo, AnswerRepo, DispatchBatchRepo, ExamRepo, QuestionPartAnswerRepo,
    QuestionPartRepo, UploadRepo,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn seed_exam(pool: &PgPool) -> i64 {
    ExamRepo::create(
        pool,
        &CreateExam {
            name: "Midterm".to_string(),
            sheet_count: 2,
        },
    )
    .await
    .unwrap()
    .id
}

fn new_answer(exam_id: i64, upload_id: i64, booklet_index: i32, prefix: &str) -> NewAnswer {
    NewAnswer {
        exam_id,
        upload_id,
        booklet_index,
        page_count: 4,
        document_path: format!("exam-pdf/{prefix}.pdf"),
        image_prefix: prefix.to_string(),
    }
}

fn pages_for(prefix: &str, count: i32) -> Vec<NewAnswerPage> {
    (1..=count)
        .map(|n| NewAnswerPage {
            page_number: n,
            image_path: format!("{prefix}{n}.jpeg"),
            large_image_path: format!("{prefix}{n}-large.jpeg"),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn upload_create_or_get_is_idempotent(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;

    let (first, inserted) = UploadRepo::create_or_get(&pool, exam_id, "scan-001").await.unwrap();
    assert!(inserted);
    assert_eq!(first.status_id, UploadStatus::Pending.id());

    let (second, inserted) = UploadRepo::create_or_get(&pool, exam_id, "scan-001").await.unwrap();
    assert!(!inserted);
    assert_eq!(first.id, second.id);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn terminal_upload_does_not_move(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-002").await.unwrap();

    assert!(UploadRepo::set_status(&pool, upload.id, UploadStatus::Splitting).await.unwrap());
    UploadRepo::record_layout(
        &pool,
        upload.id,
        &UploadLayout {
            source_page_count: 9,
            student_count: 2,
            dropped_pages: 1,
        },
    )
    .await
    .unwrap();
    UploadRepo::complete(&pool, upload.id).await.unwrap();

    assert!(!UploadRepo::set_status(&pool, upload.id, UploadStatus::Building).await.unwrap());

    let stored = UploadRepo::find_by_id(&pool, upload.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, UploadStatus::Done.id());
    assert_eq!(stored.student_count, Some(2));
    assert_eq!(stored.dropped_pages, Some(1));
    assert!(stored.completed_at.is_some());
}

// ---------------------------------------------------------------------------
// Answers
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn answer_is_created_with_all_children(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-003").await.unwrap();
    let part = QuestionPartRepo::create(
        &pool,
        &CreateQuestionPart {
            exam_id,
            question_number: 1,
            part_number: 1,
            pages: "1,2".to_string(),
        },
    )
    .await
    .unwrap();

    let answer = AnswerRepo::create_with_children(
        &pool,
        &new_answer(exam_id, upload.id, 0, "exam-pages/aaaa"),
        &pages_for("exam-pages/aaaa", 4),
        &[NewQuestionPartAnswer {
            question_part_id: part.id,
            pages: "1,3".to_string(),
        }],
    )
    .await
    .unwrap();

    assert!(answer.owner_id.is_none());
    let pages = AnswerPageRepo::list_by_answer(&pool, answer.id).await.unwrap();
    assert_eq!(pages.len(), 4);
    assert_eq!(pages[0].image_path, "exam-pages/aaaa1.jpeg");
    assert_eq!(pages[3].large_image_path, "exam-pages/aaaa4-large.jpeg");

    let parts = QuestionPartAnswerRepo::list_by_answer(&pool, answer.id).await.unwrap();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].pages, "1,3");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn answer_rolls_back_when_a_page_fails(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-004").await.unwrap();

    // Duplicate page number violates UNIQUE(answer_id, page_number).
    let mut pages = pages_for("exam-pages/bbbb", 2);
    pages.push(pages[0].clone());

    let result = AnswerRepo::create_with_children(
        &pool,
        &new_answer(exam_id, upload.id, 0, "exam-pages/bbbb"),
        &pages,
        &[],
    )
    .await;
    assert!(result.is_err());

    assert_eq!(AnswerRepo::count_by_upload(&pool, upload.id).await.unwrap(), 0);
    let orphan_pages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM answer_pages")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orphan_pages, 0);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn duplicate_booklet_is_rejected(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-005").await.unwrap();

    AnswerRepo::create_with_children(
        &pool,
        &new_answer(exam_id, upload.id, 0, "exam-pages/cccc"),
        &pages_for("exam-pages/cccc", 2),
        &[],
    )
    .await
    .unwrap();

    let again = AnswerRepo::create_with_children(
        &pool,
        &new_answer(exam_id, upload.id, 0, "exam-pages/dddd"),
        &pages_for("exam-pages/dddd", 2),
        &[],
    )
    .await;
    assert!(again.is_err());

    let found = AnswerRepo::find_by_booklet(&pool, upload.id, 0).await.unwrap().unwrap();
    assert_eq!(found.image_prefix, "exam-pages/cccc");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unassigned_first_pages_skip_owned_answers(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-006").await.unwrap();

    for (index, prefix) in ["exam-pages/eeee", "exam-pages/ffff"].iter().enumerate() {
        AnswerRepo::create_with_children(
            &pool,
            &new_answer(exam_id, upload.id, index as i32, prefix),
            &pages_for(prefix, 4),
            &[],
        )
        .await
        .unwrap();
    }

    let owned = AnswerRepo::find_by_booklet(&pool, upload.id, 1).await.unwrap().unwrap();
    sqlx::query("UPDATE answers SET owner_id = 77 WHERE id = $1")
        .bind(owned.id)
        .execute(&pool)
        .await
        .unwrap();

    let unassigned = AnswerPageRepo::list_unassigned_first_pages(&pool, exam_id)
        .await
        .unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].booklet_index, 0);
    assert_eq!(unassigned[0].image_path, "exam-pages/eeee1.jpeg");
}

// ---------------------------------------------------------------------------
// Dispatch batches
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn dispatch_batch_lifecycle(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-007").await.unwrap();

    let batch = DispatchBatchRepo::create_or_get(&pool, upload.id, 0, 10).await.unwrap();
    let same = DispatchBatchRepo::create_or_get(&pool, upload.id, 0, 10).await.unwrap();
    assert_eq!(batch.id, same.id);
    assert_eq!(batch.status_id, DispatchStatus::Pending.id());

    assert!(DispatchBatchRepo::mark_dispatched(&pool, batch.id).await.unwrap());
    // A batch stuck in Dispatched may be resubmitted.
    assert!(DispatchBatchRepo::mark_dispatched(&pool, batch.id).await.unwrap());
    DispatchBatchRepo::mark_acknowledged(&pool, batch.id, "handle-1").await.unwrap();
    assert!(!DispatchBatchRepo::mark_dispatched(&pool, batch.id).await.unwrap());

    let stored = DispatchBatchRepo::find_by_id(&pool, batch.id).await.unwrap().unwrap();
    assert_eq!(stored.status_id, DispatchStatus::Acknowledged.id());
    assert_eq!(stored.attempts, 2);
    assert_eq!(stored.remote_handle.as_deref(), Some("handle-1"));
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn growing_a_batch_reopens_it(pool: PgPool) {
    let exam_id = seed_exam(&pool).await;
    let (upload, _) = UploadRepo::create_or_get(&pool, exam_id, "scan-008").await.unwrap();

    let batch = DispatchBatchRepo::create_or_get(&pool, upload.id, 0, 1).await.unwrap();
    assert!(DispatchBatchRepo::mark_dispatched(&pool, batch.id).await.unwrap());
    DispatchBatchRepo::mark_acknowledged(&pool, batch.id, "handle-1").await.unwrap();

    // Never shrinks, and the same size is a no-op.
    assert!(!DispatchBatchRepo::grow(&pool, batch.id, 1).await.unwrap());
    assert!(DispatchBatchRepo::grow(&pool, batch.id, 2).await.unwrap());

    let stored = DispatchBatchRepo::find_by_id(&pool, batch.id).await.unwrap().unwrap();
    assert_eq!(stored.student_count, 2);
    assert_eq!(stored.status_id, DispatchStatus::Pending.id());
    assert!(stored.remote_handle.is_none());
    assert!(DispatchBatchRepo::mark_dispatched(&pool, batch.id).await.unwrap());
}
