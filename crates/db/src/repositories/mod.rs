//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods
//! that accept `&PgPool` as the first argument.

pub mod answer_repo;
pub mod dispatch_batch_repo;
pub mod exam_repo;
pub mod job_event_repo;
pub mod job_repo;
pub mod upload_repo;

pub use answer_repo::{AnswerPageRepo, AnswerRepo, QuestionPartAnswerRepo};
pub use dispatch_batch_repo::DispatchBatchRepo;
pub use exam_repo::{ExamRepo, QuestionPartRepo};
pub use job_event_repo::JobEventRepo;
pub use job_repo::JobRepo;
pub use upload_repo::UploadRepo;
