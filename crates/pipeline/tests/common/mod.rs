//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use examsplit_converter::{ConverterApiError, CredentialBundle, DispatchRequest, WorkerFleet};
use examsplit_db::models::exam::{CreateExam, CreateQuestionPart};
use examsplit_db::models::job::Job;
use examsplit_db::repositories::{ExamRepo, JobRepo, QuestionPartRepo};
use examsplit_events::EventBus;
use examsplit_pipeline::runner;
use examsplit_pipeline::store::{DocumentStore, LocalDocumentStore, StoreError};
use examsplit_pipeline::{PipelineConfig, PipelineContext};
use lopdf::{dictionary, Document, Object};
use sqlx::PgPool;
use tempfile::TempDir;
use tokio::sync::{Barrier, Semaphore};

// ---------------------------------------------------------------------------
// PDFs
// ---------------------------------------------------------------------------

/// A PDF of `pages` blank pages, page `i` being `100 + i` points wide.
pub fn sample_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let kids: Vec<Object> = (0..pages)
        .map(|i| {
            Object::Reference(doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(100 + i as i64),
                    Object::Integer(842),
                ],
            }))
        })
        .collect();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

// ---------------------------------------------------------------------------
// Fleet
// ---------------------------------------------------------------------------

/// Records every submission. Calls listed in `failures` (1-based call
/// number → HTTP status) are answered with that error instead.
#[derive(Default)]
pub struct FakeFleet {
    pub requests: Mutex<Vec<DispatchRequest>>,
    pub failures: Mutex<HashMap<usize, u16>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    rendezvous: Mutex<Option<Arc<Barrier>>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl FakeFleet {
    pub fn fail_call(&self, call: usize, status: u16) {
        self.failures.lock().unwrap().insert(call, status);
    }

    pub fn requests(&self) -> Vec<DispatchRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// No submission returns before `parties` of them are in flight.
    pub fn require_concurrency(&self, parties: usize) {
        *self.rendezvous.lock().unwrap() = Some(Arc::new(Barrier::new(parties)));
    }

    /// Hold every submission until a permit is added to the returned gate.
    pub fn hold(&self) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Most submissions ever in flight at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerFleet for FakeFleet {
    async fn submit(&self, request: &DispatchRequest) -> Result<String, ConverterApiError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len()
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let rendezvous = self.rendezvous.lock().unwrap().clone();
        if let Some(barrier) = rendezvous {
            barrier.wait().await;
        }
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(status) = self.failures.lock().unwrap().get(&call) {
            return Err(ConverterApiError::ApiError {
                status: *status,
                body: "simulated".into(),
            });
        }
        Ok(format!("handle-{call}"))
    }
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// A local store whose `put` calls (1-based) can be made to fail or hang.
pub struct ScriptedStore {
    inner: LocalDocumentStore,
    puts: AtomicUsize,
    hang_from: Mutex<Option<usize>>,
    fail_on: Mutex<HashSet<usize>>,
}

impl ScriptedStore {
    pub fn new(inner: LocalDocumentStore) -> Self {
        Self {
            inner,
            puts: AtomicUsize::new(0),
            hang_from: Mutex::new(None),
            fail_on: Mutex::new(HashSet::new()),
        }
    }

    /// Put call `call` and every later one never returns.
    pub fn hang_from(&self, call: usize) {
        *self.hang_from.lock().unwrap() = Some(call);
    }

    pub fn fail_put(&self, call: usize) {
        self.fail_on.lock().unwrap().insert(call);
    }

    /// Let later put calls through again.
    pub fn open(&self) {
        *self.hang_from.lock().unwrap() = None;
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let call = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
        let hangs = self.hang_from.lock().unwrap().is_some_and(|from| call >= from);
        if hangs {
            std::future::pending::<()>().await;
        }
        if self.fail_on.lock().unwrap().contains(&call) {
            return Err(StoreError::Backend("simulated".into()));
        }
        self.inner.put(key, bytes).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub ctx: PipelineContext,
    pub fleet: Arc<FakeFleet>,
    pub store: Arc<ScriptedStore>,
    pub scratch: TempDir,
    pub documents: TempDir,
}

impl Harness {
    pub fn new(pool: PgPool, overrides: &[(&str, &str)]) -> Self {
        let scratch = tempfile::tempdir().unwrap();
        let documents = tempfile::tempdir().unwrap();

        let mut vars: HashMap<String, String> = HashMap::from([
            ("SCRATCH_DIR".to_string(), scratch.path().display().to_string()),
            ("DOCUMENT_ROOT".to_string(), documents.path().display().to_string()),
        ]);
        for (k, v) in overrides {
            vars.insert(k.to_string(), v.to_string());
        }
        let config = PipelineConfig::from_env(&move |name: &str| vars.get(name).cloned()).unwrap();

        let fleet = Arc::new(FakeFleet::default());
        let store = Arc::new(ScriptedStore::new(LocalDocumentStore::new(
            documents.path().to_path_buf(),
        )));
        let ctx = PipelineContext {
            pool,
            store: store.clone(),
            fleet: fleet.clone(),
            events: Arc::new(EventBus::default()),
            credentials: CredentialBundle {
                token: "key".into(),
                secret: "secret".into(),
                bucket: "scans".into(),
            },
            instance_type: "m3.medium".into(),
            config: Arc::new(config),
        };

        Self {
            ctx,
            fleet,
            store,
            scratch,
            documents,
        }
    }

    /// Claim and run the next runnable job. Returns the claimed job.
    pub async fn run_next(&self) -> Option<Job> {
        let job = JobRepo::claim_next(&self.ctx.pool).await.unwrap()?;
        runner::execute(&self.ctx, job.clone()).await;
        Some(job)
    }

    /// Run jobs until the queue has nothing runnable.
    pub async fn drain(&self) -> usize {
        let mut ran = 0;
        while self.run_next().await.is_some() {
            ran += 1;
        }
        ran
    }
}

/// An exam of `sheet_count` sheets with question parts on logical pages
/// `"1,2"` and `"2"`.
pub async fn seed_exam(pool: &PgPool, sheet_count: i32) -> i64 {
    let exam = ExamRepo::create(
        pool,
        &CreateExam {
            name: "Final".into(),
            sheet_count,
        },
    )
    .await
    .unwrap();

    for (part_number, pages) in [(1, "1,2"), (2, "2")] {
        QuestionPartRepo::create(
            pool,
            &CreateQuestionPart {
                exam_id: exam.id,
                question_number: 1,
                part_number,
                pages: pages.into(),
            },
        )
        .await
        .unwrap();
    }
    exam.id
}
