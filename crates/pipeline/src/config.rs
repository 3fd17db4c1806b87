use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use examsplit_core::env::{self, EnvLookup};
use examsplit_core::error::CoreError;
use examsplit_core::naming::{self, NamingLaw, DEFAULT_PREFIX_LENGTH};
use examsplit_core::pages::TruncationPolicy;
use examsplit_core::partition::{validate_batch_size, DEFAULT_BATCH_SIZE};

use crate::backoff::BackoffConfig;

/// Where persisted booklet documents go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    /// Files under a local root directory.
    Local { root: PathBuf },
    /// Objects in an S3 bucket. Region and endpoint come from the standard
    /// AWS environment; without explicit credentials the default provider
    /// chain is used.
    S3 {
        bucket: String,
        credentials: Option<S3Credentials>,
    },
}

/// Static keys the S3 store writes with.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root under which each upload gets its own scratch directory.
    pub scratch_root: PathBuf,
    pub store: StoreConfig,
    /// Students per dispatch batch.
    pub batch_size: usize,
    /// Random characters in each naming prefix.
    pub prefix_length: usize,
    pub truncation_policy: TruncationPolicy,
    /// Submission attempts per dispatch batch before it is marked failed.
    pub max_dispatch_attempts: u32,
    /// Jobs executing at once in one runner.
    pub max_concurrent_jobs: usize,
    pub poll_interval: Duration,
    /// Running jobs claimed longer ago than this are considered abandoned.
    pub stale_job_timeout: Duration,
    pub naming_law: NamingLaw,
    pub backoff: BackoffConfig,
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default           |
    /// |--------------------------|-------------------|
    /// | `SCRATCH_DIR`            | system temp dir   |
    /// | `DOCUMENT_STORE`         | `local`           |
    /// | `DOCUMENT_ROOT`          | `./storage`       |
    /// | `S3_BUCKET`              | required for `s3` |
    /// | `S3_ACCESS_KEY_ID`       | provider chain    |
    /// | `S3_SECRET_ACCESS_KEY`   | provider chain    |
    /// | `BATCH_SIZE`             | `10`              |
    /// | `PREFIX_LENGTH`          | `40`              |
    /// | `TRUNCATION_POLICY`      | `warn`            |
    /// | `MAX_DISPATCH_ATTEMPTS`  | `3`               |
    /// | `MAX_CONCURRENT_JOBS`    | `4`               |
    /// | `JOB_POLL_INTERVAL_MS`   | `1000`            |
    /// | `STALE_JOB_TIMEOUT_SECS` | `900`             |
    /// | `NAMING_VERSION`         | `1`               |
    pub fn from_env(env: &impl EnvLookup) -> Result<Self, CoreError> {
        let scratch_root = env::optional(env, "SCRATCH_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::temp_dir().join("examsplit"));

        let store = match env::optional(env, "DOCUMENT_STORE")
            .unwrap_or_else(|| "local".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => StoreConfig::Local {
                root: PathBuf::from(
                    env::optional(env, "DOCUMENT_ROOT").unwrap_or_else(|| "./storage".into()),
                ),
            },
            "s3" => StoreConfig::S3 {
                bucket: env::required(env, "S3_BUCKET")?,
                credentials: s3_credentials(env)?,
            },
            other => {
                return Err(CoreError::Validation(format!(
                    "Unknown DOCUMENT_STORE '{other}'. Must be one of: local, s3"
                )))
            }
        };

        let batch_size: usize = env::parse_or(env, "BATCH_SIZE", DEFAULT_BATCH_SIZE)?;
        validate_batch_size(batch_size)?;

        let prefix_length: usize = env::parse_or(env, "PREFIX_LENGTH", DEFAULT_PREFIX_LENGTH)?;
        naming::validate_prefix_length(prefix_length)?;

        let truncation_policy: TruncationPolicy =
            env::parse_or(env, "TRUNCATION_POLICY", TruncationPolicy::default())?;

        let max_dispatch_attempts: u32 = env::parse_or(env, "MAX_DISPATCH_ATTEMPTS", 3)?;
        if max_dispatch_attempts == 0 {
            return Err(CoreError::Validation(
                "MAX_DISPATCH_ATTEMPTS must be at least 1".into(),
            ));
        }

        let max_concurrent_jobs: usize = env::parse_or(env, "MAX_CONCURRENT_JOBS", 4)?;
        if max_concurrent_jobs == 0 {
            return Err(CoreError::Validation(
                "MAX_CONCURRENT_JOBS must be at least 1".into(),
            ));
        }

        let poll_ms: u64 = env::parse_or(env, "JOB_POLL_INTERVAL_MS", 1000)?;
        if poll_ms == 0 {
            return Err(CoreError::Validation(
                "JOB_POLL_INTERVAL_MS must be at least 1".into(),
            ));
        }

        let stale_secs: u64 = env::parse_or(env, "STALE_JOB_TIMEOUT_SECS", 900)?;

        let naming_version: u32 =
            env::parse_or(env, "NAMING_VERSION", NamingLaw::CURRENT.version)?;
        let naming_law = NamingLaw::by_version(naming_version).ok_or_else(|| {
            CoreError::Validation(format!("NAMING_VERSION {naming_version} is not a known naming law"))
        })?;

        Ok(Self {
            scratch_root,
            store,
            batch_size,
            prefix_length,
            truncation_policy,
            max_dispatch_attempts,
            max_concurrent_jobs,
            poll_interval: Duration::from_millis(poll_ms),
            stale_job_timeout: Duration::from_secs(stale_secs),
            naming_law,
            backoff: BackoffConfig::default(),
        })
    }
}

/// Both keys or neither: half a key pair is a configuration mistake.
fn s3_credentials(env: &impl EnvLookup) -> Result<Option<S3Credentials>, CoreError> {
    match (
        env::optional(env, "S3_ACCESS_KEY_ID"),
        env::optional(env, "S3_SECRET_ACCESS_KEY"),
    ) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(Some(S3Credentials {
            access_key_id,
            secret_access_key,
        })),
        (None, None) => Ok(None),
        _ => Err(CoreError::Validation(
            "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together".into(),
        )),
    }
}
