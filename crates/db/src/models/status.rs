//! Status helper enums mapping to SMALLSERIAL lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Seed-data name of the status.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label ),+
                }
            }

            /// Resolve a database status ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Stage-1 (ingest) lifecycle of an upload.
    UploadStatus {
        Pending = 1 => "pending",
        Splitting = 2 => "splitting",
        Building = 3 => "building",
        PartitionedAndDispatching = 4 => "partitioned_and_dispatching",
        Done = 5 => "done",
        Failed = 6 => "failed",
    }
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

define_status_enum! {
    /// Stage-2 lifecycle of one dispatch batch.
    DispatchStatus {
        Pending = 1 => "pending",
        Dispatched = 2 => "dispatched",
        Acknowledged = 3 => "acknowledged",
        DispatchFailed = 4 => "dispatch_failed",
    }
}

define_status_enum! {
    /// Durable job queue status.
    JobStatus {
        Pending = 1 => "pending",
        Running = 2 => "running",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        Retrying = 5 => "retrying",
    }
}
