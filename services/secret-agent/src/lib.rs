//! Secret injection sidecar.
//!
//! Logs in to the credential store with the workload identity, writes the
//! configured secret to a file with an atomic rename and keeps it renewed
//! ahead of lease expiry until told to stop.
//!
//! - [`config`]: layered, validated settings
//! - [`publisher`]: temp-file-plus-rename writes
//! - [`scheduler`]: the renewal state machine
//! - [`controller`]: component wiring, shutdown and teardown

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod handle;
pub mod publisher;
pub mod scheduler;
pub mod shutdown;

pub use clock::{Clock, SystemClock};
pub use crate::config::{AgentConfig, ConfigError};
pub use controller::Controller;
pub use error::{AgentError, PublishError};
pub use handle::CredentialHandle;
pub use publisher::{AtomicPublisher, PublishOutcome, PublishedDocument, read_published};
pub use scheduler::{Finished, Scheduler, SchedulerSettings, SchedulerState};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
