//! Vaccination bucket rebuild engine.
//!
//! For every child the engine derives which vaccine doses are currently due or
//! late from the child's age, the configured vaccination calendar and the rows
//! external flows already recorded (completed, scheduled, overdue), then
//! stores them together with the child's compliance status.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use vaccination_engine::{InMemoryStore, RebuildEngine};
//! # async fn run(child_id: uuid::Uuid) -> vaccination_engine::Result<()> {
//! let engine = RebuildEngine::new(Arc::new(InMemoryStore::new()));
//! engine.rebuild_one(child_id).await?;
//! let report = engine.rebuild_all().await?;
//! # let _ = report;
//! # Ok(())
//! # }
//! ```

pub mod age;
pub mod batch;
pub mod calendar;
pub mod eligibility;
pub mod error;
pub mod memory;
pub mod models;
pub mod rebuild;
pub mod status;
pub mod store;

pub use age::Age;
pub use batch::{BatchReport, RebuildOptions};
pub use calendar::{
    build_dose_map, CalendarSnapshot, DoseCollision, DoseDescriptor, DoseMap, DoseMapBuilder,
};
pub use eligibility::is_eligible;
pub use error::{RebuildError, Result, StoreError};
pub use memory::InMemoryStore;
pub use models::*;
pub use rebuild::{compute, Rebuild, RebuildEngine};
pub use status::{aggregate, status_of};
pub use store::{BucketStore, CalendarRepository, ChildRepository, VaccinationStore};
