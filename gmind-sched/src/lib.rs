//! The `gmind-sched` crate defines the scheduled device-control
//! layer of the greenhouse-minder backend: accepting future device
//! actions (fan/led/pump on or off against a greenhouse field),
//! persisting them, and driving them against the external control
//! service once due.
//!
//! The crate is built around capability seams so the core stays
//! independently testable with fakes:
//!
//! 1. [`ScheduleService`] is the request surface. It validates the
//!    target greenhouse and field through the [`GreenhouseCatalog`]
//!    seam and persists a pending [`ScheduledCommand`] through the
//!    [`CommandStore`] seam
//! 2. [`CommandDispatcher`] is the recurring background task. Each
//!    cycle it reads the due pending commands, abandons the ones
//!    past the staleness threshold, and invokes the [`DeviceClient`]
//!    seam for the rest. Failed calls leave the command pending so
//!    re-polling retries it (at-least-once); successes flip
//!    `executed` with a conditional update
//! 3. [`SqliteCommandStore`] is the default store;
//!    [`MqttDeviceClient`] is the default control client, publishing
//!    the 1/0 control topics the device service consumes

mod catalog;
mod control;
mod dispatcher;
mod models;
mod scheduler;
mod schema;
mod store;

pub use catalog::{CatalogError, GreenhouseCatalog, StaticCatalog};
pub use control::{DeviceClient, DeviceControlError, MqttDeviceClient};
pub use dispatcher::{CommandDispatcher, CycleReport, DispatcherConfig};
pub use models::{NewScheduledCommand, ScheduledCommand};
pub use scheduler::{ScheduleError, ScheduleService};
pub use store::{CommandStore, CommandStoreError, InMemoryCommandStore, SqliteCommandStore};

pub use gmind_model::{Device, DeviceAction, FieldId, GreenhouseId};
