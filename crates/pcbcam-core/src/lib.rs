//! # PcbCam Core
//!
//! Shared foundations for the PcbCam workspace: the error taxonomy,
//! document units, the event bus used for observer notification and the
//! background worker stack.

pub mod error;
pub mod event_bus;
pub mod units;
pub mod worker;

pub use error::{Error, GeometryError, ParseError, ProjectError, Result};

pub use event_bus::{
    event_bus, AppEvent, EventBus, EventBusConfig, EventCategory, EventFilter, MessageEvent,
    MessageLevel, ObjectEvent, OptionEvent, SubscriptionId, TaskEvent,
};

pub use units::Units;
pub use worker::{TaskContext, WorkerStack};
