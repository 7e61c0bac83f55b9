//! # Event Bus
//!
//! Decoupled notification between documents, the project collection and
//! background workers.
//!
//! ```rust,ignore
//! use pcbcam_core::event_bus::{event_bus, AppEvent, EventCategory, EventFilter};
//!
//! let id = event_bus().subscribe(
//!     EventFilter::Categories(vec![EventCategory::Task]),
//!     |event| tracing::info!("{}", event.description()),
//! );
//! event_bus().unsubscribe(id);
//! ```

mod bus;
mod events;

pub use bus::*;
pub use events::*;
