//! Event type definitions for the event bus.
//!
//! Events are grouped by category. They are cloneable and serializable so
//! they can be logged or replayed.

use serde::{Deserialize, Serialize};

/// Root event enum for all application events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AppEvent {
    /// Project object lifecycle
    Object(ObjectEvent),
    /// Per-object option changes
    Option(OptionEvent),
    /// Background task progress
    Task(TaskEvent),
    /// User-facing status messages
    Message(MessageEvent),
}

impl AppEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            AppEvent::Object(_) => EventCategory::Object,
            AppEvent::Option(_) => EventCategory::Option,
            AppEvent::Task(_) => EventCategory::Task,
            AppEvent::Message(_) => EventCategory::Message,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            AppEvent::Object(e) => e.description(),
            AppEvent::Option(e) => e.description(),
            AppEvent::Task(e) => e.description(),
            AppEvent::Message(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Object lifecycle events.
    Object,
    /// Option change events.
    Option,
    /// Worker task events.
    Task,
    /// Status message events.
    Message,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Object => write!(f, "Object"),
            EventCategory::Option => write!(f, "Option"),
            EventCategory::Task => write!(f, "Task"),
            EventCategory::Message => write!(f, "Message"),
        }
    }
}

/// Object collection events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ObjectEvent {
    /// A name was reserved for an object still being built.
    Promised {
        /// Reserved object name.
        name: String,
    },
    /// An object was added to the project.
    Created {
        /// Object name.
        name: String,
        /// Object kind ("gerber", "excellon", "geometry", "cncjob").
        kind: String,
    },
    /// A promise was withdrawn.
    Retracted {
        /// Object name.
        name: String,
    },
    /// Object initialisation failed.
    Failed {
        /// Object name.
        name: String,
        /// Failure description.
        reason: String,
    },
    /// An object was removed.
    Deleted {
        /// Object name.
        name: String,
    },
}

impl ObjectEvent {
    fn description(&self) -> String {
        match self {
            ObjectEvent::Promised { name } => format!("Object promised: {}", name),
            ObjectEvent::Created { name, kind } => format!("Object created: {} ({})", name, kind),
            ObjectEvent::Retracted { name } => format!("Promise retracted: {}", name),
            ObjectEvent::Failed { name, reason } => {
                format!("Object failed: {}: {}", name, reason)
            }
            ObjectEvent::Deleted { name } => format!("Object deleted: {}", name),
        }
    }
}

/// Option change events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionEvent {
    /// An option of an object was set.
    Changed {
        /// Owning object name.
        object: String,
        /// Option key.
        key: String,
    },
}

impl OptionEvent {
    fn description(&self) -> String {
        match self {
            OptionEvent::Changed { object, key } => format!("Option changed: {}.{}", object, key),
        }
    }
}

/// Worker task events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskEvent {
    /// A task was picked up by a worker.
    Started {
        /// Task name.
        name: String,
        /// Worker index.
        worker: usize,
    },
    /// A task returned successfully.
    Completed {
        /// Task name.
        name: String,
        /// Worker index.
        worker: usize,
    },
    /// A task returned an error or panicked.
    Failed {
        /// Task name.
        name: String,
        /// Worker index.
        worker: usize,
        /// Failure description.
        reason: String,
    },
    /// Advisory progress, 0 to 100.
    Progress {
        /// Task name.
        name: String,
        /// Percent complete.
        percent: u8,
    },
}

impl TaskEvent {
    fn description(&self) -> String {
        match self {
            TaskEvent::Started { name, worker } => {
                format!("Task {} started on worker {}", name, worker)
            }
            TaskEvent::Completed { name, worker } => {
                format!("Task {} completed on worker {}", name, worker)
            }
            TaskEvent::Failed {
                name,
                worker,
                reason,
            } => format!("Task {} failed on worker {}: {}", name, worker, reason),
            TaskEvent::Progress { name, percent } => format!("Task {}: {}%", name, percent),
        }
    }
}

/// Message severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageLevel {
    /// Informational.
    Info,
    /// Something went wrong but work continues.
    Warning,
    /// Operation failed.
    Error,
    /// Operation finished.
    Success,
}

/// Status message events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageEvent {
    /// Message for the status line or log pane.
    Inform {
        /// Severity.
        level: MessageLevel,
        /// Message text.
        text: String,
    },
}

impl MessageEvent {
    fn description(&self) -> String {
        match self {
            MessageEvent::Inform { level, text } => format!("[{:?}] {}", level, text),
        }
    }
}
