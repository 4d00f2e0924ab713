//! Schema-less model layer for the runbook action engine.
//!
//! Provides the JSON-backed model manipulator, the selector-path dialect,
//! declarative merge transforms, and the parse/execute contexts threaded
//! through every action invocation.

pub mod clock;
pub mod context;
pub mod error;
pub mod manipulator;
pub mod path;
pub mod telemetry;
pub mod value;

pub use clock::{Clock, FixedClock, SystemClock};
pub use context::{Context, ContextActivity, EntryKind, ExecuteContext, LogEntry, ParseContext};
pub use error::ModelError;
pub use manipulator::ModelManipulator;
pub use telemetry::{ActionEvent, InMemoryTelemetry, NullTelemetry, TelemetrySink};
pub use value::{validate_transform_map, MergeMode, ModelValue, TransformMap};
