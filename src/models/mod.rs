pub mod settings;
pub mod target;
pub mod visit;

pub use settings::{GraceContext, Settings};
pub use target::{
    BulkAction, Frequency, LoggedInOverride, Schedule, TargetConfig, TargetId, TargetKind,
};
pub use visit::{PageKind, VisitContext, VisitRecord};
