//! Visit processing: gating, batching and notification dispatch

pub mod anonymize;
pub mod batch;
pub mod dispatcher;
pub mod gate;
pub mod geoip;
pub mod grace;
pub mod record;
pub mod scheduler;

pub use anonymize::{anonymize, anonymize_ip, grace_key};
pub use batch::BatchAccumulator;
pub use dispatcher::{DispatchOutcome, NotificationDispatcher, TickReport};
pub use gate::{Decision, DenyReason, VisitGate};
pub use geoip::GeoIpService;
pub use grace::{GracePeriodTracker, GraceScope};
pub use record::build_record;
pub use scheduler::{Scheduler, SchedulerIntervals, TickFuture};
