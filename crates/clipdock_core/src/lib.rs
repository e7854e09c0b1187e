//! Clipdock core: pure state machine for download jobs, tool updates and
//! notifications. All IO lives in `clipdock_engine`; this crate only turns
//! messages into state changes and effects.
mod decision;
mod effect;
mod jobs;
mod msg;
mod notifications;
mod state;
mod update;
mod update_state;
mod version;
mod view_model;

pub use decision::{decide, UpdateDecision};
pub use effect::{Effect, JobRequest, SupervisorOp};
pub use jobs::{JobEvent, JobId, JobPatch, JobRegistry, JobSnapshot, JobStatus, HISTORY_LIMIT};
pub use msg::Msg;
pub use notifications::{
    merge as merge_notifications, DisplayType, Notification, NotificationAction,
    NotificationCenter, NotificationKind, LOCAL_PREFIX,
};
pub use state::AppState;
pub use update::{update, RETRY_CHECK_ACTION, RETRY_UPDATE_ACTION, UPDATE_ACTION_PREFIX};
pub use update_state::{
    CheckFrequency, FeedSnapshot, LatestVersions, UpdateFailure, UpdateSettings, UpdateState,
    VersionInfo,
};
pub use version::{classify, compare_versions, is_newer, Channel};
pub use view_model::{AppViewModel, JobRowView};
