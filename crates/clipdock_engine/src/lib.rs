//! Clipdock engine: release feed, version tool, job supervisor and local
//! state IO, executed on a background runtime.
mod bus;
mod engine;
mod feed;
mod persist;
mod store;
mod supervisor;
mod tool;
mod types;

pub use bus::{EventBus, Subscription};
pub use engine::{EngineCommand, EngineHandle, EngineServices, EngineSettings};
pub use feed::{parse_app_config, FeedError, FeedSettings, ReleaseFeed, ReqwestReleaseFeed};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use store::{
    load_json, save_json, JsonFileStore, KeyValueStore, MemoryStore, StoreError,
    DISMISSED_NOTIFICATIONS_KEY, JOB_HISTORY_KEY, NOTIFICATION_READ_KEY,
};
pub use supervisor::{
    HttpSupervisor, JobEventSink, JobSupervisor, SupervisorError, SupervisorSettings,
};
pub use tool::{
    classify_failure, read_version, remediate, ProcessVersionTool, ToolError, ToolOutput,
    VersionTool,
};
pub use types::{ChannelEventSink, EngineEvent, EngineEventSink, JobList};
