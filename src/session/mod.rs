//! 界面状态层：分页列表、防抖搜索、阅读会话、译者后台。

pub mod account;
pub mod debounce;
pub mod list_controller;
pub mod publishing;
pub mod reading_tracker;

use thiserror::Error;

use crate::network::ApiError;
use crate::storage::StorageError;

pub use account::become_translator;
pub use debounce::{Debouncer, SearchBox};
pub use list_controller::{ListController, ListFilter, ListItem, ListPhase, ListSnapshot, LoadOutcome, Tab};
pub use publishing::{PublishError, Publisher};
pub use reading_tracker::{ChapterNeighbors, ReadingSessionTracker, ScrollMetrics, SessionStart};

#[derive(Debug, Error)]
pub enum ListError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
