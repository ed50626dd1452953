//! 小说阅读客户端的状态层。
//!
//! 代码结构（读代码入口）：
//! - `base_system`：配置与日志
//! - `storage`：宿主键值存储、带 TTL 的读缓存、用户偏好（角色/订阅/书签/进度/历史）
//! - `network`：后端目录接口（小说、章节、译者、标签）
//! - `session`：分页列表、防抖搜索、章节阅读会话

pub mod base_system;
pub mod network;
pub mod session;
pub mod storage;

pub use network::{ApiError, CatalogClient, CatalogSource, PAGE_SIZE};
pub use session::{ListController, ListError, ReadingSessionTracker, Tab};
pub use storage::{KeyValueStore, StorageError, UserPreferencesRepository};
