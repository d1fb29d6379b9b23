/// 共有エラー型とエラーハンドリング
pub mod errors;

/// 共有設定管理
pub mod config;

/// ローカルキー・バリューストア
pub mod storage;

/// 時刻の供給元
pub mod clock;

// 便利な再エクスポート
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{get_environment, load_environment_variables, AppConfig, Environment};
pub use errors::{AppError, AppResult};
pub use storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore};
