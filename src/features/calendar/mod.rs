/// カレンダー連携機能モジュール
///
/// ケア項目やリマインダーを端末カレンダーへ片方向に反映する。
pub mod mirror;
pub mod models;
pub mod provider;

pub use mirror::CalendarMirror;
pub use models::{CalendarError, CalendarEvent, CalendarEventId, DeviceCalendar, PermissionStatus};
pub use provider::CalendarProvider;
