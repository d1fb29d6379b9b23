//! 端末カレンダーのインターフェース
use super::models::{CalendarError, CalendarEvent, CalendarEventId, DeviceCalendar, PermissionStatus};
use std::future::Future;

/// 端末カレンダーAPI
///
/// 権限ダイアログやOSのカレンダーストアはモバイルシェル側が実装する。
pub trait CalendarProvider: Send + Sync {
    /// 現在の権限状態を取得する
    fn permission_status(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, CalendarError>> + Send;

    /// 権限を要求する
    fn request_permission(
        &self,
    ) -> impl Future<Output = Result<PermissionStatus, CalendarError>> + Send;

    /// カレンダー一覧を取得する
    fn list_calendars(
        &self,
    ) -> impl Future<Output = Result<Vec<DeviceCalendar>, CalendarError>> + Send;

    /// イベントを作成する
    fn create_event(
        &self,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> impl Future<Output = Result<CalendarEventId, CalendarError>> + Send;

    /// イベントを削除する
    ///
    /// `future_instances_only` がtrueの場合、繰り返しイベントは今後の回のみ削除される。
    fn delete_event(
        &self,
        event_id: &CalendarEventId,
        future_instances_only: bool,
    ) -> impl Future<Output = Result<(), CalendarError>> + Send;
}
