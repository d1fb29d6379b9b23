use super::models::{
    Alarm, CalendarError, CalendarEvent, CalendarEventId, PermissionStatus, RecurrenceFrequency,
    RecurrenceRule,
};
use super::provider::CalendarProvider;
use crate::features::pets::models::{CareItem, Reminder, RepeatType};
use chrono::Duration;
use std::sync::{Arc, Mutex, PoisonError};

/// ケア項目イベントの長さ（分）
pub const CARE_ITEM_EVENT_MINUTES: i64 = 60;

/// リマインダーイベントの長さ（分）
pub const REMINDER_EVENT_MINUTES: i64 = 30;

/// アラームの通知タイミング（開始の何分前か）
pub const ALARM_MINUTES_BEFORE: i64 = 60;

/// 端末カレンダーへの片方向ミラー
///
/// ケア項目やリマインダーを端末の既定カレンダーに反映する。正となるデータではなく、
/// 失敗しても呼び出し元の処理は継続される。自動リトライは行わない。
pub struct CalendarMirror<C> {
    provider: Arc<C>,
    attribution: String,
    default_calendar_id: Mutex<Option<String>>,
}

impl<C: CalendarProvider> CalendarMirror<C> {
    /// 新しいCalendarMirrorを作成する
    ///
    /// # 引数
    /// * `provider` - 端末カレンダーAPI
    /// * `attribution` - イベントのメモ欄に追記する帰属表示
    pub fn new(provider: Arc<C>, attribution: impl Into<String>) -> Self {
        Self {
            provider,
            attribution: attribution.into(),
            default_calendar_id: Mutex::new(None),
        }
    }

    /// 権限を確認し、未許可なら要求する
    pub async fn ensure_permission(&self) -> Result<(), CalendarError> {
        if self.provider.permission_status().await? == PermissionStatus::Granted {
            return Ok(());
        }

        match self.provider.request_permission().await? {
            PermissionStatus::Granted => Ok(()),
            status => {
                log::info!("カレンダー権限が許可されませんでした: {status:?}");
                Err(CalendarError::PermissionDenied)
            }
        }
    }

    /// 既定のカレンダーIDを解決する
    ///
    /// 書き込み可能なプライマリカレンダーを優先し、なければ最初の書き込み可能なカレンダー。
    /// 解決したIDはセッション中キャッシュする。
    pub async fn default_calendar_id(&self) -> Result<String, CalendarError> {
        if let Some(id) = self.cached_calendar_id() {
            return Ok(id);
        }

        let calendars = self.provider.list_calendars().await?;
        let calendar = calendars
            .iter()
            .find(|c| c.is_primary && c.allows_modifications)
            .or_else(|| calendars.iter().find(|c| c.allows_modifications))
            .ok_or(CalendarError::NoWritableCalendar)?;

        log::debug!("既定のカレンダーを解決しました: {}", calendar.title);
        *self
            .default_calendar_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(calendar.id.clone());
        Ok(calendar.id.clone())
    }

    fn cached_calendar_id(&self) -> Option<String> {
        self.default_calendar_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// キャッシュしたカレンダーIDを破棄する
    pub fn reset_session_cache(&self) {
        *self
            .default_calendar_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// イベントを作成する
    pub async fn create_event(
        &self,
        event: &CalendarEvent,
    ) -> Result<CalendarEventId, CalendarError> {
        self.ensure_permission().await?;
        let calendar_id = self.default_calendar_id().await?;

        let event_id = self
            .provider
            .create_event(&calendar_id, event)
            .await
            .inspect_err(|e| log::warn!("カレンダーイベントの作成に失敗しました: {e}"))?;

        log::info!("カレンダーイベントを作成しました: event_id={event_id}");
        Ok(event_id)
    }

    /// ケア項目をカレンダーに反映する
    pub async fn mirror_care_item(
        &self,
        item: &CareItem,
        pet_name: Option<&str>,
    ) -> Result<CalendarEventId, CalendarError> {
        let event = build_care_item_event(item, pet_name, &self.attribution);
        self.create_event(&event).await
    }

    /// リマインダーをカレンダーに反映する
    pub async fn mirror_reminder(
        &self,
        reminder: &Reminder,
        pet_name: Option<&str>,
    ) -> Result<CalendarEventId, CalendarError> {
        let event = build_reminder_event(reminder, pet_name, &self.attribution);
        self.create_event(&event).await
    }

    /// 既存イベントを置き換える
    ///
    /// 古いイベントの削除は失敗しても続行し、新しいイベントを作成する。
    pub async fn update_event(
        &self,
        old_event_id: Option<&CalendarEventId>,
        event: &CalendarEvent,
    ) -> Result<CalendarEventId, CalendarError> {
        if let Some(old_event_id) = old_event_id {
            if let Err(e) = self.delete_event(old_event_id).await {
                log::warn!("古いカレンダーイベントの削除に失敗しました: {old_event_id}: {e}");
            }
        }
        self.create_event(event).await
    }

    /// イベントを削除する
    ///
    /// 繰り返しイベントは今後の回のみ削除し、過去の回は残す。
    pub async fn delete_event(&self, event_id: &CalendarEventId) -> Result<(), CalendarError> {
        self.ensure_permission().await?;
        self.provider.delete_event(event_id, true).await?;
        log::info!("カレンダーイベントを削除しました: event_id={event_id}");
        Ok(())
    }

    /// 帰属表示
    pub fn attribution(&self) -> &str {
        &self.attribution
    }
}

/// イベントタイトル（ペット名がある場合は「タイトル - ペット名」）
pub fn event_title(title: &str, pet_name: Option<&str>) -> String {
    match pet_name.map(str::trim).filter(|name| !name.is_empty()) {
        Some(name) => format!("{title} - {name}"),
        None => title.to_string(),
    }
}

/// イベントのメモ（ユーザーのメモの後に帰属表示を追記）
pub fn event_notes(user_notes: Option<&str>, attribution: &str) -> String {
    match user_notes.map(str::trim).filter(|notes| !notes.is_empty()) {
        Some(notes) => format!("{notes}\n\n{attribution}"),
        None => attribution.to_string(),
    }
}

/// 繰り返し種別をカレンダーの繰り返しルールに変換する
pub fn recurrence_for(repeat_type: RepeatType) -> Option<RecurrenceRule> {
    let frequency = match repeat_type {
        RepeatType::None => return None,
        RepeatType::Daily => RecurrenceFrequency::Daily,
        RepeatType::Weekly => RecurrenceFrequency::Weekly,
        RepeatType::Monthly => RecurrenceFrequency::Monthly,
    };
    Some(RecurrenceRule {
        frequency,
        interval: 1,
    })
}

fn default_alarms() -> Vec<Alarm> {
    vec![Alarm {
        relative_offset_minutes: -ALARM_MINUTES_BEFORE,
    }]
}

/// ケア項目からイベントを組み立てる（期限日時から1時間）
pub fn build_care_item_event(
    item: &CareItem,
    pet_name: Option<&str>,
    attribution: &str,
) -> CalendarEvent {
    CalendarEvent {
        title: event_title(&item.title, pet_name),
        start: item.due_date,
        end: item.due_date + Duration::minutes(CARE_ITEM_EVENT_MINUTES),
        notes: event_notes(item.notes.as_deref(), attribution),
        location: None,
        alarms: default_alarms(),
        recurrence: None,
    }
}

/// リマインダーからイベントを組み立てる（設定日時から30分、繰り返しあり）
pub fn build_reminder_event(
    reminder: &Reminder,
    pet_name: Option<&str>,
    attribution: &str,
) -> CalendarEvent {
    CalendarEvent {
        title: event_title(&reminder.title, pet_name),
        start: reminder.date_time,
        end: reminder.date_time + Duration::minutes(REMINDER_EVENT_MINUTES),
        notes: event_notes(reminder.notes.as_deref(), attribution),
        location: None,
        alarms: default_alarms(),
        recurrence: recurrence_for(reminder.repeat_type),
    }
}
