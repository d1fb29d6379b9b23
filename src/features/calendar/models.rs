use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 端末カレンダー上のイベントID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarEventId(pub String);

impl CalendarEventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CalendarEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// カレンダー権限の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Undetermined,
}

/// 端末のカレンダー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCalendar {
    pub id: String,
    pub title: String,
    /// 端末の既定（プライマリ）カレンダーか
    pub is_primary: bool,
    /// イベントを書き込めるか
    pub allows_modifications: bool,
}

/// 繰り返しの頻度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// 繰り返しルール
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: RecurrenceFrequency,
    pub interval: u32,
}

/// アラーム（開始時刻からの相対分数、負の値は開始前）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub relative_offset_minutes: i64,
}

/// 端末カレンダーに作成するイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub notes: String,
    pub location: Option<String>,
    pub alarms: Vec<Alarm>,
    pub recurrence: Option<RecurrenceRule>,
}

/// カレンダー連携のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalendarError {
    /// ユーザーが権限を拒否した
    #[error("カレンダーへのアクセスが許可されていません")]
    PermissionDenied,

    /// 書き込み可能なカレンダーが無い
    #[error("書き込み可能なカレンダーが見つかりません")]
    NoWritableCalendar,

    /// 端末カレンダーAPIの失敗
    #[error("カレンダーエラー: {0}")]
    Provider(String),
}
