//! 現在のレコードと現在時刻から導出する参照系
//!
//! キャッシュは持たず、呼び出しのたびに計算する。
use super::models::{
    CareItem, CareItemId, CareStatus, PetId, PetRecords, Reminder, ReminderId, RepeatType,
};
use chrono::{DateTime, Datelike, Duration, Months, Utc};
use chrono_tz::Tz;
use serde::Serialize;

/// 「間近」とみなす残り日数
pub const URGENT_WINDOW_DAYS: i64 = 3;

/// ケア項目の状態を導出する
///
/// 期限を過ぎていれば `Overdue`、残りが0〜3日なら `Urgent`、それ以外は `Normal`。
pub fn care_status(item: &CareItem, now: DateTime<Utc>) -> CareStatus {
    if item.due_date < now {
        CareStatus::Overdue
    } else if item.due_date - now <= Duration::days(URGENT_WINDOW_DAYS) {
        CareStatus::Urgent
    } else {
        CareStatus::Normal
    }
}

/// リマインダーが「今日」かどうか
///
/// 指定タイムゾーンでの同じ暦日で、かつまだ過ぎていない場合にtrue。
pub fn is_reminder_today(reminder: &Reminder, now: DateTime<Utc>, tz: Tz) -> bool {
    reminder.date_time >= now
        && reminder.date_time.with_timezone(&tz).date_naive() == now.with_timezone(&tz).date_naive()
}

/// リマインダーの次回発生時刻
///
/// 繰り返しなしの場合は設定時刻そのもの。繰り返しありで設定時刻を過ぎている場合は、
/// 現在時刻以降になるまで周期分だけ進める。
pub fn next_occurrence(reminder: &Reminder, now: DateTime<Utc>) -> DateTime<Utc> {
    let start = reminder.date_time;
    if start >= now {
        return start;
    }

    match reminder.repeat_type {
        RepeatType::None => start,
        RepeatType::Daily => roll_forward(start, now, Duration::days(1)),
        RepeatType::Weekly => roll_forward(start, now, Duration::weeks(1)),
        RepeatType::Monthly => {
            let elapsed_months = (now.year() - start.year()) * 12 + now.month() as i32
                - start.month() as i32;
            let mut months = elapsed_months.max(0) as u32;
            loop {
                match start.checked_add_months(Months::new(months)) {
                    Some(candidate) if candidate >= now => return candidate,
                    Some(_) => months += 1,
                    None => return start,
                }
            }
        }
    }
}

fn roll_forward(start: DateTime<Utc>, now: DateTime<Utc>, period: Duration) -> DateTime<Utc> {
    let elapsed = (now - start).num_seconds();
    let period_secs = period.num_seconds();
    let periods = (elapsed + period_secs - 1) / period_secs;
    start + Duration::seconds(periods * period_secs)
}

/// 期限のある項目の参照元
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum DueSource {
    CareItem(CareItemId),
    Reminder(ReminderId),
}

/// 期限のある項目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueItem {
    pub pet_id: PetId,
    pub source: DueSource,
    pub title: String,
    pub due_at: DateTime<Utc>,
}

impl DueItem {
    fn from_care_item(item: &CareItem) -> Self {
        Self {
            pet_id: item.pet_id,
            source: DueSource::CareItem(item.id),
            title: item.title.clone(),
            due_at: item.due_date,
        }
    }

    fn from_reminder(reminder: &Reminder, now: DateTime<Utc>) -> Self {
        Self {
            pet_id: reminder.pet_id,
            source: DueSource::Reminder(reminder.id),
            title: reminder.title.clone(),
            due_at: next_occurrence(reminder, now),
        }
    }
}

/// 今後の予定（ケア項目はすべて、リマインダーは有効かつ次回が未来のもの）
fn pending_items(records: &PetRecords, now: DateTime<Utc>) -> impl Iterator<Item = DueItem> + '_ {
    let care = records.care_items.iter().map(DueItem::from_care_item);
    let reminders = records
        .reminders
        .iter()
        .filter(|r| r.is_enabled)
        .map(move |r| DueItem::from_reminder(r, now))
        .filter(move |item| item.due_at >= now);
    care.chain(reminders)
}

/// ペットごとの次の予定
///
/// 予定のないペットは結果に含まれない。順序はペットの登録順。
pub fn next_due_per_pet(records: &PetRecords, now: DateTime<Utc>) -> Vec<DueItem> {
    records
        .pets
        .iter()
        .filter_map(|pet| {
            pending_items(records, now)
                .filter(|item| item.pet_id == pet.id)
                .min_by_key(|item| item.due_at)
        })
        .collect()
}

/// 現在からN日以内に期限を迎える項目（期限順）
///
/// Nが負の場合は空。表現できる範囲を超える期間は上限の日時で打ち切る。
pub fn due_within(records: &PetRecords, now: DateTime<Utc>, days: i64) -> Vec<DueItem> {
    if days < 0 {
        return Vec::new();
    }
    let horizon = Duration::try_days(days)
        .and_then(|window| now.checked_add_signed(window))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    let mut items: Vec<DueItem> = pending_items(records, now)
        .filter(|item| item.due_at >= now && item.due_at <= horizon)
        .collect();
    items.sort_by_key(|item| item.due_at);
    items
}

/// 期限切れのケア項目（期限順）
pub fn overdue(records: &PetRecords, now: DateTime<Utc>) -> Vec<&CareItem> {
    let mut items: Vec<&CareItem> = records
        .care_items
        .iter()
        .filter(|item| care_status(item, now) == CareStatus::Overdue)
        .collect();
    items.sort_by_key(|item| item.due_date);
    items
}

/// 今日のリマインダー（有効なもののみ、時刻順）
pub fn reminders_today(records: &PetRecords, now: DateTime<Utc>, tz: Tz) -> Vec<&Reminder> {
    let mut reminders: Vec<&Reminder> = records
        .reminders
        .iter()
        .filter(|r| r.is_enabled && is_reminder_today(r, now, tz))
        .collect();
    reminders.sort_by_key(|r| r.date_time);
    reminders
}
