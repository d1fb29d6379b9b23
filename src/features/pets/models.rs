use crate::features::calendar::models::{CalendarError, CalendarEventId};
use crate::features::premium::quota::ResourceKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// ペット名の最大文字数
pub const MAX_PET_NAME_LENGTH: usize = 30;

/// ケア項目・リマインダーのタイトルの最大文字数
pub const MAX_TITLE_LENGTH: usize = 100;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// 新しいIDを採番する
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

record_id!(
    /// ペットID
    PetId
);
record_id!(
    /// ケア項目ID
    CareItemId
);
record_id!(
    /// リマインダーID
    ReminderId
);

/// 動物の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Dog,
    Cat,
    Other,
}

/// ペット
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub name: String,
    pub species: Species,
    /// 種類が `Other` の場合の自由記述
    pub custom_species: Option<String>,
    pub photo_uri: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl Pet {
    /// 表示用の種類名
    pub fn species_label(&self) -> &str {
        match self.species {
            Species::Dog => "dog",
            Species::Cat => "cat",
            Species::Other => self.custom_species.as_deref().unwrap_or("other"),
        }
    }
}

/// ケア項目の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareType {
    Vaccine,
    Grooming,
    Medication,
    VetVisit,
    Other,
}

/// ケア項目の状態（保存せず、現在時刻から導出する）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareStatus {
    Overdue,
    Urgent,
    Normal,
}

/// ケア項目（ワクチン、トリミング、投薬、通院など）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareItem {
    pub id: CareItemId,
    pub pet_id: PetId,
    pub title: String,
    #[serde(rename = "type")]
    pub care_type: CareType,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    /// 端末カレンダーに反映済みの場合のイベントID
    pub calendar_event_id: Option<CalendarEventId>,
    pub created_at: DateTime<Utc>,
}

/// リマインダーの繰り返し種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatType {
    #[default]
    None,
    Daily,
    Weekly,
    Monthly,
}

/// リマインダー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub pet_id: PetId,
    pub title: String,
    pub date_time: DateTime<Utc>,
    pub repeat_type: RepeatType,
    /// 無効なリマインダーは保持されるが、集計や通知の対象外
    pub is_enabled: bool,
    pub notes: Option<String>,
    pub calendar_event_id: Option<CalendarEventId>,
    pub created_at: DateTime<Utc>,
}

/// 永続化されるレコード一式
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetRecords {
    pub pets: Vec<Pet>,
    pub care_items: Vec<CareItem>,
    pub reminders: Vec<Reminder>,
}

impl PetRecords {
    pub fn pet(&self, id: PetId) -> Option<&Pet> {
        self.pets.iter().find(|p| p.id == id)
    }

    pub fn pet_name(&self, id: PetId) -> Option<String> {
        self.pet(id).map(|p| p.name.clone())
    }

    pub fn care_item_mut(&mut self, id: CareItemId) -> Option<&mut CareItem> {
        self.care_items.iter_mut().find(|c| c.id == id)
    }

    pub fn reminder_mut(&mut self, id: ReminderId) -> Option<&mut Reminder> {
        self.reminders.iter_mut().find(|r| r.id == id)
    }

    /// ペットとその配下のケア項目・リマインダーをまとめて取り除く
    ///
    /// 他のペットのレコードには触れない。
    pub fn remove_pet(&mut self, id: PetId) -> Option<RemovedPet> {
        let index = self.pets.iter().position(|p| p.id == id)?;
        let pet = self.pets.remove(index);

        let (care_items, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.care_items)
            .into_iter()
            .partition(|c| c.pet_id == id);
        self.care_items = kept;

        let (reminders, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.reminders)
            .into_iter()
            .partition(|r| r.pet_id == id);
        self.reminders = kept;

        Some(RemovedPet {
            pet,
            care_items,
            reminders,
        })
    }

    /// 存在しないペットを参照するケア項目・リマインダーを取り除き、除いた件数を返す
    pub fn drop_orphans(&mut self) -> usize {
        let before = self.care_items.len() + self.reminders.len();
        let pet_ids: Vec<PetId> = self.pets.iter().map(|p| p.id).collect();
        self.care_items.retain(|c| pet_ids.contains(&c.pet_id));
        self.reminders.retain(|r| pet_ids.contains(&r.pet_id));
        before - (self.care_items.len() + self.reminders.len())
    }
}

/// `PetRecords::remove_pet` で取り除かれたレコード
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedPet {
    pub pet: Pet,
    pub care_items: Vec<CareItem>,
    pub reminders: Vec<Reminder>,
}

impl RemovedPet {
    /// 配下のレコードに紐づいていたカレンダーイベントID
    pub fn linked_event_ids(&self) -> Vec<CalendarEventId> {
        self.care_items
            .iter()
            .filter_map(|c| c.calendar_event_id.clone())
            .chain(
                self.reminders
                    .iter()
                    .filter_map(|r| r.calendar_event_id.clone()),
            )
            .collect()
    }
}

/// ペット作成用DTO
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatePetDto {
    pub name: String,
    pub species: Species,
    pub custom_species: Option<String>,
    pub photo_uri: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

/// ペット更新用DTO
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdatePetDto {
    pub name: Option<String>,
    pub species: Option<Species>,
    pub custom_species: Option<String>,
    pub photo_uri: Option<String>,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

/// ケア項目作成用DTO
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateCareItemDto {
    pub pet_id: PetId,
    pub title: String,
    pub care_type: CareType,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
}

/// ケア項目更新用DTO
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateCareItemDto {
    pub title: Option<String>,
    pub care_type: Option<CareType>,
    pub due_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

/// リマインダー作成用DTO
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateReminderDto {
    pub pet_id: PetId,
    pub title: String,
    pub date_time: DateTime<Utc>,
    pub repeat_type: RepeatType,
    pub notes: Option<String>,
}

/// リマインダー更新用DTO
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateReminderDto {
    pub title: Option<String>,
    pub date_time: Option<DateTime<Utc>>,
    pub repeat_type: Option<RepeatType>,
    pub notes: Option<String>,
}

/// ペット削除の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletedPet {
    pub pet_id: PetId,
    pub care_items_removed: usize,
    pub reminders_removed: usize,
}

/// レコードストアのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// 無料プランの上限に達した（アップセル表示の合図）
    #[error("無料プランの上限に達しました: {0:?}")]
    QuotaExceeded(ResourceKind),

    #[error("ID {0} のペットが見つかりません")]
    PetNotFound(PetId),

    #[error("ID {0} のケア項目が見つかりません")]
    CareItemNotFound(CareItemId),

    #[error("ID {0} のリマインダーが見つかりません")]
    ReminderNotFound(ReminderId),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Calendar(#[from] CalendarError),
}

impl StoreError {
    /// プレミアムへの誘導が必要かどうか
    pub fn requires_premium(&self) -> bool {
        matches!(self, StoreError::QuotaExceeded(_))
    }
}

/// ペットの基本情報のバリデーション
///
/// # 引数
/// * `name` - ペット名
/// * `species` - 種類（未選択の場合はNone）
/// * `custom_species` - 種類が `Other` の場合の自由記述
///
/// # 戻り値
/// バリデーション成功時はOk(())、失敗時はエラーメッセージ
pub fn validate_pet_basics(
    name: &str,
    species: Option<Species>,
    custom_species: Option<&str>,
) -> Result<(), String> {
    let name = name.trim();
    if name.is_empty() {
        return Err("ペットの名前を入力してください".to_string());
    }

    if name.chars().count() > MAX_PET_NAME_LENGTH {
        return Err(format!(
            "ペットの名前は{MAX_PET_NAME_LENGTH}文字以内で入力してください"
        ));
    }

    match species {
        None => Err("動物の種類を選択してください".to_string()),
        Some(Species::Other) if custom_species.map_or(true, |s| s.trim().is_empty()) => {
            Err("動物の種類を入力してください".to_string())
        }
        Some(_) => Ok(()),
    }
}

/// 体重のバリデーション
pub fn validate_weight(weight_kg: Option<f64>) -> Result<(), String> {
    match weight_kg {
        Some(weight) if !(weight.is_finite() && weight > 0.0) => {
            Err("体重は正の数値である必要があります".to_string())
        }
        _ => Ok(()),
    }
}

/// ケア項目・リマインダーのタイトルのバリデーション
pub fn validate_title(title: &str) -> Result<(), String> {
    let title = title.trim();
    if title.is_empty() {
        return Err("タイトルを入力してください".to_string());
    }
    if title.chars().count() > MAX_TITLE_LENGTH {
        return Err(format!(
            "タイトルは{MAX_TITLE_LENGTH}文字以内で入力してください"
        ));
    }
    Ok(())
}
