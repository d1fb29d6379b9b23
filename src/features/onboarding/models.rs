use crate::features::pets::models::{
    CareItem, CareType, Pet, Reminder, RepeatType, Species, StoreError,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// オンボーディングの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingFlow {
    /// 初回起動時の完全なオンボーディング（ケアのステップを含む）
    Full,
    /// 2匹目以降のペット追加
    AddPet,
}

/// オンボーディングのステップ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    Basics,
    Photo,
    Info,
    Care,
    Review,
}

impl OnboardingFlow {
    /// このフローで通るステップ（順序どおり）
    pub fn steps(self) -> &'static [OnboardingStep] {
        use OnboardingStep::*;
        match self {
            OnboardingFlow::Full => &[Basics, Photo, Info, Care, Review],
            OnboardingFlow::AddPet => &[Basics, Photo, Info, Review],
        }
    }

    pub fn includes(self, step: OnboardingStep) -> bool {
        self.steps().contains(&step)
    }
}

/// infoステップで入力する任意項目
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PetInfo {
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub weight_kg: Option<f64>,
}

/// careステップで入力するケア項目の元データ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CareSeed {
    pub title: String,
    pub care_type: CareType,
    pub due_date: DateTime<Utc>,
    pub notes: Option<String>,
    /// 作成後にカレンダーへ反映するか
    pub sync_to_calendar: bool,
}

/// careステップで入力するリマインダーの元データ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderSeed {
    pub title: String,
    pub date_time: DateTime<Utc>,
    pub repeat_type: RepeatType,
    pub notes: Option<String>,
    /// 作成後にカレンダーへ反映するか
    pub sync_to_calendar: bool,
}

/// ウィザードで入力中のデータ
///
/// IDを持たず、確定するまでストアには一切書き込まれない。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OnboardingDraft {
    pub name: String,
    pub species: Option<Species>,
    pub custom_species: Option<String>,
    pub photo_uri: Option<String>,
    pub info: PetInfo,
    pub care_seeds: Vec<CareSeed>,
    pub reminder_seeds: Vec<ReminderSeed>,
}

/// 元データ1件ごとの作成結果
#[derive(Debug, Clone, PartialEq)]
pub struct SeedOutcome<T> {
    pub title: String,
    pub result: Result<T, StoreError>,
}

impl<T> SeedOutcome<T> {
    pub fn is_created(&self) -> bool {
        self.result.is_ok()
    }
}

/// 確定処理の結果
///
/// ペットは必ず作成済み。元データの作成に失敗したものは個別に報告される。
#[derive(Debug, Clone, PartialEq)]
pub struct CommitReport {
    pub pet: Pet,
    pub care_items: Vec<SeedOutcome<CareItem>>,
    pub reminders: Vec<SeedOutcome<Reminder>>,
}

impl CommitReport {
    /// 作成できなかった元データの件数
    pub fn failed_seeds(&self) -> usize {
        self.care_items.iter().filter(|o| !o.is_created()).count()
            + self.reminders.iter().filter(|o| !o.is_created()).count()
    }

    /// 上限により作成できなかった元データがあるか（アップセル表示の合図）
    pub fn requires_premium(&self) -> bool {
        self.care_items
            .iter()
            .filter_map(|o| o.result.as_ref().err())
            .chain(self.reminders.iter().filter_map(|o| o.result.as_ref().err()))
            .any(StoreError::requires_premium)
    }
}

/// オンボーディングのエラー
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OnboardingError {
    #[error("{0}")]
    Validation(String),

    #[error("このフローには {0:?} のステップがありません")]
    StepNotInFlow(OnboardingStep),

    #[error("現在のステップ ({current:?}) ではこの操作はできません")]
    WrongStep { current: OnboardingStep },

    #[error("確認ステップに到達していません")]
    NotAtReview,

    #[error(transparent)]
    Store(#[from] StoreError),
}
