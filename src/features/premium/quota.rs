//! 無料プランの上限と、プレミアム判定の純粋関数
use serde::{Deserialize, Serialize};

/// 無料プランで登録できるペットの上限
pub const FREE_PET_LIMIT: usize = 2;

/// 無料プランで登録できるケア項目の上限（全ペット合計）
pub const FREE_CARE_ITEM_LIMIT: usize = 1;

/// 無料プランで登録できるリマインダーの上限（全ペット合計）
pub const FREE_REMINDER_LIMIT: usize = 1;

/// 上限が適用されるリソースの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Pet,
    CareItem,
    Reminder,
}

impl ResourceKind {
    /// 無料プランでの上限
    pub fn free_limit(self) -> usize {
        match self {
            ResourceKind::Pet => FREE_PET_LIMIT,
            ResourceKind::CareItem => FREE_CARE_ITEM_LIMIT,
            ResourceKind::Reminder => FREE_REMINDER_LIMIT,
        }
    }
}

/// 3つのソースからプレミアム状態を導出する
pub fn derive_premium(admin_mode: bool, coupon_mode: bool, provider_entitled: bool) -> bool {
    admin_mode || coupon_mode || provider_entitled
}

/// 現在の件数からもう1件追加できるかどうか
///
/// # 引数
/// * `is_premium` - プレミアム状態
/// * `kind` - リソースの種類
/// * `current_count` - 現在の件数
pub fn can_add(is_premium: bool, kind: ResourceKind, current_count: usize) -> bool {
    is_premium || current_count < kind.free_limit()
}

/// 作成前に上限を確認する窓口
///
/// 拒否はエラーではなく、アップセルを表示する合図として扱う。
pub trait QuotaGate: Send + Sync {
    fn can_add_pet(&self, current_count: usize) -> bool;
    fn can_add_care_item(&self, current_count: usize) -> bool;
    fn can_add_reminder(&self, current_count: usize) -> bool;

    fn can_add(&self, kind: ResourceKind, current_count: usize) -> bool {
        match kind {
            ResourceKind::Pet => self.can_add_pet(current_count),
            ResourceKind::CareItem => self.can_add_care_item(current_count),
            ResourceKind::Reminder => self.can_add_reminder(current_count),
        }
    }
}
