use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::quota::derive_premium;

/// プレミアム状態
///
/// `is_premium` は3つのソース（管理者モード、クーポンモード、プロバイダーのエンタイトルメント）
/// から常に再計算される。直接書き換えるAPIは存在しない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PremiumState {
    /// 有効なプレミアム状態（導出値）
    pub is_premium: bool,
    /// 開発者・テスト用の管理者モード
    pub is_admin_mode: bool,
    /// クーポン利用によるプレミアム（一度有効になると維持される）
    pub is_coupon_mode: bool,
    /// プロバイダーから最後に得たエンタイトルメントの有無
    pub provider_entitled: bool,
    /// 利用済みクーポンコード（追記のみ）
    pub redeemed_coupons: Vec<String>,
    /// 買い切りプランの表示価格
    pub price_string: String,
    /// 非同期処理中かどうか
    pub is_loading: bool,
    /// 初期化済みかどうか
    pub is_initialized: bool,
}

impl PremiumState {
    /// 初期状態を作成する
    ///
    /// # 引数
    /// * `price_string` - 初期表示価格
    pub fn new(price_string: impl Into<String>) -> Self {
        Self {
            is_premium: false,
            is_admin_mode: false,
            is_coupon_mode: false,
            provider_entitled: false,
            redeemed_coupons: Vec::new(),
            price_string: price_string.into(),
            is_loading: false,
            is_initialized: false,
        }
    }

    /// 3つのソースから `is_premium` を再計算する
    pub(crate) fn refresh(&mut self) {
        self.is_premium =
            derive_premium(self.is_admin_mode, self.is_coupon_mode, self.provider_entitled);
    }

    /// クーポンが利用済みかどうか
    pub fn has_redeemed(&self, code: &str) -> bool {
        self.redeemed_coupons.iter().any(|c| c == code)
    }
}

/// クーポン定義
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// クーポンコード
    pub code: String,
    /// 有効期限（Noneの場合は無期限）
    pub expires_at: Option<DateTime<Utc>>,
}

impl Coupon {
    pub fn new(code: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            code: code.into(),
            expires_at,
        }
    }

    /// 指定時刻において期限切れかどうか
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at < now)
    }
}

/// 組み込みのクーポンカタログ
pub fn default_coupons() -> Vec<Coupon> {
    vec![
        Coupon::new("#CARNAVAU#", None),
        Coupon::new(
            "PETLOVER2025",
            Utc.with_ymd_and_hms(2025, 12, 31, 23, 59, 59).single(),
        ),
    ]
}

/// パッケージ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    Lifetime,
    Annual,
    Monthly,
    Custom,
}

/// 購入可能なパッケージ
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// パッケージ識別子（例: "$rc_lifetime"）
    pub identifier: String,
    /// パッケージ種別
    pub package_type: PackageType,
    /// ストアの商品ID
    pub product_id: String,
    /// ローカライズ済みの価格表示
    pub price_string: String,
}

/// 買い切りパッケージの標準識別子
pub const LIFETIME_PACKAGE_IDENTIFIER: &str = "$rc_lifetime";

impl Package {
    /// 買い切りパッケージかどうか
    pub fn is_lifetime(&self) -> bool {
        self.package_type == PackageType::Lifetime
            || self.identifier == LIFETIME_PACKAGE_IDENTIFIER
    }
}

/// オファリング
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub identifier: String,
    pub available_packages: Vec<Package>,
}

/// プロバイダーから取得したオファリング一覧
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offerings {
    /// 現在のオファリング（未設定の場合はNone）
    pub current: Option<Offering>,
}

impl Offerings {
    /// 現在のオファリングから買い切りパッケージを探す
    ///
    /// 種別が `Lifetime` のものを優先し、なければ識別子 `$rc_lifetime` のものを返す。
    pub fn lifetime_package(&self) -> Option<&Package> {
        let packages = &self.current.as_ref()?.available_packages;
        packages
            .iter()
            .find(|p| p.package_type == PackageType::Lifetime)
            .or_else(|| packages.iter().find(|p| p.is_lifetime()))
    }
}

/// エンタイトルメント情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementInfos {
    /// 有効なエンタイトルメント（ID → 有効フラグ）
    pub active: BTreeMap<String, bool>,
}

/// 購入・復元の結果として返される顧客情報
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub entitlements: EntitlementInfos,
}

impl CustomerInfo {
    /// 指定したエンタイトルメントを持つ顧客情報を作成する
    pub fn with_active(ids: &[&str]) -> Self {
        Self {
            entitlements: EntitlementInfos {
                active: ids.iter().map(|id| (id.to_string(), true)).collect(),
            },
        }
    }

    /// 指定したエンタイトルメントが有効かどうか
    pub fn has_active(&self, entitlement_id: &str) -> bool {
        self.entitlements
            .active
            .get(entitlement_id)
            .copied()
            .unwrap_or(false)
    }
}

/// 購入復元の結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreOutcome {
    /// 復元されたエンタイトルメントの中にプレミアムが含まれていたか
    pub entitlement_found: bool,
}

/// エンタイトルメントプロバイダーのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// プロバイダー連携が無効（未設定）
    #[error("課金プロバイダーが利用できません")]
    Disabled,

    /// ユーザーによるキャンセル
    #[error("購入がキャンセルされました")]
    Cancelled,

    /// 通信などの失敗
    #[error("課金プロバイダーエラー: {0}")]
    Failed(String),
}

/// プレミアム操作のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PremiumError {
    /// 買い切りパッケージが読み込まれていない
    #[error("商品が利用できません")]
    ProductNotAvailable,

    /// 購入は成功したがプレミアムのエンタイトルメントが付与されなかった
    #[error("購入は完了しましたが、プレミアムが有効になりませんでした")]
    EntitlementNotGranted,

    /// プロバイダー呼び出しの失敗
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// クーポン利用のエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CouponError {
    /// 存在しないクーポン
    #[error("無効なクーポンコードです")]
    Invalid,

    /// 期限切れのクーポン
    #[error("このクーポンは有効期限が切れています")]
    Expired,

    /// 利用済みのクーポン
    #[error("このクーポンはすでに使用されています")]
    AlreadyUsed,
}
