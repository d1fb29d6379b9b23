/// プレミアム機能モジュール
///
/// このモジュールは、プレミアム状態の管理に関連する機能を提供します：
/// - 管理者モード、クーポン、課金プロバイダーの3つのソースからのプレミアム判定
/// - 買い切りパッケージの購入と購入の復元
/// - 無料プランの上限チェック
pub mod models;
pub mod provider;
pub mod quota;
pub mod service;

// 公開インターフェース
pub use models::{
    Coupon, CouponError, CustomerInfo, Offerings, Package, PremiumError, PremiumState,
    ProviderError, RestoreOutcome,
};
pub use provider::{DisabledEntitlementProvider, EntitlementProvider};
pub use quota::{can_add, derive_premium, QuotaGate, ResourceKind};
pub use service::{PremiumConfig, PremiumService};
