//! 課金・エンタイトルメントプロバイダーのインターフェース
use super::models::{CustomerInfo, Offerings, Package, ProviderError};
use std::future::Future;

/// エンタイトルメントプロバイダー
///
/// すべての呼び出しは失敗しうる。`is_enabled() == false` は「呼び出しの失敗」とは区別される
/// 状態で、その場合は各呼び出しが `ProviderError::Disabled` を返す。
pub trait EntitlementProvider: Send + Sync {
    /// プロバイダー連携が有効かどうか
    fn is_enabled(&self) -> bool;

    /// 指定したエンタイトルメントが有効かどうか
    fn has_entitlement(
        &self,
        entitlement_id: &str,
    ) -> impl Future<Output = Result<bool, ProviderError>> + Send;

    /// オファリング一覧を取得する
    fn get_offerings(&self) -> impl Future<Output = Result<Offerings, ProviderError>> + Send;

    /// パッケージを購入する
    fn purchase_package(
        &self,
        package: &Package,
    ) -> impl Future<Output = Result<CustomerInfo, ProviderError>> + Send;

    /// 購入を復元する
    fn restore_purchases(&self) -> impl Future<Output = Result<CustomerInfo, ProviderError>> + Send;
}

/// 連携未設定時のプロバイダー
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledEntitlementProvider;

impl EntitlementProvider for DisabledEntitlementProvider {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn has_entitlement(&self, _entitlement_id: &str) -> Result<bool, ProviderError> {
        Err(ProviderError::Disabled)
    }

    async fn get_offerings(&self) -> Result<Offerings, ProviderError> {
        Err(ProviderError::Disabled)
    }

    async fn purchase_package(&self, _package: &Package) -> Result<CustomerInfo, ProviderError> {
        Err(ProviderError::Disabled)
    }

    async fn restore_purchases(&self) -> Result<CustomerInfo, ProviderError> {
        Err(ProviderError::Disabled)
    }
}
