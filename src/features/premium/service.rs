use super::models::{
    default_coupons, Coupon, CouponError, Package, PremiumError, PremiumState, ProviderError,
    RestoreOutcome,
};
use super::provider::EntitlementProvider;
use super::quota::{can_add, QuotaGate, ResourceKind};
use crate::shared::clock::Clock;
use crate::shared::config::AppConfig;
use crate::shared::storage::{decode_flag, encode_flag, KeyValueStore};
use std::sync::{Arc, Mutex, PoisonError};

/// 管理者モードの保存キー
pub const ADMIN_MODE_KEY: &str = "premium_admin_mode";

/// クーポンモードの保存キー
pub const COUPON_MODE_KEY: &str = "premium_coupon_mode";

/// 利用済みクーポン一覧の保存キー
pub const REDEEMED_COUPONS_KEY: &str = "premium_redeemed_coupons";

/// プレミアムサービスの設定
#[derive(Debug, Clone)]
pub struct PremiumConfig {
    /// プレミアムのエンタイトルメントID
    pub entitlement_id: String,
    /// プロバイダーから価格が取れない場合の表示価格
    pub fallback_price: String,
    /// 利用可能なクーポン
    pub coupons: Vec<Coupon>,
    /// プロバイダー連携が設定済みか（APIキーが無い場合はプロバイダーに問い合わせない）
    pub provider_configured: bool,
}

impl PremiumConfig {
    /// アプリケーション設定から作成する
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            entitlement_id: config.entitlement_id.clone(),
            fallback_price: config.fallback_price.clone(),
            coupons: default_coupons(),
            provider_configured: config.is_provider_configured(),
        }
    }
}

impl Default for PremiumConfig {
    fn default() -> Self {
        Self::from_app_config(&AppConfig::default())
    }
}

/// プレミアム状態を管理するサービス
///
/// 管理者モード・クーポンモード・プロバイダーのエンタイトルメントの論理和で
/// プレミアム状態を導出し、無料プランの上限判定を提供する。
/// 管理者モード・クーポンモード・利用済みクーポンの保存キーはこのサービスだけが読み書きする。
pub struct PremiumService<K, P> {
    storage: Arc<K>,
    provider: Arc<P>,
    clock: Arc<dyn Clock>,
    config: PremiumConfig,
    state: Mutex<PremiumState>,
    lifetime_package: Mutex<Option<Package>>,
    init_lock: tokio::sync::Mutex<()>,
}

impl<K: KeyValueStore, P: EntitlementProvider> PremiumService<K, P> {
    /// 新しいPremiumServiceを作成する
    ///
    /// # 引数
    /// * `storage` - キー・バリューストア
    /// * `provider` - エンタイトルメントプロバイダー
    /// * `clock` - 時計（クーポンの有効期限判定に使用）
    /// * `config` - サービス設定
    pub fn new(
        storage: Arc<K>,
        provider: Arc<P>,
        clock: Arc<dyn Clock>,
        config: PremiumConfig,
    ) -> Self {
        let state = PremiumState::new(config.fallback_price.clone());
        Self {
            storage,
            provider,
            clock,
            config,
            state: Mutex::new(state),
            lifetime_package: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut PremiumState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// 現在の状態のスナップショット
    pub fn state(&self) -> PremiumState {
        self.with_state(|state| state.clone())
    }

    /// 有効なプレミアム状態
    pub fn is_premium(&self) -> bool {
        self.with_state(|state| state.is_premium)
    }

    /// 買い切りパッケージが読み込まれているか
    pub fn has_lifetime_package(&self) -> bool {
        self.lifetime_package
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 初期化する
    ///
    /// 2回目以降の呼び出しは何もしない。ストレージやプロバイダーの失敗はログに記録し、
    /// 初期化自体は必ず完了させる。
    pub async fn initialize(&self) {
        let _guard = self.init_lock.lock().await;

        if self.with_state(|state| state.is_initialized) {
            log::debug!("プレミアム状態は初期化済みです");
            return;
        }

        self.with_state(|state| state.is_loading = true);

        let is_admin_mode = self.load_flag(ADMIN_MODE_KEY).await;
        let is_coupon_mode = self.load_flag(COUPON_MODE_KEY).await;
        let redeemed_coupons = self.load_redeemed_coupons().await;

        self.with_state(|state| {
            state.is_admin_mode = is_admin_mode;
            state.is_coupon_mode = is_coupon_mode;
            state.redeemed_coupons = redeemed_coupons;
            state.refresh();
        });

        if !is_admin_mode && !is_coupon_mode {
            if let Ok(entitled) = self.query_entitlement().await {
                self.with_state(|state| {
                    state.provider_entitled = entitled;
                    state.refresh();
                });
            }
        }

        let price_string = self.load_lifetime_offer().await;

        let snapshot = self.with_state(|state| {
            state.price_string = price_string;
            state.is_loading = false;
            state.is_initialized = true;
            state.refresh();
            state.clone()
        });

        log::info!(
            "プレミアム状態を初期化しました: is_premium={}, admin={}, coupon={}, provider={}",
            snapshot.is_premium,
            snapshot.is_admin_mode,
            snapshot.is_coupon_mode,
            snapshot.provider_entitled
        );
    }

    /// プレミアム状態を再確認する
    ///
    /// 管理者モードかクーポンモードなら即座にtrue。それ以外はプロバイダーに問い合わせ、
    /// 問い合わせできない場合は最後に得た値を返す。
    pub async fn check_premium_status(&self) -> bool {
        self.initialize().await;
        let short_circuit = self.with_state(|state| {
            state.refresh();
            state.is_admin_mode || state.is_coupon_mode
        });
        if short_circuit {
            return true;
        }

        if let Ok(entitled) = self.query_entitlement().await {
            self.with_state(|state| state.provider_entitled = entitled);
        }

        self.with_state(|state| {
            state.refresh();
            state.is_premium
        })
    }

    /// 買い切りプランを購入する
    ///
    /// 購入の成否ではなく、返されたエンタイトルメントにプレミアムが含まれるかで成功を判定する。
    pub async fn purchase_premium(&self) -> Result<(), PremiumError> {
        self.initialize().await;
        let package = self
            .lifetime_package
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PremiumError::ProductNotAvailable)?;

        log::info!("購入を開始します: package={}", package.identifier);
        self.with_state(|state| state.is_loading = true);
        let result = self.provider.purchase_package(&package).await;
        self.with_state(|state| state.is_loading = false);

        match result {
            Ok(customer_info) => {
                let entitled = customer_info.has_active(&self.config.entitlement_id);
                self.with_state(|state| {
                    state.provider_entitled = entitled;
                    state.refresh();
                });

                if entitled {
                    log::info!("購入が完了しプレミアムが有効になりました");
                    Ok(())
                } else {
                    log::warn!(
                        "購入は成功しましたがエンタイトルメントがありません: {}",
                        self.config.entitlement_id
                    );
                    Err(PremiumError::EntitlementNotGranted)
                }
            }
            Err(e) => {
                log::warn!("購入に失敗しました: {e}");
                Err(PremiumError::Provider(e))
            }
        }
    }

    /// 購入を復元する
    ///
    /// # 戻り値
    /// 復元呼び出しが成功した場合は、プレミアムが見つかったかどうか
    pub async fn restore_purchases(&self) -> Result<RestoreOutcome, PremiumError> {
        self.initialize().await;
        if !self.provider_available() {
            log::debug!("課金プロバイダーが使えないため復元できません");
            return Err(PremiumError::Provider(ProviderError::Disabled));
        }

        self.with_state(|state| state.is_loading = true);
        let result = self.provider.restore_purchases().await;
        self.with_state(|state| state.is_loading = false);

        let customer_info = result.map_err(|e| {
            log::warn!("購入の復元に失敗しました: {e}");
            PremiumError::Provider(e)
        })?;

        let entitlement_found = customer_info.has_active(&self.config.entitlement_id);
        self.with_state(|state| {
            state.provider_entitled = entitlement_found;
            state.refresh();
        });

        log::info!("購入を復元しました: entitlement_found={entitlement_found}");
        Ok(RestoreOutcome { entitlement_found })
    }

    /// クーポンを利用する
    ///
    /// 成功するとクーポンモードが有効になり、以後はトグルで明示的に無効化しない限り維持される。
    /// 利用済みの判定は保存済みの一覧を読み込んでから行う。
    pub async fn redeem_coupon(&self, code: &str) -> Result<(), CouponError> {
        self.initialize().await;
        let code = code.trim();
        let coupon = self
            .config
            .coupons
            .iter()
            .find(|c| !code.is_empty() && c.code == code)
            .ok_or(CouponError::Invalid)?;

        if coupon.is_expired(self.clock.now()) {
            log::info!("期限切れのクーポンが入力されました: {code}");
            return Err(CouponError::Expired);
        }

        let redeemed = self.with_state(|state| {
            if state.has_redeemed(code) {
                return Err(CouponError::AlreadyUsed);
            }
            state.redeemed_coupons.push(code.to_string());
            state.is_coupon_mode = true;
            state.refresh();
            Ok(state.redeemed_coupons.clone())
        })?;

        match serde_json::to_string(&redeemed) {
            Ok(json) => self.persist(REDEEMED_COUPONS_KEY, &json).await,
            Err(e) => log::error!("利用済みクーポンのシリアライズに失敗しました: {e}"),
        }
        self.persist(COUPON_MODE_KEY, encode_flag(true)).await;

        log::info!("クーポンを利用しました: {code}");
        Ok(())
    }

    /// 管理者モードを設定する
    pub async fn set_admin_mode(&self, enabled: bool) {
        self.initialize().await;
        self.persist(ADMIN_MODE_KEY, encode_flag(enabled)).await;
        self.with_state(|state| state.is_admin_mode = enabled);
        self.reconcile().await;
        log::info!("管理者モードを変更しました: enabled={enabled}");
    }

    /// 管理者モードを切り替える
    ///
    /// # 戻り値
    /// 切り替え後の管理者モード
    pub async fn toggle_admin_mode(&self) -> bool {
        self.initialize().await;
        let enabled = !self.with_state(|state| state.is_admin_mode);
        self.set_admin_mode(enabled).await;
        enabled
    }

    /// クーポンモードを設定する
    pub async fn set_coupon_mode(&self, enabled: bool) {
        self.initialize().await;
        self.persist(COUPON_MODE_KEY, encode_flag(enabled)).await;
        self.with_state(|state| state.is_coupon_mode = enabled);
        self.reconcile().await;
        log::info!("クーポンモードを変更しました: enabled={enabled}");
    }

    /// 残っているソースからプレミアム状態を再計算する
    ///
    /// 管理者モード・クーポンモードのどちらも無効なら、プロバイダーに改めて問い合わせる。
    /// プロバイダーが無効ならプロバイダー由来のプレミアムは無し、呼び出し失敗なら最後の値を維持する。
    async fn reconcile(&self) {
        let needs_provider = self.with_state(|state| {
            state.refresh();
            !state.is_admin_mode && !state.is_coupon_mode
        });
        if !needs_provider {
            return;
        }

        match self.query_entitlement().await {
            Ok(entitled) => self.with_state(|state| state.provider_entitled = entitled),
            Err(ProviderError::Disabled) => {
                self.with_state(|state| state.provider_entitled = false)
            }
            Err(_) => {}
        }
        self.with_state(|state| state.refresh());
    }

    /// APIキーが設定され、プロバイダー自体も有効か
    fn provider_available(&self) -> bool {
        self.config.provider_configured && self.provider.is_enabled()
    }

    /// プロバイダーにエンタイトルメントを問い合わせる
    async fn query_entitlement(&self) -> Result<bool, ProviderError> {
        if !self.provider_available() {
            log::debug!("課金プロバイダーが無効のため問い合わせをスキップします");
            return Err(ProviderError::Disabled);
        }

        self.provider
            .has_entitlement(&self.config.entitlement_id)
            .await
            .inspect_err(|e| log::warn!("エンタイトルメントの確認に失敗しました: {e}"))
    }

    /// 買い切りオファーを読み込み、表示価格を返す
    async fn load_lifetime_offer(&self) -> String {
        let fallback = self.config.fallback_price.clone();

        if !self.provider_available() {
            return fallback;
        }

        let offerings = match self.provider.get_offerings().await {
            Ok(offerings) => offerings,
            Err(e) => {
                log::warn!("オファリングの取得に失敗しました: {e}");
                return fallback;
            }
        };

        let package = offerings.lifetime_package().cloned();
        let price_string = package
            .as_ref()
            .map(|p| p.price_string.clone())
            .filter(|price| !price.is_empty())
            .unwrap_or(fallback);

        if package.is_none() {
            log::warn!("買い切りパッケージが見つかりません");
        }
        *self
            .lifetime_package
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = package;

        price_string
    }

    async fn load_flag(&self, key: &str) -> bool {
        match self.storage.get(key).await {
            Ok(value) => decode_flag(value.as_deref()),
            Err(e) => {
                log::warn!("保存値の読み込みに失敗しました: key={key}, error={e}");
                false
            }
        }
    }

    async fn load_redeemed_coupons(&self) -> Vec<String> {
        let raw = match self.storage.get(REDEEMED_COUPONS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                log::warn!("利用済みクーポンの読み込みに失敗しました: {e}");
                return Vec::new();
            }
        };

        let mut coupons: Vec<String> = serde_json::from_str(&raw).unwrap_or_else(|e| {
            log::warn!("利用済みクーポンの解析に失敗しました: {e}");
            Vec::new()
        });
        let mut seen = std::collections::HashSet::new();
        coupons.retain(|code| seen.insert(code.clone()));
        coupons
    }

    async fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value).await {
            log::error!("保存に失敗しました: key={key}, error={e}");
        }
    }
}

impl<K: KeyValueStore, P: EntitlementProvider> QuotaGate for PremiumService<K, P> {
    fn can_add_pet(&self, current_count: usize) -> bool {
        can_add(self.is_premium(), ResourceKind::Pet, current_count)
    }

    fn can_add_care_item(&self, current_count: usize) -> bool {
        can_add(self.is_premium(), ResourceKind::CareItem, current_count)
    }

    fn can_add_reminder(&self, current_count: usize) -> bool {
        can_add(self.is_premium(), ResourceKind::Reminder, current_count)
    }
}
