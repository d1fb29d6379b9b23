// 機能別モジュール
pub mod features;
pub mod shared;

#[cfg(test)]
mod testing;

use features::calendar::{CalendarMirror, CalendarProvider};
use features::onboarding::{CommitReport, OnboardingError, OnboardingFlow, OnboardingWizard};
use features::pets::{PetRepository, Reminder};
use features::premium::{EntitlementProvider, PremiumConfig, PremiumService};
use log::info;
use shared::clock::{Clock, SystemClock};
use shared::config::AppConfig;
use shared::errors::AppResult;
use shared::storage::{KeyValueStore, SqliteKeyValueStore};
use std::sync::Arc;

/// アプリケーションのコンポジションルート
///
/// キー・バリューストア、エンタイトルメントプロバイダー、端末カレンダーを受け取り、
/// 各サービスを組み立てて保持する。モバイルシェルはこの構造体を通じて機能を呼び出す。
pub struct PetCareApp<K, P, C> {
    config: AppConfig,
    premium: Arc<PremiumService<K, P>>,
    calendar: Arc<CalendarMirror<C>>,
    pets: PetRepository<K, PremiumService<K, P>, C>,
}

impl<P, C> PetCareApp<SqliteKeyValueStore, P, C>
where
    P: EntitlementProvider,
    C: CalendarProvider,
{
    /// 設定のデータディレクトリにあるデータベースを開いてアプリケーションを組み立てる
    ///
    /// # 引数
    /// * `config` - アプリケーション設定
    /// * `provider` - エンタイトルメントプロバイダー
    /// * `calendar` - 端末カレンダー
    ///
    /// # 戻り値
    /// 組み立てたアプリケーション、またはデータベースを開けない場合はエラー
    pub fn open(config: AppConfig, provider: Arc<P>, calendar: Arc<C>) -> AppResult<Self> {
        let database_path = config.database_path();
        info!("データベースを開きます: {}", database_path.display());
        let storage = Arc::new(SqliteKeyValueStore::open(&database_path)?);
        Ok(Self::with_storage(
            config,
            storage,
            provider,
            calendar,
            Arc::new(SystemClock),
        ))
    }
}

impl<K, P, C> PetCareApp<K, P, C>
where
    K: KeyValueStore,
    P: EntitlementProvider,
    C: CalendarProvider,
{
    /// 任意のストアと時計でアプリケーションを組み立てる
    pub fn with_storage(
        config: AppConfig,
        storage: Arc<K>,
        provider: Arc<P>,
        calendar: Arc<C>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let premium = Arc::new(PremiumService::new(
            storage.clone(),
            provider,
            clock.clone(),
            PremiumConfig::from_app_config(&config),
        ));
        let calendar = Arc::new(CalendarMirror::new(
            calendar,
            config.calendar_attribution.clone(),
        ));
        let pets = PetRepository::new(storage, premium.clone(), calendar.clone(), clock);

        Self {
            config,
            premium,
            calendar,
            pets,
        }
    }

    /// 保存済みデータを読み込み、プレミアム状態を初期化する
    pub async fn start(&self) {
        self.pets.hydrate().await;
        self.premium.initialize().await;
        info!(
            "アプリケーションを開始しました: environment={:?}, premium={}",
            self.config.environment,
            self.premium.is_premium()
        );
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn premium(&self) -> &PremiumService<K, P> {
        &self.premium
    }

    pub fn pets(&self) -> &PetRepository<K, PremiumService<K, P>, C> {
        &self.pets
    }

    pub fn calendar(&self) -> &CalendarMirror<C> {
        &self.calendar
    }

    /// オンボーディングを開始する
    ///
    /// ペットが1匹もいなければ完全なフロー、いればペット追加のフローになる。
    pub fn start_onboarding(&self) -> OnboardingWizard {
        let flow = if self.pets.pet_count() == 0 {
            OnboardingFlow::Full
        } else {
            OnboardingFlow::AddPet
        };
        OnboardingWizard::new(flow)
    }

    /// オンボーディングの入力内容を確定する
    pub async fn complete_onboarding(
        &self,
        wizard: OnboardingWizard,
    ) -> Result<CommitReport, OnboardingError> {
        wizard.commit(&self.pets).await
    }

    /// 設定のタイムゾーンでの今日のリマインダー
    pub fn reminders_today(&self) -> Vec<Reminder> {
        self.pets.reminders_today(self.config.timezone)
    }
}

/// ログシステムを初期化する
///
/// 2回目以降の呼び出しは無視される。
pub fn initialize_logging_system(config: &AppConfig) {
    let log_level = match config.log_level.to_lowercase().as_str() {
        "error" => log::LevelFilter::Error,
        "warn" => log::LevelFilter::Warn,
        "info" => log::LevelFilter::Info,
        "debug" => log::LevelFilter::Debug,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    };

    let result = env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp_secs()
        .format_module_path(false)
        .format_target(false)
        .try_init();

    match result {
        Ok(()) => info!(
            "ログシステムを初期化しました: level={}, environment={:?}",
            config.log_level, config.environment
        ),
        Err(_) => log::debug!("ログシステムは初期化済みです"),
    }
}
