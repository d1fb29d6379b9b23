use crate::shared::errors::{AppError, AppResult};
use chrono_tz::Tz;
use std::path::PathBuf;

/// アプリケーションの実行環境を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// 開発環境
    Development,
    /// プロダクション環境
    Production,
}

/// エンタイトルメントIDのデフォルト値
pub const DEFAULT_ENTITLEMENT_ID: &str = "premium";

/// プロバイダーから価格が取得できない場合の表示価格
pub const DEFAULT_FALLBACK_PRICE: &str = "R$ 29,90";

/// カレンダーイベントのメモ欄に追記する帰属表示
pub const DEFAULT_CALENDAR_ATTRIBUTION: &str = "Criado pelo PetCare";

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 実行環境
    pub environment: Environment,
    /// ログレベル
    pub log_level: String,
    /// アプリケーションデータディレクトリ
    pub data_dir: PathBuf,
    /// 「今日」の判定に使うタイムゾーン
    pub timezone: Tz,
    /// RevenueCat APIキー（未設定の場合はプロバイダー連携が無効）
    pub revenuecat_api_key: Option<String>,
    /// プレミアムのエンタイトルメントID
    pub entitlement_id: String,
    /// フォールバック価格表示
    pub fallback_price: String,
    /// カレンダーイベントの帰属表示
    pub calendar_attribution: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            log_level: "debug".to_string(),
            data_dir: std::env::temp_dir().join("petcare"),
            timezone: Tz::UTC,
            revenuecat_api_key: None,
            entitlement_id: DEFAULT_ENTITLEMENT_ID.to_string(),
            fallback_price: DEFAULT_FALLBACK_PRICE.to_string(),
            calendar_attribution: DEFAULT_CALENDAR_ATTRIBUTION.to_string(),
        }
    }
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// アプリケーション設定、またはタイムゾーン・データディレクトリが解決できない場合はエラー
    pub fn from_env() -> AppResult<Self> {
        let environment = get_environment();
        let debug_mode = environment == Environment::Development;

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| {
            if debug_mode {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

        let data_dir = match std::env::var("PETCARE_DATA_DIR") {
            Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
            _ => dirs::data_dir()
                .map(|dir| dir.join("petcare"))
                .ok_or_else(|| {
                    AppError::configuration("アプリデータディレクトリを特定できません")
                })?,
        };

        let timezone = match std::env::var("PETCARE_TIMEZONE") {
            Ok(name) => parse_timezone(&name)?,
            Err(_) => Tz::UTC,
        };

        let revenuecat_api_key = std::env::var("REVENUECAT_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty());

        let config = Self {
            environment,
            log_level,
            data_dir,
            timezone,
            revenuecat_api_key,
            entitlement_id: env_or("PETCARE_ENTITLEMENT_ID", DEFAULT_ENTITLEMENT_ID),
            fallback_price: env_or("PETCARE_FALLBACK_PRICE", DEFAULT_FALLBACK_PRICE),
            calendar_attribution: env_or(
                "PETCARE_CALENDAR_ATTRIBUTION",
                DEFAULT_CALENDAR_ATTRIBUTION,
            ),
        };

        log::debug!(
            "設定を読み込みました: environment={:?}, timezone={}, provider_configured={}",
            config.environment,
            config.timezone,
            config.is_provider_configured()
        );

        Ok(config)
    }

    /// プロダクション環境かどうかを判定
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// エンタイトルメントプロバイダー連携が設定済みかどうか
    pub fn is_provider_configured(&self) -> bool {
        self.revenuecat_api_key.is_some()
    }

    /// データベースファイルのパスを取得する
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(get_database_filename(self.environment))
    }
}

/// 環境変数を読み込み、未設定または空の場合はデフォルト値を返す
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// IANAタイムゾーン名を解析する
///
/// # 引数
/// * `name` - タイムゾーン名（例: "America/Sao_Paulo"）
pub fn parse_timezone(name: &str) -> AppResult<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|e| AppError::configuration(format!("タイムゾーンが不正です: {name} ({e})")))
}

/// 現在の実行環境を判定する
///
/// # 判定ロジック
/// 1. コンパイル時埋め込み環境変数を最優先
/// 2. 実行時環境変数 ENVIRONMENT を確認
/// 3. デバッグビルドの場合は Development
/// 4. リリースビルドの場合は Production
pub fn get_environment() -> Environment {
    if let Some(embedded_env) = option_env!("EMBEDDED_ENVIRONMENT") {
        let env = match embedded_env {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: コンパイル時埋め込み値を使用 -> {embedded_env} -> {env:?}");
        return env;
    }

    if let Ok(env_var) = std::env::var("ENVIRONMENT") {
        let env = match env_var.as_str() {
            "production" => Environment::Production,
            _ => Environment::Development,
        };
        log::debug!("環境判定: 実行時環境変数を使用 -> {env_var} -> {env:?}");
        return env;
    }

    if cfg!(debug_assertions) {
        Environment::Development
    } else {
        Environment::Production
    }
}

/// 環境に応じたデータベースファイル名を取得する
///
/// # ファイル名の規則
/// - 開発環境: "dev_petcare.db"
/// - プロダクション環境: "petcare.db"
pub fn get_database_filename(env: Environment) -> &'static str {
    match env {
        Environment::Development => "dev_petcare.db",
        Environment::Production => "petcare.db",
    }
}

/// .envファイルを読み込む
///
/// コンパイル時に環境が埋め込まれている場合は実行時の読み込みをスキップする。
pub fn load_environment_variables() {
    if let Some(env) = option_env!("EMBEDDED_ENVIRONMENT") {
        log::info!("コンパイル時埋め込み環境設定を使用: {env}");
        return;
    }

    match dotenv::dotenv() {
        Ok(path) => log::info!(".envファイルを読み込みました: {}", path.display()),
        Err(_) => log::warn!(
            ".envファイルが見つかりません。環境変数が直接設定されていることを確認してください。"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_filename() {
        assert_eq!(
            get_database_filename(Environment::Development),
            "dev_petcare.db"
        );
        assert_eq!(get_database_filename(Environment::Production), "petcare.db");
    }

    #[test]
    fn test_parse_timezone() {
        let tz = parse_timezone("America/Sao_Paulo").unwrap();
        assert_eq!(tz, chrono_tz::America::Sao_Paulo);

        let result = parse_timezone("Mars/Olympus_Mons");
        assert!(matches!(result, Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.is_production());
        assert!(!config.is_provider_configured());
        assert_eq!(config.entitlement_id, "premium");
        assert!(config.database_path().ends_with("dev_petcare.db"));
    }

    #[test]
    fn test_provider_configured_with_key() {
        let config = AppConfig {
            revenuecat_api_key: Some("appl_test".to_string()),
            ..AppConfig::default()
        };
        assert!(config.is_provider_configured());
    }
}
