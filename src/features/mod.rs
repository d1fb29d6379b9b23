/// 機能別モジュール
///
/// 各機能モジュールは、その機能に関連するコード（モデル、サービス、リポジトリ）を含む
/// 自己完結型のユニットです。
pub mod calendar;
pub mod onboarding;
pub mod pets;
pub mod premium;
