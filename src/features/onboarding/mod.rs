/// オンボーディング機能モジュール
///
/// このモジュールは、ペット登録ウィザードに関連する機能を提供します：
/// - basics → photo → info → (care) → review のステップ遷移と入力検証
/// - 入力内容の確定（ペットと初期のケア項目・リマインダーの作成）
pub mod models;
pub mod wizard;

// 公開インターフェース
pub use models::{
    CareSeed, CommitReport, OnboardingDraft, OnboardingError, OnboardingFlow, OnboardingStep,
    PetInfo, ReminderSeed, SeedOutcome,
};
pub use wizard::{OnboardingWizard, StepBack};
