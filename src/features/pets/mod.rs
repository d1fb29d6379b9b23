/// ペット管理機能モジュール
///
/// このモジュールは、ペットとその記録に関連するすべての機能を提供します：
/// - ペット、ケア項目、リマインダーの作成、読み取り、更新、削除
/// - ペット削除時の配下レコードの連鎖削除
/// - 期限切れ・間近・今日の予定の導出
pub mod models;
pub mod queries;
pub mod repository;

// 公開インターフェース
pub use models::{
    CareItem, CareItemId, CareStatus, CareType, CreateCareItemDto, CreatePetDto,
    CreateReminderDto, DeletedPet, Pet, PetId, PetRecords, Reminder, ReminderId, RepeatType,
    Species, StoreError, UpdateCareItemDto, UpdatePetDto, UpdateReminderDto,
};
pub use queries::{care_status, next_occurrence, DueItem, DueSource};
pub use repository::{PetRepository, RECORDS_KEY};
