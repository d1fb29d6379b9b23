use super::models::{
    validate_pet_basics, validate_title, validate_weight, CareItem, CareItemId, CreateCareItemDto,
    CreatePetDto, CreateReminderDto, DeletedPet, Pet, PetId, PetRecords, Reminder, ReminderId,
    Species, StoreError, UpdateCareItemDto, UpdatePetDto, UpdateReminderDto,
};
use super::queries::{self, DueItem};
use crate::features::calendar::mirror::{build_care_item_event, build_reminder_event, CalendarMirror};
use crate::features::calendar::models::CalendarEventId;
use crate::features::calendar::provider::CalendarProvider;
use crate::features::premium::quota::{QuotaGate, ResourceKind};
use crate::shared::clock::Clock;
use crate::shared::storage::KeyValueStore;
use chrono_tz::Tz;
use std::sync::{Arc, Mutex, PoisonError};

/// レコード一式を保存するキー
pub const RECORDS_KEY: &str = "petcare_records";

/// 保存済みレコードの読み込み状況
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoadState {
    Pending,
    Loaded,
    /// 読み込みに失敗した。このセッションでは保存しない
    Unavailable,
}

/// ペット・ケア項目・リマインダーのリポジトリ
///
/// メモリ上のレコードが正となり、変更のたびにキー・バリューストアへ保存する。
/// 作成前の上限チェックは `QuotaGate` に委ね、カレンダー連携の失敗で変更が失敗することはない。
pub struct PetRepository<K, G, C> {
    storage: Arc<K>,
    quota: Arc<G>,
    calendar: Arc<CalendarMirror<C>>,
    clock: Arc<dyn Clock>,
    records: Mutex<PetRecords>,
    load_state: tokio::sync::Mutex<LoadState>,
}

impl<K, G, C> PetRepository<K, G, C>
where
    K: KeyValueStore,
    G: QuotaGate,
    C: CalendarProvider,
{
    /// 新しいPetRepositoryを作成する
    ///
    /// # 引数
    /// * `storage` - キー・バリューストア
    /// * `quota` - 上限チェック（通常はPremiumService）
    /// * `calendar` - カレンダーミラー
    /// * `clock` - 時計
    pub fn new(
        storage: Arc<K>,
        quota: Arc<G>,
        calendar: Arc<CalendarMirror<C>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            storage,
            quota,
            calendar,
            clock,
            records: Mutex::new(PetRecords::default()),
            load_state: tokio::sync::Mutex::new(LoadState::Pending),
        }
    }

    fn with_records<R>(&self, f: impl FnOnce(&mut PetRecords) -> R) -> R {
        let mut guard = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// 保存済みのレコードを読み込む
    ///
    /// 2回目以降の呼び出しは何もしない。変更系の操作は最初にこれを呼ぶため、
    /// 読み込み前の変更で保存済みデータが上書きされることはない。
    /// 解析に失敗した場合は空の状態で続行する。読み込み自体に失敗した場合は
    /// メモリ上で続行し、このセッションの変更は保存しない。
    pub async fn hydrate(&self) {
        let mut load_state = self.load_state.lock().await;
        if *load_state != LoadState::Pending {
            return;
        }

        let raw = match self.storage.get(RECORDS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::debug!("保存済みのペットデータはありません");
                *load_state = LoadState::Loaded;
                return;
            }
            Err(e) => {
                log::warn!("ペットデータの読み込みに失敗しました。このセッションの変更は保存しません: {e}");
                *load_state = LoadState::Unavailable;
                return;
            }
        };
        *load_state = LoadState::Loaded;

        let mut records: PetRecords = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                log::error!("ペットデータの解析に失敗しました: {e}");
                return;
            }
        };

        let dropped = records.drop_orphans();
        if dropped > 0 {
            log::warn!("存在しないペットを参照するレコードを{dropped}件除外しました");
        }

        log::info!(
            "ペットデータを読み込みました: pets={}, care_items={}, reminders={}",
            records.pets.len(),
            records.care_items.len(),
            records.reminders.len()
        );
        self.with_records(|current| *current = records);
    }

    async fn persist(&self) {
        if *self.load_state.lock().await != LoadState::Loaded {
            log::warn!("保存済みデータを読み込めていないため、ペットデータを保存しません");
            return;
        }

        let snapshot = self.snapshot();
        let json = match serde_json::to_string(&snapshot) {
            Ok(json) => json,
            Err(e) => {
                log::error!("ペットデータのシリアライズに失敗しました: {e}");
                return;
            }
        };

        if let Err(e) = self.storage.set(RECORDS_KEY, &json).await {
            log::error!("ペットデータの保存に失敗しました: {e}");
        }
    }

    fn check_quota(&self, kind: ResourceKind, current_count: usize) -> Result<(), StoreError> {
        if self.quota.can_add(kind, current_count) {
            Ok(())
        } else {
            log::info!("無料プランの上限に達しました: {kind:?} (現在 {current_count} 件)");
            Err(StoreError::QuotaExceeded(kind))
        }
    }

    // ---- ペット ----

    /// ペットを作成する
    ///
    /// # 戻り値
    /// 作成されたペット。上限に達している場合は `StoreError::QuotaExceeded`
    pub async fn create_pet(&self, dto: CreatePetDto) -> Result<Pet, StoreError> {
        self.hydrate().await;
        validate_pet_basics(&dto.name, Some(dto.species), dto.custom_species.as_deref())
            .map_err(StoreError::Validation)?;
        validate_weight(dto.weight_kg).map_err(StoreError::Validation)?;

        let now = self.clock.now();
        let pet = self.with_records(|records| {
            self.check_quota(ResourceKind::Pet, records.pets.len())?;

            let pet = Pet {
                id: PetId::generate(),
                name: dto.name.trim().to_string(),
                custom_species: normalize_custom_species(dto.species, dto.custom_species),
                species: dto.species,
                photo_uri: dto.photo_uri,
                breed: normalize_optional(dto.breed),
                birth_date: dto.birth_date,
                weight_kg: dto.weight_kg,
                created_at: now,
            };
            records.pets.push(pet.clone());
            Ok::<_, StoreError>(pet)
        })?;

        log::info!("ペットを作成しました: id={}, name={}", pet.id, pet.name);
        self.persist().await;
        Ok(pet)
    }

    /// ペットを更新する（Noneの項目は変更しない）
    pub async fn update_pet(&self, id: PetId, dto: UpdatePetDto) -> Result<Pet, StoreError> {
        self.hydrate().await;
        let pet = self.with_records(|records| {
            let pet = records
                .pets
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(StoreError::PetNotFound(id))?;

            let mut updated = pet.clone();
            if let Some(name) = dto.name {
                updated.name = name.trim().to_string();
            }
            if let Some(species) = dto.species {
                updated.species = species;
            }
            if dto.custom_species.is_some() {
                updated.custom_species = dto.custom_species;
            }
            updated.custom_species =
                normalize_custom_species(updated.species, updated.custom_species);
            if dto.photo_uri.is_some() {
                updated.photo_uri = dto.photo_uri;
            }
            if dto.breed.is_some() {
                updated.breed = normalize_optional(dto.breed);
            }
            if dto.birth_date.is_some() {
                updated.birth_date = dto.birth_date;
            }
            if dto.weight_kg.is_some() {
                updated.weight_kg = dto.weight_kg;
            }

            validate_pet_basics(
                &updated.name,
                Some(updated.species),
                updated.custom_species.as_deref(),
            )
            .map_err(StoreError::Validation)?;
            validate_weight(updated.weight_kg).map_err(StoreError::Validation)?;

            *pet = updated.clone();
            Ok::<_, StoreError>(updated)
        })?;

        log::info!("ペットを更新しました: id={}", pet.id);
        self.persist().await;
        Ok(pet)
    }

    /// ペットを削除する
    ///
    /// 配下のケア項目・リマインダーもすべて削除する。紐づくカレンダーイベントの削除は
    /// ローカルの削除後に行い、失敗してもログに記録するだけにとどめる。
    pub async fn delete_pet(&self, id: PetId) -> Result<DeletedPet, StoreError> {
        self.hydrate().await;
        let removed = self
            .with_records(|records| records.remove_pet(id))
            .ok_or(StoreError::PetNotFound(id))?;
        self.persist().await;

        log::info!(
            "ペットを削除しました: id={id}, care_items={}, reminders={}",
            removed.care_items.len(),
            removed.reminders.len()
        );

        for event_id in removed.linked_event_ids() {
            self.delete_calendar_event(&event_id).await;
        }

        Ok(DeletedPet {
            pet_id: id,
            care_items_removed: removed.care_items.len(),
            reminders_removed: removed.reminders.len(),
        })
    }

    // ---- ケア項目 ----

    /// ケア項目を作成する
    ///
    /// # 引数
    /// * `dto` - 作成内容
    /// * `sync_calendar` - trueの場合、作成後にカレンダーへ反映する（失敗しても作成は成功）
    pub async fn create_care_item(
        &self,
        dto: CreateCareItemDto,
        sync_calendar: bool,
    ) -> Result<CareItem, StoreError> {
        self.hydrate().await;
        validate_title(&dto.title).map_err(StoreError::Validation)?;

        let now = self.clock.now();
        let (item, pet_name) = self.with_records(|records| {
            let pet_name = records
                .pet_name(dto.pet_id)
                .ok_or(StoreError::PetNotFound(dto.pet_id))?;
            self.check_quota(ResourceKind::CareItem, records.care_items.len())?;

            let item = CareItem {
                id: CareItemId::generate(),
                pet_id: dto.pet_id,
                title: dto.title.trim().to_string(),
                care_type: dto.care_type,
                due_date: dto.due_date,
                notes: normalize_optional(dto.notes),
                calendar_event_id: None,
                created_at: now,
            };
            records.care_items.push(item.clone());
            Ok::<_, StoreError>((item, pet_name))
        })?;

        log::info!("ケア項目を作成しました: id={}, pet_id={}", item.id, item.pet_id);
        self.persist().await;

        if !sync_calendar {
            return Ok(item);
        }

        match self.calendar.mirror_care_item(&item, Some(&pet_name)).await {
            Ok(event_id) => Ok(self
                .link_care_item(item.id, Some(event_id))
                .await
                .unwrap_or(item)),
            Err(e) => {
                log::warn!("ケア項目のカレンダー反映に失敗しました: id={}, error={e}", item.id);
                Ok(item)
            }
        }
    }

    /// ケア項目を更新する
    ///
    /// カレンダーに反映済みの場合は、古いイベントを削除して作り直す。
    /// 作り直しに失敗した場合はリンクを外す。
    pub async fn update_care_item(
        &self,
        id: CareItemId,
        dto: UpdateCareItemDto,
    ) -> Result<CareItem, StoreError> {
        self.hydrate().await;
        if let Some(title) = &dto.title {
            validate_title(title).map_err(StoreError::Validation)?;
        }

        let (item, pet_name) = self.with_records(|records| {
            let pet_name = records
                .care_items
                .iter()
                .find(|c| c.id == id)
                .and_then(|c| records.pet_name(c.pet_id));
            let item = records
                .care_item_mut(id)
                .ok_or(StoreError::CareItemNotFound(id))?;

            if let Some(title) = dto.title {
                item.title = title.trim().to_string();
            }
            if let Some(care_type) = dto.care_type {
                item.care_type = care_type;
            }
            if let Some(due_date) = dto.due_date {
                item.due_date = due_date;
            }
            if dto.notes.is_some() {
                item.notes = normalize_optional(dto.notes);
            }
            Ok::<_, StoreError>((item.clone(), pet_name))
        })?;

        log::info!("ケア項目を更新しました: id={id}");
        self.persist().await;

        let Some(old_event_id) = item.calendar_event_id.clone() else {
            return Ok(item);
        };

        let event = build_care_item_event(&item, pet_name.as_deref(), self.calendar.attribution());
        let new_event_id = match self.calendar.update_event(Some(&old_event_id), &event).await {
            Ok(event_id) => Some(event_id),
            Err(e) => {
                log::warn!("ケア項目のカレンダー再反映に失敗しました: id={id}, error={e}");
                None
            }
        };
        Ok(self.link_care_item(id, new_event_id).await.unwrap_or(item))
    }

    /// ケア項目を削除する（ペットには影響しない）
    pub async fn delete_care_item(&self, id: CareItemId) -> Result<CareItem, StoreError> {
        self.hydrate().await;
        let item = self.with_records(|records| {
            let index = records
                .care_items
                .iter()
                .position(|c| c.id == id)
                .ok_or(StoreError::CareItemNotFound(id))?;
            Ok::<_, StoreError>(records.care_items.remove(index))
        })?;

        log::info!("ケア項目を削除しました: id={id}");
        self.persist().await;

        if let Some(event_id) = &item.calendar_event_id {
            self.delete_calendar_event(event_id).await;
        }
        Ok(item)
    }

    /// ケア項目をカレンダーに反映する
    ///
    /// 既に反映済みの場合はイベントを置き換える。失敗した場合はリンクを外す。
    pub async fn mirror_care_item(&self, id: CareItemId) -> Result<CalendarEventId, StoreError> {
        self.hydrate().await;
        let (item, pet_name) = self.with_records(|records| {
            let item = records
                .care_items
                .iter()
                .find(|c| c.id == id)
                .cloned()
                .ok_or(StoreError::CareItemNotFound(id))?;
            let pet_name = records.pet_name(item.pet_id);
            Ok::<_, StoreError>((item, pet_name))
        })?;

        let event = build_care_item_event(&item, pet_name.as_deref(), self.calendar.attribution());
        let result = self
            .calendar
            .update_event(item.calendar_event_id.as_ref(), &event)
            .await;
        self.link_care_item(id, result.as_ref().ok().cloned()).await;
        Ok(result?)
    }

    /// ケア項目とカレンダーイベントのリンクを外し、イベントを削除する
    pub async fn unlink_care_item_calendar(
        &self,
        id: CareItemId,
    ) -> Result<Option<CalendarEventId>, StoreError> {
        self.hydrate().await;
        let old_event_id = self.with_records(|records| {
            let item = records
                .care_item_mut(id)
                .ok_or(StoreError::CareItemNotFound(id))?;
            Ok::<_, StoreError>(item.calendar_event_id.take())
        })?;

        if let Some(event_id) = &old_event_id {
            self.persist().await;
            self.delete_calendar_event(event_id).await;
        }
        Ok(old_event_id)
    }

    async fn link_care_item(
        &self,
        id: CareItemId,
        event_id: Option<CalendarEventId>,
    ) -> Option<CareItem> {
        let item = self.with_records(|records| {
            let item = records.care_item_mut(id)?;
            item.calendar_event_id = event_id;
            Some(item.clone())
        })?;
        self.persist().await;
        Some(item)
    }

    // ---- リマインダー ----

    /// リマインダーを作成する
    ///
    /// # 引数
    /// * `dto` - 作成内容
    /// * `sync_calendar` - trueの場合、作成後にカレンダーへ反映する（失敗しても作成は成功）
    pub async fn create_reminder(
        &self,
        dto: CreateReminderDto,
        sync_calendar: bool,
    ) -> Result<Reminder, StoreError> {
        self.hydrate().await;
        validate_title(&dto.title).map_err(StoreError::Validation)?;

        let now = self.clock.now();
        let (reminder, pet_name) = self.with_records(|records| {
            let pet_name = records
                .pet_name(dto.pet_id)
                .ok_or(StoreError::PetNotFound(dto.pet_id))?;
            self.check_quota(ResourceKind::Reminder, records.reminders.len())?;

            let reminder = Reminder {
                id: ReminderId::generate(),
                pet_id: dto.pet_id,
                title: dto.title.trim().to_string(),
                date_time: dto.date_time,
                repeat_type: dto.repeat_type,
                is_enabled: true,
                notes: normalize_optional(dto.notes),
                calendar_event_id: None,
                created_at: now,
            };
            records.reminders.push(reminder.clone());
            Ok::<_, StoreError>((reminder, pet_name))
        })?;

        log::info!(
            "リマインダーを作成しました: id={}, pet_id={}",
            reminder.id,
            reminder.pet_id
        );
        self.persist().await;

        if !sync_calendar {
            return Ok(reminder);
        }

        match self.calendar.mirror_reminder(&reminder, Some(&pet_name)).await {
            Ok(event_id) => Ok(self
                .link_reminder(reminder.id, Some(event_id))
                .await
                .unwrap_or(reminder)),
            Err(e) => {
                log::warn!(
                    "リマインダーのカレンダー反映に失敗しました: id={}, error={e}",
                    reminder.id
                );
                Ok(reminder)
            }
        }
    }

    /// リマインダーを更新する
    ///
    /// カレンダーに反映済みの場合は、古いイベントを削除して作り直す。
    /// 作り直しに失敗した場合はリンクを外す。
    pub async fn update_reminder(
        &self,
        id: ReminderId,
        dto: UpdateReminderDto,
    ) -> Result<Reminder, StoreError> {
        self.hydrate().await;
        if let Some(title) = &dto.title {
            validate_title(title).map_err(StoreError::Validation)?;
        }

        let (reminder, pet_name) = self.with_records(|records| {
            let pet_name = records
                .reminders
                .iter()
                .find(|r| r.id == id)
                .and_then(|r| records.pet_name(r.pet_id));
            let reminder = records
                .reminder_mut(id)
                .ok_or(StoreError::ReminderNotFound(id))?;

            if let Some(title) = dto.title {
                reminder.title = title.trim().to_string();
            }
            if let Some(date_time) = dto.date_time {
                reminder.date_time = date_time;
            }
            if let Some(repeat_type) = dto.repeat_type {
                reminder.repeat_type = repeat_type;
            }
            if dto.notes.is_some() {
                reminder.notes = normalize_optional(dto.notes);
            }
            Ok::<_, StoreError>((reminder.clone(), pet_name))
        })?;

        log::info!("リマインダーを更新しました: id={id}");
        self.persist().await;

        let Some(old_event_id) = reminder.calendar_event_id.clone() else {
            return Ok(reminder);
        };

        let event =
            build_reminder_event(&reminder, pet_name.as_deref(), self.calendar.attribution());
        let new_event_id = match self.calendar.update_event(Some(&old_event_id), &event).await {
            Ok(event_id) => Some(event_id),
            Err(e) => {
                log::warn!("リマインダーのカレンダー再反映に失敗しました: id={id}, error={e}");
                None
            }
        };
        Ok(self.link_reminder(id, new_event_id).await.unwrap_or(reminder))
    }

    /// リマインダーの有効・無効を切り替える
    ///
    /// 日時・繰り返し・カレンダーのリンクは変更しない。
    pub async fn toggle_reminder_enabled(&self, id: ReminderId) -> Result<Reminder, StoreError> {
        self.hydrate().await;
        let reminder = self.with_records(|records| {
            let reminder = records
                .reminder_mut(id)
                .ok_or(StoreError::ReminderNotFound(id))?;
            reminder.is_enabled = !reminder.is_enabled;
            Ok::<_, StoreError>(reminder.clone())
        })?;

        log::info!(
            "リマインダーを切り替えました: id={id}, enabled={}",
            reminder.is_enabled
        );
        self.persist().await;
        Ok(reminder)
    }

    /// リマインダーを削除する（ペットには影響しない）
    pub async fn delete_reminder(&self, id: ReminderId) -> Result<Reminder, StoreError> {
        self.hydrate().await;
        let reminder = self.with_records(|records| {
            let index = records
                .reminders
                .iter()
                .position(|r| r.id == id)
                .ok_or(StoreError::ReminderNotFound(id))?;
            Ok::<_, StoreError>(records.reminders.remove(index))
        })?;

        log::info!("リマインダーを削除しました: id={id}");
        self.persist().await;

        if let Some(event_id) = &reminder.calendar_event_id {
            self.delete_calendar_event(event_id).await;
        }
        Ok(reminder)
    }

    /// リマインダーをカレンダーに反映する
    ///
    /// 既に反映済みの場合はイベントを置き換える。失敗した場合はリンクを外す。
    pub async fn mirror_reminder(&self, id: ReminderId) -> Result<CalendarEventId, StoreError> {
        self.hydrate().await;
        let (reminder, pet_name) = self.with_records(|records| {
            let reminder = records
                .reminders
                .iter()
                .find(|r| r.id == id)
                .cloned()
                .ok_or(StoreError::ReminderNotFound(id))?;
            let pet_name = records.pet_name(reminder.pet_id);
            Ok::<_, StoreError>((reminder, pet_name))
        })?;

        let event =
            build_reminder_event(&reminder, pet_name.as_deref(), self.calendar.attribution());
        let result = self
            .calendar
            .update_event(reminder.calendar_event_id.as_ref(), &event)
            .await;
        self.link_reminder(id, result.as_ref().ok().cloned()).await;
        Ok(result?)
    }

    /// リマインダーとカレンダーイベントのリンクを外し、イベントを削除する
    pub async fn unlink_reminder_calendar(
        &self,
        id: ReminderId,
    ) -> Result<Option<CalendarEventId>, StoreError> {
        self.hydrate().await;
        let old_event_id = self.with_records(|records| {
            let reminder = records
                .reminder_mut(id)
                .ok_or(StoreError::ReminderNotFound(id))?;
            Ok::<_, StoreError>(reminder.calendar_event_id.take())
        })?;

        if let Some(event_id) = &old_event_id {
            self.persist().await;
            self.delete_calendar_event(event_id).await;
        }
        Ok(old_event_id)
    }

    async fn link_reminder(
        &self,
        id: ReminderId,
        event_id: Option<CalendarEventId>,
    ) -> Option<Reminder> {
        let reminder = self.with_records(|records| {
            let reminder = records.reminder_mut(id)?;
            reminder.calendar_event_id = event_id;
            Some(reminder.clone())
        })?;
        self.persist().await;
        Some(reminder)
    }

    async fn delete_calendar_event(&self, event_id: &CalendarEventId) {
        if let Err(e) = self.calendar.delete_event(event_id).await {
            log::warn!("カレンダーイベントの削除に失敗しました: event_id={event_id}, error={e}");
        }
    }

    // ---- 参照 ----

    /// 現在のレコード一式のコピー
    pub fn snapshot(&self) -> PetRecords {
        self.with_records(|records| records.clone())
    }

    pub fn pets(&self) -> Vec<Pet> {
        self.with_records(|records| records.pets.clone())
    }

    pub fn pet(&self, id: PetId) -> Option<Pet> {
        self.with_records(|records| records.pet(id).cloned())
    }

    pub fn care_items(&self) -> Vec<CareItem> {
        self.with_records(|records| records.care_items.clone())
    }

    pub fn reminders(&self) -> Vec<Reminder> {
        self.with_records(|records| records.reminders.clone())
    }

    pub fn care_items_for_pet(&self, pet_id: PetId) -> Vec<CareItem> {
        self.with_records(|records| {
            records
                .care_items
                .iter()
                .filter(|c| c.pet_id == pet_id)
                .cloned()
                .collect()
        })
    }

    pub fn reminders_for_pet(&self, pet_id: PetId) -> Vec<Reminder> {
        self.with_records(|records| {
            records
                .reminders
                .iter()
                .filter(|r| r.pet_id == pet_id)
                .cloned()
                .collect()
        })
    }

    pub fn pet_count(&self) -> usize {
        self.with_records(|records| records.pets.len())
    }

    pub fn care_item_count(&self) -> usize {
        self.with_records(|records| records.care_items.len())
    }

    pub fn reminder_count(&self) -> usize {
        self.with_records(|records| records.reminders.len())
    }

    /// ペットごとの次の予定
    pub fn next_due_per_pet(&self) -> Vec<DueItem> {
        let now = self.clock.now();
        self.with_records(|records| queries::next_due_per_pet(records, now))
    }

    /// N日以内に期限を迎える項目
    pub fn due_within(&self, days: i64) -> Vec<DueItem> {
        let now = self.clock.now();
        self.with_records(|records| queries::due_within(records, now, days))
    }

    /// 期限切れのケア項目
    pub fn overdue(&self) -> Vec<CareItem> {
        let now = self.clock.now();
        self.with_records(|records| {
            queries::overdue(records, now)
                .into_iter()
                .cloned()
                .collect()
        })
    }

    /// 今日のリマインダー
    pub fn reminders_today(&self, tz: Tz) -> Vec<Reminder> {
        let now = self.clock.now();
        self.with_records(|records| {
            queries::reminders_today(records, now, tz)
                .into_iter()
                .cloned()
                .collect()
        })
    }
}

fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_custom_species(species: Species, custom_species: Option<String>) -> Option<String> {
    match species {
        Species::Other => normalize_optional(custom_species),
        Species::Dog | Species::Cat => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::calendar::models::PermissionStatus;
    use crate::features::pets::models::{CareType, RepeatType};
    use crate::shared::clock::FixedClock;
    use crate::shared::storage::MemoryKeyValueStore;
    use crate::testing::{CalendarCall, FakeCalendarProvider, FakeQuotaGate};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    type TestRepository = PetRepository<MemoryKeyValueStore, FakeQuotaGate, FakeCalendarProvider>;

    struct Fixture {
        repository: TestRepository,
        storage: Arc<MemoryKeyValueStore>,
        quota: Arc<FakeQuotaGate>,
        calendar: Arc<FakeCalendarProvider>,
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 10, 0, 0).unwrap()
    }

    fn fixture_with(quota: FakeQuotaGate) -> Fixture {
        let storage = Arc::new(MemoryKeyValueStore::new());
        let quota = Arc::new(quota);
        let calendar = Arc::new(FakeCalendarProvider::new());
        let mirror = Arc::new(CalendarMirror::new(calendar.clone(), "Criado pelo PetCare"));
        let repository = PetRepository::new(
            storage.clone(),
            quota.clone(),
            mirror,
            Arc::new(FixedClock::new(now())),
        );
        Fixture {
            repository,
            storage,
            quota,
            calendar,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeQuotaGate::premium())
    }

    fn pet_dto(name: &str) -> CreatePetDto {
        CreatePetDto {
            name: name.to_string(),
            species: Species::Dog,
            custom_species: None,
            photo_uri: None,
            breed: None,
            birth_date: None,
            weight_kg: None,
        }
    }

    fn care_dto(pet_id: PetId, title: &str) -> CreateCareItemDto {
        CreateCareItemDto {
            pet_id,
            title: title.to_string(),
            care_type: CareType::Vaccine,
            due_date: now() + Duration::days(10),
            notes: None,
        }
    }

    fn reminder_dto(pet_id: PetId, repeat_type: RepeatType) -> CreateReminderDto {
        CreateReminderDto {
            pet_id,
            title: "Remédio".to_string(),
            date_time: now() + Duration::hours(2),
            repeat_type,
            notes: Some("1 comprimido".to_string()),
        }
    }

    #[tokio::test]
    async fn test_free_tier_pet_quota() {
        let f = fixture_with(FakeQuotaGate::free());
        f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        f.repository.create_pet(pet_dto("Mia")).await.unwrap();

        let result = f.repository.create_pet(pet_dto("Bob")).await;
        assert_eq!(result, Err(StoreError::QuotaExceeded(ResourceKind::Pet)));
        assert_eq!(f.repository.pet_count(), 2);

        f.quota.set_premium(true);
        assert!(f.repository.create_pet(pet_dto("Bob")).await.is_ok());
    }

    #[tokio::test]
    async fn test_care_item_quota_is_global_across_pets() {
        let f = fixture_with(FakeQuotaGate::free());
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        let mia = f.repository.create_pet(pet_dto("Mia")).await.unwrap();

        f.repository
            .create_care_item(care_dto(thor.id, "V10"), false)
            .await
            .unwrap();
        let result = f
            .repository
            .create_care_item(care_dto(mia.id, "Antirrábica"), false)
            .await;
        assert_eq!(result, Err(StoreError::QuotaExceeded(ResourceKind::CareItem)));
    }

    #[tokio::test]
    async fn test_create_pet_validates_input() {
        let f = fixture();
        let mut dto = pet_dto("  ");
        assert!(matches!(
            f.repository.create_pet(dto.clone()).await,
            Err(StoreError::Validation(_))
        ));

        dto.name = "Kiwi".to_string();
        dto.species = Species::Other;
        assert!(matches!(
            f.repository.create_pet(dto.clone()).await,
            Err(StoreError::Validation(_))
        ));

        dto.custom_species = Some(" calopsita ".to_string());
        let pet = f.repository.create_pet(dto).await.unwrap();
        assert_eq!(pet.custom_species.as_deref(), Some("calopsita"));
    }

    #[tokio::test]
    async fn test_dependents_require_existing_pet() {
        let f = fixture();
        let missing = PetId::generate();

        let result = f
            .repository
            .create_care_item(care_dto(missing, "V10"), false)
            .await;
        assert_eq!(result, Err(StoreError::PetNotFound(missing)));

        let result = f
            .repository
            .create_reminder(reminder_dto(missing, RepeatType::None), false)
            .await;
        assert_eq!(result, Err(StoreError::PetNotFound(missing)));
        assert_eq!(f.repository.care_item_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_pet_cascades_and_cleans_calendar() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        let mia = f.repository.create_pet(pet_dto("Mia")).await.unwrap();

        f.repository
            .create_care_item(care_dto(thor.id, "V10"), true)
            .await
            .unwrap();
        let reminder = f
            .repository
            .create_reminder(reminder_dto(thor.id, RepeatType::Weekly), true)
            .await
            .unwrap();
        let kept = f
            .repository
            .create_care_item(care_dto(mia.id, "Banho"), false)
            .await
            .unwrap();

        let deleted = f.repository.delete_pet(thor.id).await.unwrap();
        assert_eq!(deleted.care_items_removed, 1);
        assert_eq!(deleted.reminders_removed, 1);
        assert_eq!(f.repository.care_items(), vec![kept]);
        assert!(f.repository.reminders().is_empty());
        assert!(f.repository.pet(mia.id).is_some());

        let deleted_ids = f.calendar.deleted_event_ids();
        assert_eq!(deleted_ids.len(), 2);
        assert!(deleted_ids.contains(&reminder.calendar_event_id.unwrap()));
    }

    #[tokio::test]
    async fn test_delete_pet_survives_calendar_failure() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        f.repository
            .create_reminder(reminder_dto(thor.id, RepeatType::Daily), true)
            .await
            .unwrap();

        f.calendar.set_fail_deletes(true);
        let deleted = f.repository.delete_pet(thor.id).await.unwrap();

        assert_eq!(deleted.reminders_removed, 1);
        assert_eq!(f.repository.pet_count(), 0);
    }

    #[tokio::test]
    async fn test_deleting_dependents_keeps_pet() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        let item = f
            .repository
            .create_care_item(care_dto(thor.id, "V10"), false)
            .await
            .unwrap();
        let reminder = f
            .repository
            .create_reminder(reminder_dto(thor.id, RepeatType::None), false)
            .await
            .unwrap();

        f.repository.delete_care_item(item.id).await.unwrap();
        f.repository.delete_reminder(reminder.id).await.unwrap();

        assert!(f.repository.pet(thor.id).is_some());
        assert_eq!(
            f.repository.delete_care_item(item.id).await,
            Err(StoreError::CareItemNotFound(item.id))
        );
    }

    #[tokio::test]
    async fn test_weekly_reminder_mirror_and_delete() {
        let f = fixture();
        let mia = f.repository.create_pet(pet_dto("Mia")).await.unwrap();
        let reminder = f
            .repository
            .create_reminder(reminder_dto(mia.id, RepeatType::Weekly), true)
            .await
            .unwrap();

        let event_id = reminder.calendar_event_id.clone().unwrap();
        let created = f.calendar.created_events();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].title, "Remédio - Mia");
        assert_eq!(created[0].notes, "1 comprimido\n\nCriado pelo PetCare");

        f.repository.delete_reminder(reminder.id).await.unwrap();
        assert!(f.calendar.calls().contains(&CalendarCall::Delete {
            event_id,
            future_instances_only: true
        }));
    }

    #[tokio::test]
    async fn test_mirror_failure_leaves_record_unlinked() {
        let f = fixture();
        f.calendar
            .set_permission(PermissionStatus::Denied, PermissionStatus::Denied);
        let mia = f.repository.create_pet(pet_dto("Mia")).await.unwrap();

        let reminder = f
            .repository
            .create_reminder(reminder_dto(mia.id, RepeatType::None), true)
            .await
            .unwrap();
        assert_eq!(reminder.calendar_event_id, None);
        assert_eq!(f.repository.reminder_count(), 1);

        let result = f.repository.mirror_reminder(reminder.id).await;
        assert!(matches!(result, Err(StoreError::Calendar(_))));
    }

    #[tokio::test]
    async fn test_toggle_reminder_keeps_schedule_and_link() {
        let f = fixture();
        let mia = f.repository.create_pet(pet_dto("Mia")).await.unwrap();
        let reminder = f
            .repository
            .create_reminder(reminder_dto(mia.id, RepeatType::Monthly), true)
            .await
            .unwrap();

        let toggled = f
            .repository
            .toggle_reminder_enabled(reminder.id)
            .await
            .unwrap();
        assert!(!toggled.is_enabled);
        assert_eq!(toggled.date_time, reminder.date_time);
        assert_eq!(toggled.repeat_type, reminder.repeat_type);
        assert_eq!(toggled.calendar_event_id, reminder.calendar_event_id);
        assert!(f.repository.due_within(7).is_empty());
    }

    #[tokio::test]
    async fn test_update_linked_care_item_remirrors() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        let item = f
            .repository
            .create_care_item(care_dto(thor.id, "V10"), true)
            .await
            .unwrap();
        let old_event_id = item.calendar_event_id.clone().unwrap();

        let updated = f
            .repository
            .update_care_item(
                item.id,
                UpdateCareItemDto {
                    title: Some("V10 reforço".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let new_event_id = updated.calendar_event_id.unwrap();
        assert_ne!(new_event_id, old_event_id);
        assert!(f.calendar.deleted_event_ids().contains(&old_event_id));
        assert_eq!(
            f.calendar.created_events().last().unwrap().title,
            "V10 reforço - Thor"
        );

        f.calendar.set_fail_creates(true);
        let updated = f
            .repository
            .update_care_item(
                item.id,
                UpdateCareItemDto {
                    due_date: Some(now() + Duration::days(30)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.calendar_event_id, None);
    }

    #[tokio::test]
    async fn test_unlink_reminder_calendar() {
        let f = fixture();
        let mia = f.repository.create_pet(pet_dto("Mia")).await.unwrap();
        let reminder = f
            .repository
            .create_reminder(reminder_dto(mia.id, RepeatType::None), true)
            .await
            .unwrap();

        let unlinked = f
            .repository
            .unlink_reminder_calendar(reminder.id)
            .await
            .unwrap();
        assert_eq!(unlinked, reminder.calendar_event_id);
        assert_eq!(f.repository.reminders()[0].calendar_event_id, None);
        assert_eq!(
            f.repository
                .unlink_reminder_calendar(reminder.id)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_update_pet_validates_merged_values() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();

        let result = f
            .repository
            .update_pet(
                thor.id,
                UpdatePetDto {
                    species: Some(Species::Other),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        assert_eq!(f.repository.pet(thor.id).unwrap().species, Species::Dog);

        let updated = f
            .repository
            .update_pet(
                thor.id,
                UpdatePetDto {
                    weight_kg: Some(12.5),
                    breed: Some("SRD".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.weight_kg, Some(12.5));
        assert_eq!(updated.breed.as_deref(), Some("SRD"));
    }

    #[tokio::test]
    async fn test_records_persist_and_hydrate() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        f.repository
            .create_care_item(care_dto(thor.id, "V10"), false)
            .await
            .unwrap();
        assert!(f.storage.peek(RECORDS_KEY).is_some());

        let reloaded = PetRepository::new(
            f.storage.clone(),
            Arc::new(FakeQuotaGate::free()),
            Arc::new(CalendarMirror::new(
                Arc::new(FakeCalendarProvider::new()),
                "Criado pelo PetCare",
            )),
            Arc::new(FixedClock::new(now())),
        );
        reloaded.hydrate().await;

        assert_eq!(reloaded.snapshot(), f.repository.snapshot());
    }

    fn reopen(storage: Arc<MemoryKeyValueStore>) -> TestRepository {
        PetRepository::new(
            storage,
            Arc::new(FakeQuotaGate::premium()),
            Arc::new(CalendarMirror::new(
                Arc::new(FakeCalendarProvider::new()),
                "Criado pelo PetCare",
            )),
            Arc::new(FixedClock::new(now())),
        )
    }

    #[tokio::test]
    async fn test_mutation_before_hydrate_keeps_saved_records() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();

        let reopened = reopen(f.storage.clone());
        let mia = reopened.create_pet(pet_dto("Mia")).await.unwrap();

        assert_eq!(reopened.pet_count(), 2);
        let restarted = reopen(f.storage.clone());
        restarted.hydrate().await;
        assert!(restarted.pet(thor.id).is_some());
        assert!(restarted.pet(mia.id).is_some());
    }

    #[tokio::test]
    async fn test_hydrate_runs_once() {
        let f = fixture();
        f.repository.hydrate().await;
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();

        f.repository.hydrate().await;

        assert_eq!(f.repository.pets(), vec![thor]);
    }

    #[tokio::test]
    async fn test_read_failure_never_overwrites_saved_records() {
        let f = fixture();
        f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        let saved = f.storage.peek(RECORDS_KEY);

        let reopened = reopen(f.storage.clone());
        f.storage.set_fail_reads(true);
        let mia = reopened.create_pet(pet_dto("Mia")).await.unwrap();

        assert_eq!(reopened.pets(), vec![mia]);
        assert_eq!(f.storage.peek(RECORDS_KEY), saved);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_memory_state() {
        let f = fixture();
        f.storage.set_fail_writes(true);

        let pet = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        assert_eq!(f.repository.pet(pet.id), Some(pet));
        assert!(f.storage.peek(RECORDS_KEY).is_none());
    }

    #[tokio::test]
    async fn test_hydrate_tolerates_corrupt_data() {
        let f = fixture();
        f.storage.set(RECORDS_KEY, "{not json").await.unwrap();
        f.repository.hydrate().await;
        assert_eq!(f.repository.snapshot(), PetRecords::default());
    }

    #[tokio::test]
    async fn test_overdue_uses_clock() {
        let f = fixture();
        let thor = f.repository.create_pet(pet_dto("Thor")).await.unwrap();
        let mut dto = care_dto(thor.id, "Vermífugo");
        dto.due_date = now() - Duration::days(2);
        f.repository.create_care_item(dto, false).await.unwrap();

        let overdue = f.repository.overdue();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].title, "Vermífugo");
        assert_eq!(f.repository.next_due_per_pet().len(), 1);
    }
}
