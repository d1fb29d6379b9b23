use super::models::{
    CareSeed, CommitReport, OnboardingDraft, OnboardingError, OnboardingFlow, OnboardingStep,
    PetInfo, ReminderSeed, SeedOutcome,
};
use crate::features::calendar::provider::CalendarProvider;
use crate::features::pets::models::{
    validate_pet_basics, validate_title, validate_weight, CreateCareItemDto, CreatePetDto,
    CreateReminderDto, Species,
};
use crate::features::pets::repository::PetRepository;
use crate::features::premium::quota::QuotaGate;
use crate::shared::storage::KeyValueStore;

/// `back` の結果
#[derive(Debug)]
pub enum StepBack {
    /// 1つ前のステップに戻った
    Moved(OnboardingWizard),
    /// 最初のステップから戻ったため、フローを中断して入力内容を破棄した
    Aborted,
}

/// オンボーディングウィザード
///
/// ステップごとに入力を受け付け、確認ステップで確定するとペットと
/// ケア項目・リマインダーをまとめて作成する。
#[derive(Debug, Clone)]
pub struct OnboardingWizard {
    flow: OnboardingFlow,
    index: usize,
    draft: OnboardingDraft,
}

impl OnboardingWizard {
    pub fn new(flow: OnboardingFlow) -> Self {
        log::debug!("オンボーディングを開始しました: {flow:?}");
        Self {
            flow,
            index: 0,
            draft: OnboardingDraft::default(),
        }
    }

    pub fn flow(&self) -> OnboardingFlow {
        self.flow
    }

    pub fn steps(&self) -> &'static [OnboardingStep] {
        self.flow.steps()
    }

    pub fn current_step(&self) -> OnboardingStep {
        self.flow.steps()[self.index]
    }

    /// 進捗（1始まりの現在位置, 全ステップ数）
    pub fn progress(&self) -> (usize, usize) {
        (self.index + 1, self.flow.steps().len())
    }

    pub fn draft(&self) -> &OnboardingDraft {
        &self.draft
    }

    // ---- 入力 ----

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.draft.name = name.into();
    }

    pub fn set_species(&mut self, species: Species) {
        self.draft.species = Some(species);
        if species != Species::Other {
            self.draft.custom_species = None;
        }
    }

    pub fn set_custom_species(&mut self, custom_species: impl Into<String>) {
        self.draft.custom_species = Some(custom_species.into());
    }

    pub fn set_photo_uri(&mut self, photo_uri: impl Into<String>) {
        self.draft.photo_uri = Some(photo_uri.into());
    }

    pub fn clear_photo(&mut self) {
        self.draft.photo_uri = None;
    }

    pub fn set_info(&mut self, info: PetInfo) {
        self.draft.info = info;
    }

    /// ケア項目の元データを追加する（careステップを含むフローのみ）
    pub fn add_care_seed(&mut self, seed: CareSeed) -> Result<(), OnboardingError> {
        self.require_care_step()?;
        validate_title(&seed.title).map_err(OnboardingError::Validation)?;
        self.draft.care_seeds.push(seed);
        Ok(())
    }

    /// リマインダーの元データを追加する（careステップを含むフローのみ）
    pub fn add_reminder_seed(&mut self, seed: ReminderSeed) -> Result<(), OnboardingError> {
        self.require_care_step()?;
        validate_title(&seed.title).map_err(OnboardingError::Validation)?;
        self.draft.reminder_seeds.push(seed);
        Ok(())
    }

    pub fn remove_care_seed(&mut self, index: usize) -> Option<CareSeed> {
        (index < self.draft.care_seeds.len()).then(|| self.draft.care_seeds.remove(index))
    }

    pub fn remove_reminder_seed(&mut self, index: usize) -> Option<ReminderSeed> {
        (index < self.draft.reminder_seeds.len()).then(|| self.draft.reminder_seeds.remove(index))
    }

    fn require_care_step(&self) -> Result<(), OnboardingError> {
        if self.flow.includes(OnboardingStep::Care) {
            Ok(())
        } else {
            Err(OnboardingError::StepNotInFlow(OnboardingStep::Care))
        }
    }

    // ---- 遷移 ----

    /// ステップの必須項目を検証する
    pub fn validate_step(&self, step: OnboardingStep) -> Result<(), OnboardingError> {
        let result = match step {
            OnboardingStep::Basics => validate_pet_basics(
                &self.draft.name,
                self.draft.species,
                self.draft.custom_species.as_deref(),
            ),
            OnboardingStep::Photo => Ok(()),
            OnboardingStep::Info => validate_weight(self.draft.info.weight_kg),
            OnboardingStep::Care => self
                .draft
                .care_seeds
                .iter()
                .map(|s| s.title.as_str())
                .chain(self.draft.reminder_seeds.iter().map(|s| s.title.as_str()))
                .try_for_each(validate_title),
            OnboardingStep::Review => return self.validate_all(),
        };
        result.map_err(OnboardingError::Validation)
    }

    fn validate_all(&self) -> Result<(), OnboardingError> {
        self.flow
            .steps()
            .iter()
            .filter(|step| **step != OnboardingStep::Review)
            .try_for_each(|step| self.validate_step(*step))
    }

    /// 現在のステップを検証して次へ進む
    pub fn next(&mut self) -> Result<OnboardingStep, OnboardingError> {
        let current = self.current_step();
        if current == OnboardingStep::Review {
            return Err(OnboardingError::WrongStep { current });
        }
        self.validate_step(current)?;

        self.index += 1;
        Ok(self.current_step())
    }

    /// 写真を設定せずにphotoステップを抜ける
    pub fn skip_photo(&mut self) -> Result<OnboardingStep, OnboardingError> {
        let current = self.current_step();
        if current != OnboardingStep::Photo {
            return Err(OnboardingError::WrongStep { current });
        }
        self.draft.photo_uri = None;
        self.next()
    }

    /// 1つ前のステップに戻る
    ///
    /// 最初のステップから戻るとフローを中断し、入力内容は破棄される。
    pub fn back(mut self) -> StepBack {
        if self.index == 0 {
            log::debug!("オンボーディングを中断しました: {:?}", self.flow);
            return StepBack::Aborted;
        }
        self.index -= 1;
        StepBack::Moved(self)
    }

    /// 入力内容を確定してストアに書き込む
    ///
    /// 検証に通らない場合は何も書き込まない。ペットの作成後に元データの作成が
    /// 失敗しても、ペットは取り消さずに失敗を個別に報告する。
    pub async fn commit<K, G, C>(
        self,
        repository: &PetRepository<K, G, C>,
    ) -> Result<CommitReport, OnboardingError>
    where
        K: KeyValueStore,
        G: QuotaGate,
        C: CalendarProvider,
    {
        if self.current_step() != OnboardingStep::Review {
            return Err(OnboardingError::NotAtReview);
        }
        self.validate_all()?;

        let draft = self.draft;
        let Some(species) = draft.species else {
            return Err(OnboardingError::Validation(
                "動物の種類を選択してください".to_string(),
            ));
        };

        let pet = repository
            .create_pet(CreatePetDto {
                name: draft.name,
                species,
                custom_species: draft.custom_species,
                photo_uri: draft.photo_uri,
                breed: draft.info.breed,
                birth_date: draft.info.birth_date,
                weight_kg: draft.info.weight_kg,
            })
            .await?;

        let mut care_items = Vec::new();
        let mut reminders = Vec::new();

        if self.flow.includes(OnboardingStep::Care) {
            for seed in draft.care_seeds {
                let title = seed.title.clone();
                let result = repository
                    .create_care_item(
                        CreateCareItemDto {
                            pet_id: pet.id,
                            title: seed.title,
                            care_type: seed.care_type,
                            due_date: seed.due_date,
                            notes: seed.notes,
                        },
                        seed.sync_to_calendar,
                    )
                    .await;
                if let Err(e) = &result {
                    log::warn!("ケア項目の初期登録に失敗しました: {title}: {e}");
                }
                care_items.push(SeedOutcome { title, result });
            }

            for seed in draft.reminder_seeds {
                let title = seed.title.clone();
                let result = repository
                    .create_reminder(
                        CreateReminderDto {
                            pet_id: pet.id,
                            title: seed.title,
                            date_time: seed.date_time,
                            repeat_type: seed.repeat_type,
                            notes: seed.notes,
                        },
                        seed.sync_to_calendar,
                    )
                    .await;
                if let Err(e) = &result {
                    log::warn!("リマインダーの初期登録に失敗しました: {title}: {e}");
                }
                reminders.push(SeedOutcome { title, result });
            }
        }

        log::info!(
            "オンボーディングを完了しました: pet_id={}, care_items={}, reminders={}",
            pet.id,
            care_items.len(),
            reminders.len()
        );

        Ok(CommitReport {
            pet,
            care_items,
            reminders,
        })
    }
}
