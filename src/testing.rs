//! テスト用のフェイク実装

use crate::features::calendar::models::{
    CalendarError, CalendarEvent, CalendarEventId, DeviceCalendar, PermissionStatus,
};
use crate::features::calendar::provider::CalendarProvider;
use crate::features::premium::models::{CustomerInfo, Offerings, Package, ProviderError};
use crate::features::premium::provider::EntitlementProvider;
use crate::features::premium::quota::{can_add, QuotaGate, ResourceKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// 応答を差し替えられるエンタイトルメントプロバイダー
pub struct FakeEntitlementProvider {
    enabled: bool,
    entitlement: Mutex<Result<bool, ProviderError>>,
    offerings: Mutex<Result<Offerings, ProviderError>>,
    purchase_result: Mutex<Result<CustomerInfo, ProviderError>>,
    restore_result: Mutex<Result<CustomerInfo, ProviderError>>,
    has_entitlement_calls: AtomicUsize,
    purchase_calls: AtomicUsize,
}

impl FakeEntitlementProvider {
    pub fn enabled() -> Self {
        Self {
            enabled: true,
            entitlement: Mutex::new(Ok(false)),
            offerings: Mutex::new(Ok(Offerings::default())),
            purchase_result: Mutex::new(Ok(CustomerInfo::default())),
            restore_result: Mutex::new(Ok(CustomerInfo::default())),
            has_entitlement_calls: AtomicUsize::new(0),
            purchase_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_entitlement(&self, result: Result<bool, ProviderError>) {
        *self.entitlement.lock().unwrap() = result;
    }

    pub fn set_offerings(&self, result: Result<Offerings, ProviderError>) {
        *self.offerings.lock().unwrap() = result;
    }

    pub fn set_purchase_result(&self, result: Result<CustomerInfo, ProviderError>) {
        *self.purchase_result.lock().unwrap() = result;
    }

    pub fn set_restore_result(&self, result: Result<CustomerInfo, ProviderError>) {
        *self.restore_result.lock().unwrap() = result;
    }

    pub fn has_entitlement_calls(&self) -> usize {
        self.has_entitlement_calls.load(Ordering::SeqCst)
    }

    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }
}

impl EntitlementProvider for FakeEntitlementProvider {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn has_entitlement(&self, _entitlement_id: &str) -> Result<bool, ProviderError> {
        self.has_entitlement_calls.fetch_add(1, Ordering::SeqCst);
        self.entitlement.lock().unwrap().clone()
    }

    async fn get_offerings(&self) -> Result<Offerings, ProviderError> {
        self.offerings.lock().unwrap().clone()
    }

    async fn purchase_package(&self, _package: &Package) -> Result<CustomerInfo, ProviderError> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        self.purchase_result.lock().unwrap().clone()
    }

    async fn restore_purchases(&self) -> Result<CustomerInfo, ProviderError> {
        self.restore_result.lock().unwrap().clone()
    }
}

/// フェイクカレンダーへの書き込み操作の記録
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarCall {
    Create {
        calendar_id: String,
        event: CalendarEvent,
    },
    Delete {
        event_id: CalendarEventId,
        future_instances_only: bool,
    },
}

/// メモリ上で動作する端末カレンダー
pub struct FakeCalendarProvider {
    status: Mutex<PermissionStatus>,
    request_result: Mutex<PermissionStatus>,
    calendars: Mutex<Vec<DeviceCalendar>>,
    calls: Mutex<Vec<CalendarCall>>,
    fail_creates: AtomicBool,
    fail_deletes: AtomicBool,
    permission_requests: AtomicUsize,
    list_calls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeCalendarProvider {
    /// 権限許可済みで、書き込み可能なプライマリカレンダーを1つ持つ状態
    pub fn new() -> Self {
        Self {
            status: Mutex::new(PermissionStatus::Granted),
            request_result: Mutex::new(PermissionStatus::Granted),
            calendars: Mutex::new(vec![DeviceCalendar {
                id: "primary".to_string(),
                title: "Pessoal".to_string(),
                is_primary: true,
                allows_modifications: true,
            }]),
            calls: Mutex::new(Vec::new()),
            fail_creates: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            permission_requests: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            next_id: AtomicUsize::new(1),
        }
    }

    /// 現在の権限状態と、要求した場合の結果を設定する
    pub fn set_permission(&self, status: PermissionStatus, request_result: PermissionStatus) {
        *self.status.lock().unwrap() = status;
        *self.request_result.lock().unwrap() = request_result;
    }

    pub fn set_calendars(&self, calendars: Vec<DeviceCalendar>) {
        *self.calendars.lock().unwrap() = calendars;
    }

    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<CalendarCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn created_events(&self) -> Vec<CalendarEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CalendarCall::Create { event, .. } => Some(event),
                CalendarCall::Delete { .. } => None,
            })
            .collect()
    }

    pub fn deleted_event_ids(&self) -> Vec<CalendarEventId> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                CalendarCall::Delete { event_id, .. } => Some(event_id),
                CalendarCall::Create { .. } => None,
            })
            .collect()
    }

    pub fn permission_requests(&self) -> usize {
        self.permission_requests.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

impl CalendarProvider for FakeCalendarProvider {
    async fn permission_status(&self) -> Result<PermissionStatus, CalendarError> {
        Ok(*self.status.lock().unwrap())
    }

    async fn request_permission(&self) -> Result<PermissionStatus, CalendarError> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        let result = *self.request_result.lock().unwrap();
        *self.status.lock().unwrap() = result;
        Ok(result)
    }

    async fn list_calendars(&self) -> Result<Vec<DeviceCalendar>, CalendarError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.calendars.lock().unwrap().clone())
    }

    async fn create_event(
        &self,
        calendar_id: &str,
        event: &CalendarEvent,
    ) -> Result<CalendarEventId, CalendarError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(CalendarError::Provider("create failed".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(CalendarCall::Create {
            calendar_id: calendar_id.to_string(),
            event: event.clone(),
        });
        Ok(CalendarEventId::new(format!("event-{id}")))
    }

    async fn delete_event(
        &self,
        event_id: &CalendarEventId,
        future_instances_only: bool,
    ) -> Result<(), CalendarError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(CalendarError::Provider("delete failed".to_string()));
        }
        self.calls.lock().unwrap().push(CalendarCall::Delete {
            event_id: event_id.clone(),
            future_instances_only,
        });
        Ok(())
    }
}

/// プレミアム判定を固定できる上限チェック
pub struct FakeQuotaGate {
    premium: AtomicBool,
}

impl FakeQuotaGate {
    pub fn free() -> Self {
        Self {
            premium: AtomicBool::new(false),
        }
    }

    pub fn premium() -> Self {
        Self {
            premium: AtomicBool::new(true),
        }
    }

    pub fn set_premium(&self, premium: bool) {
        self.premium.store(premium, Ordering::SeqCst);
    }
}

impl QuotaGate for FakeQuotaGate {
    fn can_add_pet(&self, current_count: usize) -> bool {
        can_add(self.premium.load(Ordering::SeqCst), ResourceKind::Pet, current_count)
    }

    fn can_add_care_item(&self, current_count: usize) -> bool {
        can_add(
            self.premium.load(Ordering::SeqCst),
            ResourceKind::CareItem,
            current_count,
        )
    }

    fn can_add_reminder(&self, current_count: usize) -> bool {
        can_add(
            self.premium.load(Ordering::SeqCst),
            ResourceKind::Reminder,
            current_count,
        )
    }
}
