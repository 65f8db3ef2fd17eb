//! Testing utilities for the CRM dashboard workspace
//!
//! Shared test doubles, fixtures, and a ready-wired mutator harness.

#![allow(missing_docs)]

use async_trait::async_trait;
use crm_sync::types::{decode_field, encode_field};
use crm_sync::{
    ApiError, DataAccess, Entity, EntityId, FieldChanges, FieldError, InMemoryDataAccess,
    Notification, NotificationSink, Notifier, OptimisticMutator, RenderSurface, Severity,
    ViewPatch,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    Todo,
    Doing,
    Done,
}

/// Minimal board entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: EntityId,
    pub title: String,
    pub status: CardStatus,
    #[serde(default)]
    pub points: u32,
}

impl Entity for Card {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn field(&self, name: &str) -> Option<Value> {
        match name {
            "title" => encode_field(&self.title),
            "status" => encode_field(&self.status),
            "points" => encode_field(&self.points),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: Value) -> Result<(), FieldError> {
        match name {
            "id" => return Err(FieldError::ReadOnly(name.to_string())),
            "title" => {
                let title: String = decode_field(name, value)?;
                if title.trim().is_empty() {
                    return Err(FieldError::InvalidValue {
                        field: name.to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }
                self.title = title;
            }
            "status" => self.status = decode_field(name, value)?,
            "points" => self.points = decode_field(name, value)?,
            _ => return Err(FieldError::UnknownField(name.to_string())),
        }
        Ok(())
    }
}

pub fn card(id: &str, status: CardStatus, points: u32) -> Card {
    Card {
        id: EntityId::from(id),
        title: format!("Card {id}"),
        status,
        points,
    }
}

pub fn changes<const N: usize>(pairs: [(&str, Value); N]) -> FieldChanges {
    pairs
        .into_iter()
        .map(|(field, value)| (field.to_string(), value))
        .collect()
}

/// Notification sink that remembers everything it was shown
#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<Notification>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().clone()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.shown.lock().iter().filter(|n| n.severity == severity).count()
    }

    pub fn clear(&self) {
        self.shown.lock().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn show(&self, notification: &Notification) {
        self.shown.lock().push(notification.clone());
    }
}

/// Rendering surface that remembers every patch
#[derive(Debug, Default)]
pub struct RecordingSurface {
    patches: Mutex<Vec<ViewPatch>>,
}

impl RecordingSurface {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn patches(&self) -> Vec<ViewPatch> {
        self.patches.lock().clone()
    }

    pub fn clear(&self) {
        self.patches.lock().clear();
    }
}

impl RenderSurface for RecordingSurface {
    fn apply(&self, patch: &ViewPatch) {
        self.patches.lock().push(patch.clone());
    }
}

/// Data-access that parks every call until the test releases it
#[derive(Debug)]
pub struct GatedApi<E> {
    inner: Arc<InMemoryDataAccess<E>>,
    gate: Semaphore,
    parked: AtomicUsize,
}

impl<E> GatedApi<E>
where
    E: Entity + Serialize + for<'de> Deserialize<'de>,
{
    pub fn new(inner: Arc<InMemoryDataAccess<E>>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gate: Semaphore::new(0),
            parked: AtomicUsize::new(0),
        })
    }

    pub fn inner(&self) -> &InMemoryDataAccess<E> {
        &self.inner
    }

    /// Let `n` parked (or future) calls through
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Calls currently waiting at the gate
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::Acquire)
    }

    /// Yield until at least `n` calls are waiting at the gate
    pub async fn wait_parked(&self, n: usize) {
        while self.parked() < n {
            tokio::task::yield_now().await;
        }
    }

    async fn pass(&self) {
        self.parked.fetch_add(1, Ordering::AcqRel);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.parked.fetch_sub(1, Ordering::AcqRel);
    }
}

#[async_trait]
impl<E> DataAccess<E> for GatedApi<E>
where
    E: Entity + Serialize + for<'de> Deserialize<'de>,
{
    async fn list(&self) -> Result<Vec<E>, ApiError> {
        self.pass().await;
        self.inner.list().await
    }

    async fn create(&self, fields: FieldChanges) -> Result<E, ApiError> {
        self.pass().await;
        self.inner.create(fields).await
    }

    async fn update(&self, id: &EntityId, changes: &FieldChanges) -> Result<Option<E>, ApiError> {
        self.pass().await;
        self.inner.update(id, changes).await
    }

    async fn delete(&self, id: &EntityId) -> Result<(), ApiError> {
        self.pass().await;
        self.inner.delete(id).await
    }
}

/// Mutator over cards, wired to recording doubles
pub struct Harness {
    pub api: Arc<InMemoryDataAccess<Card>>,
    pub sink: Arc<RecordingSink>,
    pub surface: Arc<RecordingSurface>,
    pub mutator: OptimisticMutator<Card>,
}

impl Harness {
    /// Remote and local both hold `cards`
    pub fn new(cards: Vec<Card>) -> Self {
        let api = Arc::new(InMemoryDataAccess::with_entities(cards.clone()));
        let sink = RecordingSink::new();
        let surface = RecordingSurface::new();
        let mutator = OptimisticMutator::new(api.clone(), surface.clone(), Notifier::new(sink.clone()))
            .with_label("Card")
            .with_entities(cards);
        Self {
            api,
            sink,
            surface,
            mutator,
        }
    }

    pub fn local(&self, id: &str) -> Option<Card> {
        self.mutator.get(&EntityId::from(id))
    }

    pub fn remote(&self, id: &str) -> Option<Card> {
        self.api.get(&EntityId::from(id))
    }
}
