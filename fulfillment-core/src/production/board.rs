//! 生产看板与 QC 状态机
//!
//! # 工序
//!
//! ```text
//! queued(0) → engraving(1) → polishing(2) → qc(3) → packed(4)
//!                  ▲              ▲            │
//!                  └──── rework ──┴────────────┘  (仅 QC 不合格后)
//! ```
//!
//! # QC
//!
//! | 当前 | 操作 | 结果 |
//! |------|------|------|
//! | pending | pass | complete，卡片 → packed |
//! | pending | fail | failed，追加 issue，旗标 `QC再検` |
//! | failed | pass | complete，卡片 → packed |
//! | failed | rework | complete，卡片退回路线工序，旗标 `再作業` |
//! | complete | * | `QcInvalidAction` |
//!
//! 每次变更在时间线头部插入一条事件，并写审计日志。

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;

use shared::models::{
    CardFlag, CardPriority, Metadata, ProductionCard, QcAttachment, QcChecklistItem,
    QcInspection, QcIssue, QcStatus, Stage, TimelineEvent, Tone,
};

use super::catalog::{QC_REASONS, QcReason, REWORK_ROUTES, ReworkRoute, find_reason, find_route};
use super::error::{BoardError, BoardResult};
use crate::audit::{AuditAction, AuditLogRecord, AuditLogService, NoopAuditLog, push_change};
use crate::core::Clock;
use crate::db::{PassThroughUnitOfWork, ProductionCardRepo, UnitOfWork, run_in_tx};

pub const DEFAULT_OPERATOR: &str = "工房オペレーター";
pub const DEFAULT_QC_OPERATOR: &str = "QCオペレーター";
pub const FLAG_QC_RECHECK: &str = "QC再検";
pub const FLAG_REWORK: &str = "再作業";
const ATTACHMENT_LABEL: &str = "参考画像";

// ============================================================================
// Inputs / read models
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AdmitCardInput {
    /// Defaults to the order id
    pub card_id: Option<String>,
    pub order_id: String,
    pub order_number: String,
    pub queue_id: String,
    pub priority: CardPriority,
    pub due_at: Option<DateTime<Utc>>,
    pub workstation: Option<String>,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppendEventInput {
    pub stage: String,
    pub note: String,
    pub actor: Option<String>,
    pub station: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct QcDecisionInput {
    /// `pass` | `fail`
    pub outcome: String,
    pub reason_code: Option<String>,
    pub note: String,
    /// 换行分隔的图片 URL
    pub attachments: String,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReworkInput {
    pub route_id: String,
    pub note: String,
    pub actor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardLane {
    pub stage: Stage,
    pub label: &'static str,
    pub cards: Vec<ProductionCard>,
}

// ============================================================================
// Service
// ============================================================================

pub struct ProductionBoardService {
    cards: Arc<dyn ProductionCardRepo>,
    uow: Arc<dyn UnitOfWork>,
    audit: Arc<dyn AuditLogService>,
    clock: Arc<dyn Clock>,
}

impl ProductionBoardService {
    pub fn new(cards: Arc<dyn ProductionCardRepo>, clock: Arc<dyn Clock>) -> Self {
        Self {
            cards,
            uow: Arc::new(PassThroughUnitOfWork),
            audit: Arc::new(NoopAuditLog),
            clock,
        }
    }

    pub fn with_unit_of_work(mut self, uow: Arc<dyn UnitOfWork>) -> Self {
        self.uow = uow;
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditLogService>) -> Self {
        self.audit = audit;
        self
    }

    pub fn qc_reasons(&self) -> &'static [QcReason] {
        &QC_REASONS
    }

    pub fn rework_routes(&self) -> &'static [ReworkRoute] {
        &REWORK_ROUTES
    }

    /// 按工序分道，每道内排序：加急 → 交期早 → 订单号
    pub async fn board(&self, queue_id: Option<&str>) -> BoardResult<Vec<BoardLane>> {
        let queue_id = queue_id.map(str::trim).filter(|q| !q.is_empty());
        let cards = self.cards.list_by_queue(queue_id).await?;

        let mut lanes: Vec<BoardLane> = Stage::ALL
            .iter()
            .map(|stage| BoardLane {
                stage: *stage,
                label: stage.label(),
                cards: Vec::new(),
            })
            .collect();
        for card in cards {
            lanes[card.stage.weight() as usize].cards.push(card);
        }
        for lane in &mut lanes {
            lane.cards.sort_by(compare_cards);
        }
        Ok(lanes)
    }

    pub async fn card(&self, id: &str) -> BoardResult<ProductionCard> {
        let id = id.trim();
        self.cards
            .find_by_id(id)
            .await?
            .ok_or_else(|| BoardError::CardNotFound(id.to_string()))
    }

    pub async fn admit_card(&self, input: AdmitCardInput) -> BoardResult<ProductionCard> {
        let order_id = input.order_id.trim().to_string();
        if order_id.is_empty() {
            return Err(BoardError::InvalidInput("order id is required".into()));
        }
        let queue_id = input.queue_id.trim().to_string();
        if queue_id.is_empty() {
            return Err(BoardError::InvalidInput("queue id is required".into()));
        }
        let card_id = shared::util::non_blank(input.card_id.as_deref()).unwrap_or(order_id.clone());
        let actor = actor_or(input.actor.as_deref(), DEFAULT_OPERATOR);
        let now = self.clock.now();
        let workstation = shared::util::non_blank(input.workstation.as_deref())
            .unwrap_or_else(|| Stage::Queued.as_str().to_uppercase());

        let event = TimelineEvent {
            id: event_id(&card_id, now),
            stage: Stage::Queued,
            event_type: "production.admitted".into(),
            description: format!("{} へ投入", Stage::Queued.label()),
            actor: actor.clone(),
            station: workstation.clone(),
            occurred_at: now,
            note: String::new(),
            tone: Some(Tone::Info),
        };
        let card = ProductionCard {
            id: card_id,
            order_id,
            order_number: input.order_number.trim().to_string(),
            stage: Stage::Queued,
            priority: input.priority,
            queue_id,
            workstation,
            flags: Vec::new(),
            due_at: input.due_at,
            notes: Vec::new(),
            blocked: false,
            blocked_reason: None,
            last_event: Some(event.clone()),
            timeline: vec![event],
            inspection: None,
            created_at: now,
            updated_at: now,
        };
        self.cards.insert(&card).await?;

        let mut metadata = card_metadata(&card);
        metadata.insert("queueId".into(), json!(card.queue_id));
        self.record_audit(&actor, AuditAction::ProductionCardAdmit, &card, metadata, Default::default())
            .await;
        Ok(card)
    }

    /// 移动卡片到指定工序（不允许回退）
    pub async fn append_event(
        &self,
        card_id: &str,
        input: AppendEventInput,
    ) -> BoardResult<ProductionCard> {
        let stage = Stage::parse(&input.stage)
            .ok_or_else(|| BoardError::InvalidStage(input.stage.trim().to_string()))?;
        let actor = actor_or(input.actor.as_deref(), DEFAULT_OPERATOR);

        let (before, card) = self
            .mutate(card_id, |card, now| {
                if stage.weight() < card.stage.weight() {
                    return Err(BoardError::StageRegression {
                        card: card.id.clone(),
                        from: card.stage.as_str().into(),
                        to: stage.as_str().into(),
                    });
                }
                let station = shared::util::non_blank(input.station.as_deref())
                    .unwrap_or_else(|| card.workstation.clone());
                let note = input.note.trim().to_string();
                let event = TimelineEvent {
                    id: event_id(&card.id, now),
                    stage,
                    event_type: format!("{}.progress", stage.as_str()),
                    description: format!("{} へ移動", stage.label()),
                    actor: actor.clone(),
                    station: station.clone(),
                    occurred_at: now,
                    note: note.clone(),
                    tone: None,
                };
                card.stage = stage;
                card.workstation = station;
                card.blocked = false;
                card.blocked_reason = None;
                card.push_note(&note);
                if stage == Stage::Qc && needs_new_inspection(card.inspection.as_ref()) {
                    card.inspection = Some(new_inspection(&card.id, now));
                }
                push_event(card, event);
                Ok(())
            })
            .await?;

        let mut diff = Default::default();
        push_change(&mut diff, "stage", json!(before.stage), json!(card.stage));
        push_change(&mut diff, "workstation", json!(before.workstation), json!(card.workstation));
        self.record_audit(&actor, AuditAction::ProductionCardEvent, &card, card_metadata(&card), diff)
            .await;
        Ok(card)
    }

    pub async fn record_qc_decision(
        &self,
        card_id: &str,
        input: QcDecisionInput,
    ) -> BoardResult<ProductionCard> {
        let outcome = input.outcome.trim().to_lowercase();
        match outcome.as_str() {
            "pass" => self.qc_pass(card_id, input).await,
            "fail" => self.qc_fail(card_id, input).await,
            other => Err(BoardError::QcInvalidAction(format!("unknown outcome {}", other))),
        }
    }

    async fn qc_pass(&self, card_id: &str, input: QcDecisionInput) -> BoardResult<ProductionCard> {
        let actor = actor_or(input.actor.as_deref(), DEFAULT_QC_OPERATOR);
        let (before, card) = self
            .mutate(card_id, |card, now| {
                let inspection = inspection_mut(card)?;
                if inspection.status == QcStatus::Complete {
                    return Err(BoardError::QcInvalidAction("inspection already complete".into()));
                }
                let note = input.note.trim().to_string();
                inspection.status = QcStatus::Complete;
                for item in &mut inspection.checklist {
                    item.passed = Some(true);
                }
                prepend_note(inspection, &note);
                inspection.attachments.extend(parse_attachments(&input.attachments));

                let event = TimelineEvent {
                    id: event_id(&card.id, now),
                    stage: Stage::Packed,
                    event_type: "qc.pass".into(),
                    description: "検品合格".into(),
                    actor: actor.clone(),
                    station: card.workstation.clone(),
                    occurred_at: now,
                    note: note.clone(),
                    tone: Some(Tone::Success),
                };
                card.stage = Stage::Packed;
                card.blocked = false;
                card.blocked_reason = None;
                card.remove_flag(FLAG_QC_RECHECK);
                card.push_note(&note);
                push_event(card, event);
                Ok(())
            })
            .await?;

        let diff = qc_diff(&before, &card);
        self.record_audit(&actor, AuditAction::ProductionCardQcPass, &card, card_metadata(&card), diff)
            .await;
        Ok(card)
    }

    async fn qc_fail(&self, card_id: &str, input: QcDecisionInput) -> BoardResult<ProductionCard> {
        let actor = actor_or(input.actor.as_deref(), DEFAULT_QC_OPERATOR);
        let reason_code = input.reason_code.as_deref().unwrap_or_default().trim().to_string();

        let (before, card) = self
            .mutate(card_id, |card, now| {
                let card_ref = card.id.clone();
                let inspection = inspection_mut(card)?;
                match inspection.status {
                    QcStatus::Complete => {
                        return Err(BoardError::QcInvalidAction("inspection already complete".into()));
                    }
                    QcStatus::Failed => {
                        return Err(BoardError::QcInvalidAction("inspection already failed".into()));
                    }
                    QcStatus::Pending => {}
                }
                if reason_code.is_empty() {
                    return Err(BoardError::QcInvalidAction("reason code is required".into()));
                }
                let reason = find_reason(&reason_code).ok_or_else(|| {
                    BoardError::QcInvalidAction(format!("unknown reason {}", reason_code))
                })?;

                let note = input.note.trim().to_string();
                let summary = if note.is_empty() {
                    reason.label.to_string()
                } else {
                    format!("{} / {}", reason.label, note)
                };
                inspection.status = QcStatus::Failed;
                inspection.issues.push(QcIssue {
                    id: format!("qci-{}-{}", card_ref, inspection.issues.len() + 1),
                    reason_code: reason.code.into(),
                    summary: summary.clone(),
                    actor: actor.clone(),
                    recorded_at: now,
                });
                prepend_note(inspection, &note);
                inspection.attachments.extend(parse_attachments(&input.attachments));

                let event = TimelineEvent {
                    id: event_id(&card.id, now),
                    stage: card.stage,
                    event_type: "qc.fail".into(),
                    description: summary,
                    actor: actor.clone(),
                    station: card.workstation.clone(),
                    occurred_at: now,
                    note: note.clone(),
                    tone: Some(Tone::Danger),
                };
                card.add_flag(CardFlag {
                    label: FLAG_QC_RECHECK.into(),
                    tone: Tone::Warning,
                    icon: "🧪".into(),
                });
                card.push_note(&note);
                push_event(card, event);
                Ok(())
            })
            .await?;

        let diff = qc_diff(&before, &card);
        let mut metadata = card_metadata(&card);
        metadata.insert("reasonCode".into(), json!(reason_code));
        self.record_audit(&actor, AuditAction::ProductionCardQcFail, &card, metadata, diff)
            .await;
        Ok(card)
    }

    /// QC 不合格后按路线退回工序
    pub async fn trigger_rework(
        &self,
        card_id: &str,
        input: ReworkInput,
    ) -> BoardResult<ProductionCard> {
        let actor = actor_or(input.actor.as_deref(), DEFAULT_QC_OPERATOR);
        let route_id = input.route_id.trim().to_string();

        let (before, card) = self
            .mutate(card_id, |card, now| {
                let inspection = inspection_mut(card)?;
                if inspection.status != QcStatus::Failed {
                    return Err(BoardError::QcInvalidAction(
                        "rework requires a failed inspection".into(),
                    ));
                }
                let route = find_route(&route_id).ok_or_else(|| {
                    BoardError::QcInvalidAction(format!("unknown rework route {}", route_id))
                })?;
                let note = input.note.trim().to_string();
                inspection.status = QcStatus::Complete;
                prepend_note(inspection, &note);

                let workstation = format!("{}-RET", route.stage.as_str()).to_uppercase();
                let event = TimelineEvent {
                    id: event_id(&card.id, now),
                    stage: route.stage,
                    event_type: "qc.rework".into(),
                    description: format!("再作業: {}", route.label),
                    actor: actor.clone(),
                    station: workstation.clone(),
                    occurred_at: now,
                    note: note.clone(),
                    tone: Some(Tone::Warning),
                };
                card.stage = route.stage;
                card.workstation = workstation;
                card.blocked = false;
                card.blocked_reason = None;
                card.add_flag(CardFlag {
                    label: FLAG_REWORK.into(),
                    tone: Tone::Danger,
                    icon: "♻".into(),
                });
                card.push_note(&note);
                push_event(card, event);
                Ok(())
            })
            .await?;

        let mut diff = qc_diff(&before, &card);
        push_change(&mut diff, "workstation", json!(before.workstation), json!(card.workstation));
        let mut metadata = card_metadata(&card);
        metadata.insert("routeId".into(), json!(route_id));
        self.record_audit(&actor, AuditAction::ProductionCardQcRework, &card, metadata, diff)
            .await;
        Ok(card)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// 在事务中加载 → 修改 → 乐观锁写回，返回 (修改前, 修改后)
    async fn mutate<F>(
        &self,
        card_id: &str,
        apply: F,
    ) -> BoardResult<(ProductionCard, ProductionCard)>
    where
        F: FnOnce(&mut ProductionCard, DateTime<Utc>) -> BoardResult<()> + Send,
    {
        let card_id = card_id.trim().to_string();
        if card_id.is_empty() {
            return Err(BoardError::CardNotFound(card_id));
        }
        run_in_tx(self.uow.as_ref(), || async {
            let before = self
                .cards
                .find_by_id(&card_id)
                .await?
                .ok_or_else(|| BoardError::CardNotFound(card_id.clone()))?;
            let now = self.clock.now();
            let mut card = before.clone();
            apply(&mut card, now)?;
            card.updated_at = now;
            self.cards.update(&card, before.updated_at).await?;
            Ok((before, card))
        })
        .await
    }

    async fn record_audit(
        &self,
        actor: &str,
        action: AuditAction,
        card: &ProductionCard,
        metadata: Metadata,
        diff: crate::audit::AuditDiff,
    ) {
        let record = AuditLogRecord::staff(
            actor,
            action,
            format!("/production-cards/{}", card.id),
            self.clock.now(),
        )
        .with_metadata(metadata)
        .with_diff(diff);
        self.audit.record(record).await;
    }
}

fn compare_cards(a: &ProductionCard, b: &ProductionCard) -> Ordering {
    let rush = |c: &ProductionCard| c.priority != CardPriority::Rush;
    rush(a)
        .cmp(&rush(b))
        .then_with(|| match (a.due_at, b.due_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.order_number.cmp(&b.order_number))
}

fn event_id(card_id: &str, at: DateTime<Utc>) -> String {
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp_micros().saturating_mul(1000));
    format!("evt-{}-{}", card_id, nanos)
}

fn push_event(card: &mut ProductionCard, event: TimelineEvent) {
    card.last_event = Some(event.clone());
    card.timeline.insert(0, event);
}

fn prepend_note(inspection: &mut QcInspection, note: &str) {
    if !note.is_empty() {
        inspection.notes.insert(0, note.to_string());
    }
}

fn inspection_mut(card: &mut ProductionCard) -> BoardResult<&mut QcInspection> {
    let id = card.id.clone();
    card.inspection
        .as_mut()
        .ok_or(BoardError::QcItemNotFound(id))
}

fn needs_new_inspection(inspection: Option<&QcInspection>) -> bool {
    inspection.is_none_or(|i| i.status == QcStatus::Complete)
}

fn new_inspection(card_id: &str, now: DateTime<Utc>) -> QcInspection {
    let checklist = [
        ("chk-engraving", "刻印内容"),
        ("chk-finish", "仕上げ"),
        ("chk-accessories", "付属品"),
    ]
    .into_iter()
    .map(|(id, label)| QcChecklistItem {
        id: id.into(),
        label: label.into(),
        passed: None,
    })
    .collect();
    QcInspection {
        id: format!("qc-{}", card_id),
        status: QcStatus::Pending,
        checklist,
        issues: Vec::new(),
        attachments: Vec::new(),
        notes: Vec::new(),
        received_at: now,
    }
}

fn parse_attachments(raw: &str) -> Vec<QcAttachment> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|url| QcAttachment {
            label: ATTACHMENT_LABEL.into(),
            kind: "photo".into(),
            url: url.into(),
        })
        .collect()
}

fn actor_or(actor: Option<&str>, fallback: &str) -> String {
    shared::util::non_blank(actor).unwrap_or_else(|| fallback.to_string())
}

fn card_metadata(card: &ProductionCard) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert("cardId".into(), json!(card.id));
    metadata.insert("orderId".into(), json!(card.order_id));
    metadata.insert("stage".into(), json!(card.stage.as_str()));
    metadata
}

fn qc_diff(before: &ProductionCard, after: &ProductionCard) -> crate::audit::AuditDiff {
    let status = |c: &ProductionCard| c.inspection.as_ref().map(|i| i.status);
    let mut diff = Default::default();
    push_change(&mut diff, "stage", json!(before.stage), json!(after.stage));
    push_change(&mut diff, "qcStatus", json!(status(before)), json!(status(after)));
    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::db::MemoryStore;
    use crate::testing::{FixedClock, sample_card};
    use chrono::Duration;

    struct Fixture {
        store: MemoryStore,
        clock: Arc<FixedClock>,
        audit: Arc<MemoryAuditLog>,
        service: ProductionBoardService,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::at_rfc3339("2025-05-01T09:00:00Z"));
        let store = MemoryStore::with_clock(clock.clone());
        let audit = Arc::new(MemoryAuditLog::new());
        let service = ProductionBoardService::new(Arc::new(store.production_cards()), clock.clone())
            .with_unit_of_work(Arc::new(store.unit_of_work()))
            .with_audit(audit.clone());
        Fixture {
            store,
            clock,
            audit,
            service,
        }
    }

    async fn qc_card(f: &Fixture, id: &str) -> ProductionCard {
        let mut card = sample_card(id, "pqu_a", Stage::Qc);
        card.inspection = Some(new_inspection(id, f.clock.now()));
        f.store.production_cards().insert(&card).await.unwrap();
        card
    }

    #[tokio::test]
    async fn test_append_event_moves_card() {
        let f = fixture();
        let mut card = sample_card("card-1", "pqu_a", Stage::Engraving);
        card.blocked = true;
        card.blocked_reason = Some("laser down".into());
        card.workstation = "LASER-1".into();
        f.store.production_cards().insert(&card).await.unwrap();

        let moved = f
            .service
            .append_event(
                "card-1",
                AppendEventInput {
                    stage: "polishing".into(),
                    note: "刻印完了".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(moved.stage, Stage::Polishing);
        assert!(!moved.blocked);
        assert_eq!(moved.blocked_reason, None);
        assert_eq!(moved.workstation, "LASER-1");
        assert_eq!(moved.notes, vec!["刻印完了"]);
        let event = moved.last_event.clone().unwrap();
        assert_eq!(event.event_type, "polishing.progress");
        assert_eq!(event.description, "研磨 へ移動");
        assert_eq!(event.actor, DEFAULT_OPERATOR);
        assert_eq!(moved.timeline[0], event);
        assert_eq!(f.audit.records()[0].action, AuditAction::ProductionCardEvent);
    }

    #[tokio::test]
    async fn test_append_event_rejects_regression_and_unknown_stage() {
        let f = fixture();
        f.store
            .production_cards()
            .insert(&sample_card("card-1", "pqu_a", Stage::Polishing))
            .await
            .unwrap();

        let err = f
            .service
            .append_event(
                "card-1",
                AppendEventInput {
                    stage: "engraving".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::StageRegression { .. }));

        let err = f
            .service
            .append_event(
                "card-1",
                AppendEventInput {
                    stage: "shipping".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err, BoardError::InvalidStage("shipping".into()));

        let err = f
            .service
            .append_event("missing", AppendEventInput {
                stage: "qc".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, BoardError::CardNotFound("missing".into()));
    }

    #[tokio::test]
    async fn test_moving_into_qc_opens_inspection() {
        let f = fixture();
        f.store
            .production_cards()
            .insert(&sample_card("card-1", "pqu_a", Stage::Polishing))
            .await
            .unwrap();
        let card = f
            .service
            .append_event("card-1", AppendEventInput {
                stage: "qc".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let inspection = card.inspection.unwrap();
        assert_eq!(inspection.status, QcStatus::Pending);
        assert_eq!(inspection.checklist.len(), 3);
    }

    #[tokio::test]
    async fn test_qc_pass_packs_card() {
        let f = fixture();
        let mut card = qc_card(&f, "card-1").await;
        card.add_flag(CardFlag {
            label: FLAG_QC_RECHECK.into(),
            tone: Tone::Warning,
            icon: "🧪".into(),
        });
        let stored = f.store.production_cards().find_by_id("card-1").await.unwrap().unwrap();
        card.updated_at = stored.updated_at;
        f.store.production_cards().update(&card, stored.updated_at).await.unwrap();

        let passed = f
            .service
            .record_qc_decision(
                "card-1",
                QcDecisionInput {
                    outcome: "PASS".into(),
                    note: "OK".into(),
                    attachments: "https://img/1.jpg\n\nhttps://img/2.jpg".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(passed.stage, Stage::Packed);
        assert!(!passed.has_flag(FLAG_QC_RECHECK));
        let inspection = passed.inspection.clone().unwrap();
        assert_eq!(inspection.status, QcStatus::Complete);
        assert_eq!(inspection.attachments.len(), 2);
        assert_eq!(inspection.attachments[0].label, "参考画像");
        assert!(inspection.checklist.iter().all(|c| c.passed == Some(true)));
        let event = passed.last_event.unwrap();
        assert_eq!(event.event_type, "qc.pass");
        assert_eq!(event.tone, Some(Tone::Success));
        assert_eq!(event.actor, DEFAULT_QC_OPERATOR);

        f.clock.advance(Duration::seconds(1));
        let err = f
            .service
            .record_qc_decision("card-1", QcDecisionInput {
                outcome: "fail".into(),
                reason_code: Some("finish_scratch".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::QcInvalidAction(_)));
    }

    #[tokio::test]
    async fn test_qc_fail_validation() {
        let f = fixture();
        qc_card(&f, "card-1").await;
        f.store
            .production_cards()
            .insert(&sample_card("card-2", "pqu_a", Stage::Engraving))
            .await
            .unwrap();

        for (reason, outcome) in [(None, "fail"), (Some("bad_glue"), "fail"), (None, "maybe")] {
            let err = f
                .service
                .record_qc_decision("card-1", QcDecisionInput {
                    outcome: outcome.into(),
                    reason_code: reason.map(String::from),
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert!(matches!(err, BoardError::QcInvalidAction(_)), "{err:?}");
        }

        let err = f
            .service
            .record_qc_decision("card-2", QcDecisionInput {
                outcome: "pass".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, BoardError::QcItemNotFound("card-2".into()));
    }

    #[tokio::test]
    async fn test_rework_requires_failed_inspection() {
        let f = fixture();
        qc_card(&f, "card-1").await;
        let err = f
            .service
            .trigger_rework("card-1", ReworkInput {
                route_id: "rework-engraving".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::QcInvalidAction(_)));
    }

    #[tokio::test]
    async fn test_board_lanes_sorted() {
        let f = fixture();
        let cards = f.store.production_cards();
        let base = f.clock.now();

        let mut late = sample_card("c-late", "pqu_a", Stage::Engraving);
        late.order_number = "HF-0003".into();
        late.due_at = Some(base + Duration::days(3));
        let mut early = sample_card("c-early", "pqu_a", Stage::Engraving);
        early.order_number = "HF-0002".into();
        early.due_at = Some(base + Duration::days(1));
        let mut rush = sample_card("c-rush", "pqu_a", Stage::Engraving);
        rush.order_number = "HF-0009".into();
        rush.priority = CardPriority::Rush;
        let mut undated = sample_card("c-undated", "pqu_a", Stage::Engraving);
        undated.order_number = "HF-0001".into();
        let other = sample_card("c-other", "pqu_b", Stage::Engraving);
        for card in [&late, &early, &rush, &undated, &other] {
            cards.insert(card).await.unwrap();
        }

        let lanes = f.service.board(Some("pqu_a")).await.unwrap();
        assert_eq!(lanes.len(), 5);
        let ids: Vec<&str> = lanes[1].cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c-rush", "c-early", "c-late", "c-undated"]);
        assert_eq!(lanes[1].label, "刻印");
        assert!(lanes[0].cards.is_empty());
    }

    #[tokio::test]
    async fn test_admit_card_defaults() {
        let f = fixture();
        let card = f
            .service
            .admit_card(AdmitCardInput {
                order_id: "ord_1".into(),
                order_number: "HF-20250501-0001".into(),
                queue_id: "pqu_a".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(card.id, "ord_1");
        assert_eq!(card.stage, Stage::Queued);
        assert_eq!(card.timeline.len(), 1);
        assert_eq!(f.service.card("ord_1").await.unwrap(), card);
        assert_eq!(f.audit.records()[0].action, AuditAction::ProductionCardAdmit);
    }

    #[test]
    fn test_catalogs_exposed() {
        let f = fixture();
        let codes: Vec<_> = f.service.qc_reasons().iter().map(|r| r.code).collect();
        assert_eq!(
            codes,
            ["engrave_mismatch", "finish_scratch", "stone_loose", "pack_issue"]
        );
        let routes = f.service.rework_routes();
        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].id, "rework-engraving");
        assert_eq!(routes[0].stage, Stage::Engraving);
        assert_eq!(routes[1].stage, Stage::Polishing);
    }
}
