//! QC 不合格理由与再作业路线

use serde::Serialize;

use shared::models::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QcReason {
    pub code: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReworkRoute {
    pub id: &'static str,
    pub label: &'static str,
    pub stage: Stage,
}

pub const QC_REASONS: [QcReason; 4] = [
    QcReason {
        code: "engrave_mismatch",
        label: "刻印内容差異",
    },
    QcReason {
        code: "finish_scratch",
        label: "表面キズ",
    },
    QcReason {
        code: "stone_loose",
        label: "石のぐらつき",
    },
    QcReason {
        code: "pack_issue",
        label: "付属品不足",
    },
];

pub const REWORK_ROUTES: [ReworkRoute; 2] = [
    ReworkRoute {
        id: "rework-engraving",
        label: "刻印ラインに差し戻し",
        stage: Stage::Engraving,
    },
    ReworkRoute {
        id: "rework-polishing",
        label: "研磨ラインに差し戻し",
        stage: Stage::Polishing,
    },
];

pub fn find_reason(code: &str) -> Option<&'static QcReason> {
    let code = code.trim();
    QC_REASONS.iter().find(|r| r.code == code)
}

pub fn find_route(id: &str) -> Option<&'static ReworkRoute> {
    let id = id.trim();
    REWORK_ROUTES.iter().find(|r| r.id == id)
}
