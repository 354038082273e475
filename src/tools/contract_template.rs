//! Standard contract clause lookup tool.
//!
//! Serves boilerplate clauses from the standard housing lease
//! agreement by keyword match. Deterministic and offline; gives the
//! search team a second tool so the planner has a real mix to choose
//! from.

use async_trait::async_trait;
use serde::Serialize;

use super::{Tool, ToolOutput};
use crate::error::EngineError;

/// Registry name of this tool.
pub const CONTRACT_TEMPLATE_TOOL: &str = "contract_template";

/// One standard clause.
#[derive(Debug, Clone, Serialize)]
struct Clause {
    /// Clause identifier within the standard form.
    clause_id: &'static str,
    /// Clause heading.
    title: &'static str,
    /// Clause body.
    content: &'static str,
    /// Keywords this clause answers to.
    #[serde(skip)]
    keywords: &'static [&'static str],
}

/// Clauses from the standard housing lease agreement form
/// (주택임대차표준계약서).
const CLAUSES: &[Clause] = &[
    Clause {
        clause_id: "제1조",
        title: "보증금과 차임",
        content: "임대인과 임차인은 임대주택의 보증금과 차임을 아래와 같이 정한다. \
                  보증금은 계약금, 중도금, 잔금으로 나누어 지급할 수 있다.",
        keywords: &["보증금", "차임", "월세", "계약금", "잔금"],
    },
    Clause {
        clause_id: "제4조",
        title: "계약의 해제",
        content: "임차인이 임대인에게 중도금(중도금이 없을 때는 잔금)을 지급하기 전까지, \
                  임대인은 계약금의 배액을 상환하고, 임차인은 계약금을 포기하고 \
                  이 계약을 해제할 수 있다.",
        keywords: &["해제", "해지", "계약금", "배액"],
    },
    Clause {
        clause_id: "제6조",
        title: "채무불이행과 손해배상",
        content: "당사자 일방이 채무를 이행하지 아니하는 때에는 상대방은 상당한 기간을 \
                  정하여 그 이행을 최고하고 계약을 해제할 수 있으며, 그로 인한 \
                  손해배상을 청구할 수 있다.",
        keywords: &["채무불이행", "손해배상", "최고"],
    },
    Clause {
        clause_id: "제7조",
        title: "계약의 갱신",
        content: "임차인은 임대차기간이 끝나기 6개월 전부터 2개월 전까지의 기간에 \
                  계약갱신을 요구할 수 있다. 임대인은 정당한 사유 없이 거절하지 못한다.",
        keywords: &["갱신", "갱신요구", "연장", "재계약"],
    },
    Clause {
        clause_id: "특약",
        title: "특약사항",
        content: "주택의 수리 및 비용부담, 임대차 등기, 전입신고와 확정일자 등 \
                  당사자 간 합의한 특약사항을 기재한다.",
        keywords: &["특약", "수리", "확정일자", "전입신고"],
    },
];

/// Standard clause lookup by keyword.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractTemplateTool;

impl ContractTemplateTool {
    /// Creates the tool.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Tool for ContractTemplateTool {
    fn name(&self) -> &'static str {
        CONTRACT_TEMPLATE_TOOL
    }

    fn description(&self) -> &'static str {
        "표준 임대차계약서 조항 조회: 질의 키워드와 맞는 표준계약서 조항을 반환합니다. \
         파라미터: 없음"
    }

    async fn execute(
        &self,
        query: &str,
        _params: &serde_json::Value,
    ) -> Result<ToolOutput, EngineError> {
        let matched: Vec<serde_json::Value> = CLAUSES
            .iter()
            .filter(|clause| clause.keywords.iter().any(|k| query.contains(k)))
            .map(|clause| serde_json::to_value(clause).unwrap_or(serde_json::Value::Null))
            .collect();

        Ok(ToolOutput::success(
            CONTRACT_TEMPLATE_TOOL,
            matched,
            "template",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keyword_match() {
        let tool = ContractTemplateTool::new();
        let output = tool
            .execute("계약 갱신요구권 행사 기간", &serde_json::Value::Null)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.count, 1);
        assert_eq!(output.data[0]["clause_id"], "제7조");
        assert_eq!(output.data_source, "template");
    }

    #[tokio::test]
    async fn test_no_match_is_success_with_zero() {
        let tool = ContractTemplateTool::new();
        let output = tool
            .execute("강남 아파트 시세", &serde_json::Value::Null)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.count, 0);
    }

    #[tokio::test]
    async fn test_multiple_matches() {
        let tool = ContractTemplateTool::new();
        let output = tool
            .execute("보증금 반환과 계약 해제", &serde_json::Value::Null)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(output.count >= 2);
    }
}
