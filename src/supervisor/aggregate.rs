//! Result aggregation.
//!
//! Merges team results into one view with per-team provenance
//! preserved, extracts citation sources from search records, and
//! builds the deterministic degraded summary used when LLM synthesis
//! fails.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::core::plan::TeamKind;
use crate::core::record::SearchRecord;
use crate::core::state::TeamResult;

/// Merged view over all team results for one turn.
#[derive(Debug, Clone, Default)]
pub struct AggregatedResults {
    /// Team results keyed by team, provenance intact.
    pub per_team: BTreeMap<TeamKind, TeamResult>,
    /// Search records parsed back out of collected tool data
    /// (error markers excluded).
    pub records: Vec<SearchRecord>,
    /// Deduplicated citation strings in first-seen order.
    pub sources: Vec<String>,
    /// Total records across all teams and tools.
    pub total_records: usize,
}

/// Builds the aggregate from recorded team results.
#[must_use]
pub fn aggregate(team_results: &BTreeMap<TeamKind, TeamResult>) -> AggregatedResults {
    let mut records: Vec<SearchRecord> = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut total_records = 0_usize;

    for result in team_results.values() {
        for tool_records in result.collected_data.values() {
            total_records += tool_records.len();
            for value in tool_records {
                if let Ok(record) = serde_json::from_value::<SearchRecord>(value.clone())
                    && !record.is_error()
                {
                    let citation = record.citation();
                    if !sources.contains(&citation) {
                        sources.push(citation);
                    }
                    records.push(record);
                }
            }
        }
    }

    AggregatedResults {
        per_team: team_results.clone(),
        records,
        sources,
        total_records,
    }
}

impl AggregatedResults {
    /// Collected data re-keyed by team name for the turn outcome.
    #[must_use]
    pub fn data_by_team(&self) -> BTreeMap<String, Vec<serde_json::Value>> {
        self.per_team
            .iter()
            .map(|(team, result)| {
                let flattened: Vec<serde_json::Value> = result
                    .collected_data
                    .values()
                    .flat_map(|records| records.iter().cloned())
                    .collect();
                (team.as_str().to_string(), flattened)
            })
            .collect()
    }
}

/// Deterministic answer assembled from aggregated results without
/// free-form prose. Used when LLM synthesis fails after successful
/// aggregation, and for turns that time out with partial results.
#[must_use]
pub fn degraded_summary(query: &str, aggregated: &AggregatedResults) -> String {
    let mut out = format!("'{query}'에 대해 수집된 자료를 요약해 드립니다.\n");

    if aggregated.records.is_empty() {
        out.push_str("관련 자료를 찾지 못했습니다. 질문을 바꾸어 다시 시도해 주세요.");
        return out;
    }

    for record in aggregated.records.iter().take(5) {
        let _ = write!(out, "\n- {}", record.citation());
        if let Some(ref title) = record.article_title {
            let _ = write!(out, " ({title})");
        }
        let snippet: String = record.content.chars().take(120).collect();
        let _ = write!(out, ": {snippet}");
        if record.content.chars().count() > 120 {
            out.push('…');
        }
    }

    let failed: Vec<&TeamKind> = aggregated
        .per_team
        .iter()
        .filter(|(_, r)| r.error.is_some())
        .map(|(team, _)| team)
        .collect();
    if !failed.is_empty() {
        let names: Vec<&str> = failed.iter().map(|t| t.as_str()).collect();
        let _ = write!(
            out,
            "\n\n일부 처리({})가 완료되지 못해 수집된 자료만 제공합니다.",
            names.join(", ")
        );
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::TeamStatus;
    use std::time::Duration;

    fn record_value(doc_id: &str, article: Option<&str>) -> serde_json::Value {
        serde_json::to_value(SearchRecord {
            doc_id: doc_id.to_string(),
            law_title: "주택임대차보호법".to_string(),
            article_number: article.map(String::from),
            article_title: None,
            content: "증액청구는 약정한 차임등의 20분의 1의 금액을 초과하지 못한다.".to_string(),
            category: "2_임대차_전세_월세".to_string(),
            doc_type: "법률".to_string(),
            relevance_score: 0.9,
            total_articles: None,
            enforcement_date: None,
            law_number: None,
            last_article: None,
        })
        .unwrap_or_default()
    }

    fn team_result(team: TeamKind, values: Vec<serde_json::Value>) -> TeamResult {
        let mut collected_data = BTreeMap::new();
        collected_data.insert("legal_search".to_string(), values);
        TeamResult {
            team,
            status: TeamStatus::Success,
            collected_data,
            summary: "ok".to_string(),
            error: None,
            duration: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_aggregate_extracts_records_and_sources() {
        let mut results = BTreeMap::new();
        results.insert(
            TeamKind::Search,
            team_result(
                TeamKind::Search,
                vec![
                    record_value("c1", Some("제7조")),
                    record_value("c2", Some("제7조")),
                    record_value("c3", Some("제3조")),
                ],
            ),
        );
        let agg = aggregate(&results);
        assert_eq!(agg.records.len(), 3);
        assert_eq!(agg.total_records, 3);
        // Duplicate citations collapse, order preserved.
        assert_eq!(
            agg.sources,
            vec!["주택임대차보호법 제7조", "주택임대차보호법 제3조"]
        );
    }

    #[test]
    fn test_aggregate_skips_error_markers_and_non_records() {
        let mut results = BTreeMap::new();
        let error = serde_json::to_value(SearchRecord::law_not_found("없는법", "q"))
            .unwrap_or_default();
        let non_record = serde_json::json!({"clause_id": "제1조", "title": "보증금"});
        results.insert(
            TeamKind::Search,
            team_result(TeamKind::Search, vec![error, non_record]),
        );
        let agg = aggregate(&results);
        assert!(agg.records.is_empty());
        assert!(agg.sources.is_empty());
        // Still counted as collected data.
        assert_eq!(agg.total_records, 2);
    }

    #[test]
    fn test_data_by_team_flattens_per_team() {
        let mut results = BTreeMap::new();
        results.insert(
            TeamKind::Search,
            team_result(TeamKind::Search, vec![record_value("c1", None)]),
        );
        let agg = aggregate(&results);
        let data = agg.data_by_team();
        assert_eq!(data.len(), 1);
        assert_eq!(data["search"].len(), 1);
    }

    #[test]
    fn test_degraded_summary_lists_citations() {
        let mut results = BTreeMap::new();
        results.insert(
            TeamKind::Search,
            team_result(TeamKind::Search, vec![record_value("c1", Some("제7조"))]),
        );
        let agg = aggregate(&results);
        let summary = degraded_summary("전세금 인상 한도", &agg);
        assert!(summary.contains("주택임대차보호법 제7조"));
        assert!(summary.contains("20분의 1"));
    }

    #[test]
    fn test_degraded_summary_empty() {
        let agg = AggregatedResults::default();
        let summary = degraded_summary("질문", &agg);
        assert!(summary.contains("찾지 못했습니다"));
    }

    #[test]
    fn test_degraded_summary_mentions_failed_teams() {
        let mut results = BTreeMap::new();
        results.insert(
            TeamKind::Search,
            team_result(TeamKind::Search, vec![record_value("c1", Some("제7조"))]),
        );
        let mut failed = team_result(TeamKind::Analysis, vec![]);
        failed.status = TeamStatus::Failed;
        failed.error = Some("timeout".to_string());
        results.insert(TeamKind::Analysis, failed);
        let agg = aggregate(&results);
        let summary = degraded_summary("질문", &agg);
        assert!(summary.contains("analysis"));
    }
}
