//! Legal corpus search tool.
//!
//! Wraps [`HybridLegalSearch`] behind the uniform [`Tool`] contract.
//! Planner-supplied parameters deserialize into [`SearchParams`];
//! unknown fields are ignored.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Tool, ToolOutput};
use crate::error::EngineError;
use crate::search::{HybridLegalSearch, SearchParams};

/// Registry name of this tool.
pub const LEGAL_SEARCH_TOOL: &str = "legal_search";

/// Hybrid retrieval over the legal corpus.
pub struct LegalSearchTool {
    search: Arc<HybridLegalSearch>,
}

impl LegalSearchTool {
    /// Wraps a search engine.
    #[must_use]
    pub fn new(search: Arc<HybridLegalSearch>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Tool for LegalSearchTool {
    fn name(&self) -> &'static str {
        LEGAL_SEARCH_TOOL
    }

    fn description(&self) -> &'static str {
        "법령 검색: 조문 직접 조회와 의미 기반 검색을 결합해 관련 법령 조문을 반환합니다. \
         파라미터: category, doc_type, is_tenant_protection, is_tax_related, limit"
    }

    async fn execute(
        &self,
        query: &str,
        params: &serde_json::Value,
    ) -> Result<ToolOutput, EngineError> {
        let search_params: SearchParams = if params.is_null() {
            SearchParams::default()
        } else {
            serde_json::from_value(params.clone()).unwrap_or_default()
        };

        let outcome = self.search.search(query, &search_params)?;

        let data_source = outcome.data_source.as_str().to_string();
        let data = outcome
            .data
            .iter()
            .map(|record| serde_json::to_value(record).unwrap_or(serde_json::Value::Null))
            .collect();

        Ok(ToolOutput {
            status: outcome.status,
            data,
            count: outcome.count,
            tool_name: LEGAL_SEARCH_TOOL.to_string(),
            data_source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ChunkMeta, LawInfo, MetadataCatalog, SqliteCatalog};
    use crate::embedding::{Embedder, HashEmbedder};
    use crate::index::{IndexedChunk, MemoryVectorIndex, VectorIndex};

    fn tool() -> LegalSearchTool {
        let catalog = SqliteCatalog::in_memory().unwrap_or_else(|e| unreachable!("{e}"));
        catalog
            .insert_law(
                "주택임대차보호법",
                &LawInfo {
                    total_articles: Some(32),
                    last_article: None,
                    law_number: Some("제19356호".to_string()),
                    enforcement_date: None,
                    category: Some("2_임대차_전세_월세".to_string()),
                },
            )
            .unwrap_or_else(|e| unreachable!("{e}"));
        let meta = ChunkMeta {
            law_title: "주택임대차보호법".to_string(),
            article_number: Some("제7조".to_string()),
            article_title: None,
            category: "2_임대차_전세_월세".to_string(),
            doc_type: "법률".to_string(),
            is_deleted: false,
            is_tenant_protection: true,
            is_tax_related: false,
        };
        let embedder = HashEmbedder::new();
        let content = "증액청구는 약정한 차임등의 20분의 1의 금액을 초과하지 못한다.";
        let vector = embedder.encode(content).unwrap_or_default();
        catalog
            .insert_chunk("lease-7", &meta, content, 0, &vector)
            .unwrap_or_else(|e| unreachable!("{e}"));
        let index = MemoryVectorIndex::new();
        index.insert(IndexedChunk {
            doc_id: "lease-7".to_string(),
            content: content.to_string(),
            meta,
            embedding: vector,
        });
        let search = HybridLegalSearch::new(
            Arc::new(catalog) as Arc<dyn MetadataCatalog>,
            Arc::new(index) as Arc<dyn VectorIndex>,
            Arc::new(HashEmbedder::new()),
        );
        LegalSearchTool::new(Arc::new(search))
    }

    #[tokio::test]
    async fn test_direct_path_through_tool_contract() {
        let tool = tool();
        let output = tool
            .execute("주택임대차보호법 제7조", &serde_json::Value::Null)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.count, 1);
        assert_eq!(output.data_source, "direct");
        assert_eq!(output.data[0]["article_number"], "제7조");
        assert_eq!(output.data[0]["relevance_score"], 1.0);
    }

    #[tokio::test]
    async fn test_params_deserialized_from_json() {
        let tool = tool();
        let params = serde_json::json!({
            "category": "2_임대차_전세_월세",
            "limit": 5,
            "ignored_field": true
        });
        let output = tool
            .execute("보증금 증액", &params)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(output.data_source, "semantic");
        assert!(output.count <= 5);
    }
}
