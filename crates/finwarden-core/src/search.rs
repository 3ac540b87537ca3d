//! Keyword search over the tool catalog
//!
//! Lets an agent discover tools by intent instead of reading the whole
//! catalog. Scoring is intentionally simple:
//!
//! | match                                   | points |
//! |-----------------------------------------|--------|
//! | normalized name equals the query        | 100    |
//! | normalized name contains the full query | 20     |
//! | query term found in the name            | 10     |
//! | query term found in the description     | 3      |
//!
//! Names and queries are normalized (lowercase, `_`/`-` become spaces), so
//! `"Get Accounts"`, `"get_accounts"` and `"get-accounts"` rank identically.
//! Ties sort by name.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::models::{PrivacyMode, ToolKind, ToolSource};
use crate::registry::{ToolDescriptor, ToolExecutor, ToolProvider, ToolRegistry};
use crate::tools::parse_params;

pub const SEARCH_TOOLS: &str = "search_tools";

/// Results returned when the caller gives no limit
pub const DEFAULT_LIMIT: usize = 5;

const MAX_LIMIT: usize = 50;

const EXACT_NAME_SCORE: u32 = 100;
const NAME_PHRASE_SCORE: u32 = 20;
const NAME_TERM_SCORE: u32 = 10;
const DESCRIPTION_TERM_SCORE: u32 = 3;

#[derive(Debug, Default, Deserialize, schemars::JsonSchema)]
pub struct SearchToolsParams {
    #[schemars(description = "What you want to do, e.g. \"list accounts\" or \"record a trade\"")]
    pub query: Option<String>,

    #[schemars(description = "Maximum number of tools to return (default 5)")]
    pub limit: Option<usize>,
}

/// One ranked match
#[derive(Debug, Clone, Serialize)]
pub struct ToolMatch {
    pub name: String,
    pub description: String,
    pub source: ToolSource,
    pub minimum_mode: PrivacyMode,
    pub kind: ToolKind,
    pub input_schema: Value,
    pub score: u32,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    query: String,
    tools: Vec<ToolMatch>,
    count: usize,
}

/// Ranked keyword search over a registry's catalog
pub struct ToolSearch<'a> {
    registry: &'a ToolRegistry,
}

impl<'a> ToolSearch<'a> {
    pub fn new(registry: &'a ToolRegistry) -> Self {
        Self { registry }
    }

    /// Rank tools visible under `mode` (all tools when `None`)
    pub fn search(&self, query: &str, limit: usize, mode: Option<PrivacyMode>) -> Vec<ToolMatch> {
        let tools = match mode {
            Some(mode) => self.registry.tools_for_mode(mode),
            None => self.registry.all_tools(),
        };
        rank(&tools, query, limit)
    }

    /// `search_tools` entry point under the current privacy mode
    pub fn execute(&self, args: &Value) -> Result<Value, ToolError> {
        self.execute_for_mode(args, self.registry.settings().current())
    }

    pub(crate) fn execute_for_mode(
        &self,
        args: &Value,
        mode: PrivacyMode,
    ) -> Result<Value, ToolError> {
        let params: SearchToolsParams = parse_params(args)?;

        let query = params.query.unwrap_or_default();
        if normalize(&query).is_empty() {
            return Err(ToolError::invalid_arguments("query is required"));
        }
        let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        let tools = self.search(&query, limit, Some(mode));
        serde_json::to_value(SearchResult {
            count: tools.len(),
            query,
            tools,
        })
        .map_err(|e| ToolError::from(crate::error::Error::from(e)))
    }
}

/// Registers `search_tools` with every registry
pub(crate) struct SearchToolProvider;

impl ToolProvider for SearchToolProvider {
    fn source(&self) -> ToolSource {
        ToolSource::Static
    }

    fn list_tools(&self) -> Vec<ToolDescriptor> {
        vec![ToolDescriptor::new(
            SEARCH_TOOLS,
            "Search the available tools by keyword. Returns the best matching tools \
             with their input schemas.",
            ToolSource::Static,
            schemars::schema_for!(SearchToolsParams).into(),
        )
        .with_kind(ToolKind::Meta)
        .with_minimum_mode(PrivacyMode::Strict)
        .with_executor(ToolExecutor::SearchCatalog)]
    }
}

/// Lowercase, `_`/`-` to spaces, collapsed whitespace
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Score one tool against a normalized query
pub fn score(tool: &ToolDescriptor, normalized_query: &str) -> u32 {
    if normalized_query.is_empty() {
        return 0;
    }
    let name = normalize(&tool.name);
    let description = normalize(&tool.description);

    let mut score = 0;
    if name == normalized_query {
        score += EXACT_NAME_SCORE;
    } else if name.contains(normalized_query) {
        score += NAME_PHRASE_SCORE;
    }
    for term in normalized_query.split(' ') {
        if name.contains(term) {
            score += NAME_TERM_SCORE;
        } else if description.contains(term) {
            score += DESCRIPTION_TERM_SCORE;
        }
    }
    score
}

fn rank(tools: &[Arc<ToolDescriptor>], query: &str, limit: usize) -> Vec<ToolMatch> {
    let normalized = normalize(query);
    let mut matches: Vec<ToolMatch> = tools
        .iter()
        .filter_map(|tool| {
            let score = score(tool, &normalized);
            (score > 0).then(|| ToolMatch {
                name: tool.name.clone(),
                description: tool.description.clone(),
                source: tool.source,
                minimum_mode: tool.minimum_mode,
                kind: tool.kind,
                input_schema: tool.input_schema.clone(),
                score,
            })
        })
        .collect();

    matches.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    matches.truncate(limit);
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrivacySettings;
    use crate::error::ToolErrorCode;
    use crate::parser_tools::ParserToolProvider;
    use crate::test_utils::{MockDataProvider, RecordingActions};
    use crate::tools::StaticToolProvider;
    use serde_json::json;

    fn registry(mode: PrivacyMode) -> ToolRegistry {
        ToolRegistry::builder(PrivacySettings::new(mode))
            .provider(Arc::new(StaticToolProvider::new(Arc::new(
                MockDataProvider::sample(),
            ))))
            .provider(Arc::new(ParserToolProvider::new(Arc::new(
                RecordingActions::default(),
            ))))
            .build()
    }

    fn names(matches: &[ToolMatch]) -> Vec<String> {
        matches.iter().map(|m| m.name.clone()).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Get_Accounts"), "get accounts");
        assert_eq!(normalize("  get-accounts  "), "get accounts");
        assert_eq!(normalize("___"), "");
    }

    #[test]
    fn test_exact_name_ranks_first() {
        let registry = registry(PrivacyMode::Full);
        let results = ToolSearch::new(&registry).search("get_accounts", 5, None);
        assert_eq!(results[0].name, "get_accounts");
        assert!(results[0].score >= EXACT_NAME_SCORE);
    }

    #[test]
    fn test_query_variants_rank_identically() {
        let registry = registry(PrivacyMode::Full);
        let search = ToolSearch::new(&registry);
        let base = names(&search.search("parse transaction", 10, None));
        assert!(!base.is_empty());
        for variant in ["Parse_Transaction", "PARSE-TRANSACTION", "parse   transaction"] {
            assert_eq!(names(&search.search(variant, 10, None)), base, "{}", variant);
        }
    }

    #[test]
    fn test_scores_non_increasing_and_ties_by_name() {
        let registry = registry(PrivacyMode::Full);
        let results = ToolSearch::new(&registry).search("get", 50, None);
        assert!(results.len() > 1);
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].name < pair[1].name);
            }
        }
    }

    #[test]
    fn test_description_match_scores_lower_than_name() {
        let registry = registry(PrivacyMode::Full);
        let results = ToolSearch::new(&registry).search("holdings", 10, None);
        // Only descriptions mention holdings
        assert!(results.iter().all(|m| m.score == DESCRIPTION_TERM_SCORE));
        assert!(results.iter().any(|m| m.name == "get_accounts"));
    }

    #[test]
    fn test_limit_applies() {
        let registry = registry(PrivacyMode::Full);
        let results = ToolSearch::new(&registry).search("get", 2, None);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_execute_filters_by_mode() {
        let registry = registry(PrivacyMode::Strict);
        let out = ToolSearch::new(&registry)
            .execute(&json!({ "query": "account", "limit": 10 }))
            .unwrap();
        let found: Vec<&str> = out["tools"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|t| t["name"].as_str())
            .collect();
        assert!(found.contains(&"get_accounts"));
        assert!(!found.contains(&"get_account_details"));
        assert!(!found.contains(&"parse_account"));
        assert_eq!(out["count"], found.len());
    }

    #[test]
    fn test_execute_default_limit() {
        let registry = registry(PrivacyMode::Full);
        let out = ToolSearch::new(&registry).execute(&json!({ "query": "get" })).unwrap();
        assert!(out["tools"].as_array().unwrap().len() <= DEFAULT_LIMIT);
    }

    #[test]
    fn test_empty_query_is_invalid() {
        let registry = registry(PrivacyMode::Full);
        let search = ToolSearch::new(&registry);
        for args in [
            Value::Null,
            json!({}),
            json!({ "query": "" }),
            json!({ "query": " _ " }),
        ] {
            let err = search.execute(&args).unwrap_err();
            assert_eq!(err.code, ToolErrorCode::InvalidArguments);
            assert_eq!(err.message.as_deref(), Some("query is required"));
        }
    }

    #[test]
    fn test_search_through_registry() {
        let registry = registry(PrivacyMode::Standard);
        let out = registry
            .execute_tool(SEARCH_TOOLS, &json!({ "query": "trade" }))
            .unwrap();
        assert_eq!(out["tools"][0]["name"], "parse_trade");

        // Parser tools need standard mode
        registry.settings().set(PrivacyMode::Anonymized);
        let out = registry
            .execute_tool(SEARCH_TOOLS, &json!({ "query": "trade" }))
            .unwrap();
        assert_eq!(out["count"], 0);
    }
}
