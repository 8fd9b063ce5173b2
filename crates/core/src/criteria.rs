//! Criteria schema: the category tree that drives the prompt and shapes the
//! expected LLM output.

use crate::error::ExtractError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CriteriaNode {
    Keywords(Vec<String>),
    Group(IndexMap<String, CriteriaNode>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriteriaSchema {
    categories: IndexMap<String, CriteriaNode>,
}

type CategoryTable = &'static [(&'static str, &'static [&'static str])];

const GENERAL_CRITERIA: CategoryTable = &[
    (
        "technical",
        &[
            "technical qualification",
            "technical criteria",
            "technical requirement",
            "work experience",
            "project experience",
            "completion certificate",
            "work order",
            "technical capacity",
            "technical capability",
            "eligible works",
            "qualification requirement",
            "technical eligibility",
        ],
    ),
    (
        "financial",
        &[
            "turnover",
            "financial qualification",
            "financial criteria",
            "financial requirement",
            "annual turnover",
            "average annual turnover",
            "financial capacity",
            "financial capability",
            "net worth",
            "liquid asset",
            "solvency",
            "working capital",
            "financial statement",
            "balance sheet",
            "profit and loss",
            "financial position",
            "financial standing",
            "financial strength",
            "revenue",
        ],
    ),
    (
        "joint_venture",
        &[
            "joint venture",
            "jv ",
            "consortium",
            "jv criteria",
            "jv requirement",
            "lead member",
            "lead partner",
            "jv agreement",
            "jv formation",
        ],
    ),
    (
        "commercial_clauses",
        &[
            "earnest money",
            "emd",
            "bid security",
            "performance security",
            "security deposit",
            "retention money",
            "defect liability",
            "completion period",
        ],
    ),
    (
        "similar_work",
        &[
            "similar work",
            "similar nature work",
            "similar completed work",
            "similar type of work",
            "similar project",
        ],
    ),
];

const SPECIFIC_CRITERIA: CategoryTable = &[
    (
        "turnover",
        &[
            "turnover",
            "annual turnover",
            "average annual turnover",
            "financial turnover",
            "revenue",
        ],
    ),
    (
        "emd_submission",
        &[
            "earnest money deposit",
            "emd",
            "bid security",
            "mode of emd",
            "emd submission",
        ],
    ),
    (
        "completion_period",
        &[
            "completion period",
            "contract period",
            "time of completion",
            "project timeline",
        ],
    ),
    (
        "performance_security",
        &[
            "performance security",
            "performance guarantee",
            "performance bond",
        ],
    ),
    (
        "security_deposit",
        &[
            "security deposit",
            "retention money",
            "retention amount",
            "withheld amount",
        ],
    ),
    (
        "defect_liability",
        &[
            "defect liability",
            "defect liability period",
            "maintenance period",
            "warranty period",
        ],
    ),
    (
        "mobilization_advance",
        &[
            "mobilization advance",
            "mobilisation advance",
            "advance payment",
        ],
    ),
    (
        "solvency_working_capital",
        &[
            "solvency",
            "working capital",
            "bank solvency",
            "credit facility",
        ],
    ),
    (
        "liquid_asset",
        &["liquid asset", "cash flow", "liquidity", "liquid fund"],
    ),
    (
        "price_variation",
        &[
            "price variation",
            "price adjustment",
            "escalation clause",
            "price escalation",
        ],
    ),
    (
        "incentive_bonus",
        &[
            "incentive",
            "bonus clause",
            "early completion bonus",
            "performance bonus",
        ],
    ),
];

impl CriteriaSchema {
    pub fn new(categories: IndexMap<String, CriteriaNode>) -> Result<Self, ExtractError> {
        let schema = Self { categories };
        schema.validate()?;
        Ok(schema)
    }

    /// Built-in qualification and commercial criteria for works tenders.
    pub fn tender_default() -> Self {
        let mut categories = IndexMap::new();
        categories.insert("general_criteria".to_string(), group(GENERAL_CRITERIA));
        categories.insert("specific_criteria".to_string(), group(SPECIFIC_CRITERIA));
        Self { categories }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ExtractError> {
        let categories: IndexMap<String, CriteriaNode> = serde_json::from_str(raw)
            .map_err(|error| ExtractError::InvalidCriteria(error.to_string()))?;
        Self::new(categories)
    }

    pub fn from_path(path: &Path) -> Result<Self, ExtractError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn categories(&self) -> &IndexMap<String, CriteriaNode> {
        &self.categories
    }

    pub fn to_pretty_json(&self) -> Result<String, ExtractError> {
        Ok(serde_json::to_string_pretty(&self.categories)?)
    }

    /// Every path from the root down to a keyword list, in schema order.
    pub fn leaf_paths(&self) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        collect_paths(&self.categories, &mut Vec::new(), &mut paths);
        paths
    }

    fn validate(&self) -> Result<(), ExtractError> {
        if self.categories.is_empty() {
            return Err(ExtractError::InvalidCriteria(
                "schema has no categories".to_string(),
            ));
        }
        validate_group(&self.categories, "")
    }
}

impl Default for CriteriaSchema {
    fn default() -> Self {
        Self::tender_default()
    }
}

fn group(table: CategoryTable) -> CriteriaNode {
    CriteriaNode::Group(
        table
            .iter()
            .map(|(name, keywords)| {
                (
                    (*name).to_string(),
                    CriteriaNode::Keywords(keywords.iter().map(|k| (*k).to_string()).collect()),
                )
            })
            .collect(),
    )
}

fn validate_group(nodes: &IndexMap<String, CriteriaNode>, prefix: &str) -> Result<(), ExtractError> {
    for (key, node) in nodes {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if key.trim().is_empty() {
            return Err(ExtractError::InvalidCriteria(format!(
                "blank key under '{prefix}'"
            )));
        }

        if let CriteriaNode::Group(children) = node {
            if children.is_empty() {
                return Err(ExtractError::InvalidCriteria(format!(
                    "group '{path}' has no entries"
                )));
            }
            validate_group(children, &path)?;
        }
    }
    Ok(())
}

fn collect_paths(
    nodes: &IndexMap<String, CriteriaNode>,
    prefix: &mut Vec<String>,
    out: &mut Vec<Vec<String>>,
) {
    for (key, node) in nodes {
        prefix.push(key.clone());
        match node {
            CriteriaNode::Keywords(_) => out.push(prefix.clone()),
            CriteriaNode::Group(children) => collect_paths(children, prefix, out),
        }
        prefix.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_has_two_levels() {
        let schema = CriteriaSchema::tender_default();
        let keys: Vec<_> = schema.categories().keys().cloned().collect();
        assert_eq!(keys, vec!["general_criteria", "specific_criteria"]);

        let paths = schema.leaf_paths();
        assert!(paths.iter().all(|path| path.len() == 2));
        assert_eq!(paths.first().map(|p| p[1].as_str()), Some("technical"));
        assert!(paths
            .iter()
            .any(|path| path == &["specific_criteria", "turnover"]));
    }

    #[test]
    fn pretty_json_keeps_declaration_order() {
        let schema = CriteriaSchema::from_json_str(r#"{"zeta": ["z"], "alpha": {"b": ["x"], "a": ["y"]}}"#)
            .expect("schema should parse");
        let rendered = schema.to_pretty_json().expect("schema should render");

        let zeta = rendered.find("zeta").expect("zeta rendered");
        let alpha = rendered.find("alpha").expect("alpha rendered");
        assert!(zeta < alpha);
        assert_eq!(rendered, schema.to_pretty_json().expect("schema should render"));
    }

    #[test]
    fn rejects_empty_groups_and_non_string_leaves() {
        assert!(CriteriaSchema::from_json_str("{}").is_err());
        assert!(CriteriaSchema::from_json_str(r#"{"cat": {}}"#).is_err());
        assert!(CriteriaSchema::from_json_str(r#"{"cat": {"x": [1, 2]}}"#).is_err());
        assert!(CriteriaSchema::from_json_str(r#"{"cat": {" ": ["a"]}}"#).is_err());
    }

    #[test]
    fn loads_schema_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("criteria.json");
        std::fs::write(&path, r#"{"bid": {"emd": ["earnest money"]}}"#)?;

        let schema = CriteriaSchema::from_path(&path)?;
        assert_eq!(schema.leaf_paths(), vec![vec!["bid".to_string(), "emd".to_string()]]);
        Ok(())
    }
}
