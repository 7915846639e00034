//! A named query block produced by the [`CTEBuilder`](crate::cte_builder)
//! (spec §3, "CTE").

use fhir4ds_support::Metadata;

#[derive(Debug, Clone)]
pub struct CTE {
    pub name: String,
    pub query: String,
    pub depends_on: Vec<String>,
    pub requires_unnest: bool,
    pub source_fragment: Option<String>,
    pub metadata: Metadata,
}

impl CTE {
    pub fn is_valid_name(name: &str) -> bool {
        let mut chars = name.chars();
        match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
            _ => return false,
        }
        chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    }
}
