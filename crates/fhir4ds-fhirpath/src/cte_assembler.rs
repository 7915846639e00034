//! Orders and renders a `CTE` list into the final `WITH` statement (spec
//! §4.7).
//!
//! Ordering is a stable Kahn-style topological sort: among CTEs with no
//! remaining unsatisfied dependency, the one appearing earliest in the
//! input list is emitted first, so two independently-buildable CTE chains
//! keep their original relative order. A cycle is reported as the
//! shortest back-edge path found by depth-first search from the first node
//! still unordered once Kahn's queue runs dry.

use crate::cte::CTE;
use fhir4ds_support::AssemblyError;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, warn};

pub struct CTEAssembler;

impl CTEAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Validates, orders, and renders `ctes` into a single `WITH ... SELECT
    /// * FROM <last>;` statement (spec §4.7, "Core algorithm").
    pub fn assemble(&self, ctes: &[CTE]) -> Result<String, AssemblyError> {
        if ctes.is_empty() {
            return Err(AssemblyError::EmptyCteList);
        }

        let mut seen_names = HashSet::new();
        for cte in ctes {
            if !seen_names.insert(cte.name.as_str()) {
                return Err(AssemblyError::DuplicateCteName { name: cte.name.clone() });
            }
        }

        for cte in ctes {
            let missing: Vec<String> = cte
                .depends_on
                .iter()
                .filter(|dep| !seen_names.contains(dep.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(AssemblyError::MissingDependency { cte_name: cte.name.clone(), missing });
            }
        }

        let ordered = topological_order(ctes)?;
        debug!(cte_count = ordered.len(), "assembled CTE chain");
        Ok(render(&ordered))
    }
}

impl Default for CTEAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn topological_order(ctes: &[CTE]) -> Result<Vec<&CTE>, AssemblyError> {
    let index_of: HashMap<&str, usize> = ctes.iter().enumerate().map(|(i, c)| (c.name.as_str(), i)).collect();
    let mut in_degree = vec![0usize; ctes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); ctes.len()];

    for (i, cte) in ctes.iter().enumerate() {
        for dep in &cte.depends_on {
            let dep_idx = index_of[dep.as_str()];
            dependents[dep_idx].push(i);
            in_degree[i] += 1;
        }
    }

    // A min-priority-by-input-index queue, seeded with every zero-in-degree
    // node, keeps the sort stable: ties always resolve to input order.
    let mut ready: VecDeque<usize> = (0..ctes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut ordered_indices = Vec::with_capacity(ctes.len());
    let mut remaining = in_degree.clone();

    while let Some(next) = pop_smallest(&mut ready) {
        ordered_indices.push(next);
        for &dependent in &dependents[next] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if ordered_indices.len() != ctes.len() {
        let path = find_cycle(ctes, &index_of);
        warn!(cycle = %path.join(" -> "), "dependency cycle detected while ordering CTEs");
        return Err(AssemblyError::DependencyCycle { path });
    }

    Ok(ordered_indices.into_iter().map(|i| &ctes[i]).collect())
}

fn pop_smallest(ready: &mut VecDeque<usize>) -> Option<usize> {
    if ready.is_empty() {
        return None;
    }
    let (pos, _) = ready.iter().enumerate().min_by_key(|&(_, &idx)| idx)?;
    ready.remove(pos)
}

/// DFS from the first CTE that never got ordered, returning the shortest
/// back-edge cycle (as a chain of names ending where it started).
fn find_cycle(ctes: &[CTE], index_of: &HashMap<&str, usize>) -> Vec<String> {
    let mut visiting = vec![false; ctes.len()];
    let mut visited = vec![false; ctes.len()];
    let mut stack: Vec<usize> = Vec::new();

    for start in 0..ctes.len() {
        if visited[start] {
            continue;
        }
        if let Some(cycle) = dfs(start, ctes, index_of, &mut visiting, &mut visited, &mut stack) {
            return cycle;
        }
    }
    Vec::new()
}

fn dfs(
    node: usize,
    ctes: &[CTE],
    index_of: &HashMap<&str, usize>,
    visiting: &mut [bool],
    visited: &mut [bool],
    stack: &mut Vec<usize>,
) -> Option<Vec<String>> {
    visiting[node] = true;
    stack.push(node);

    for dep in &ctes[node].depends_on {
        let dep_idx = index_of[dep.as_str()];
        if visiting[dep_idx] {
            let start = stack.iter().position(|&i| i == dep_idx).unwrap();
            let mut path: Vec<String> = stack[start..].iter().map(|&i| ctes[i].name.clone()).collect();
            path.push(ctes[dep_idx].name.clone());
            return Some(path);
        }
        if !visited[dep_idx] {
            if let Some(cycle) = dfs(dep_idx, ctes, index_of, visiting, visited, stack) {
                return Some(cycle);
            }
        }
    }

    stack.pop();
    visiting[node] = false;
    visited[node] = true;
    None
}

fn render(ordered: &[&CTE]) -> String {
    let mut out = String::from("WITH\n");
    for (i, cte) in ordered.iter().enumerate() {
        let indented = reindent(&cte.query, "    ");
        out.push_str(&format!("  {} AS (\n{}\n  )", cte.name, indented));
        out.push_str(if i + 1 < ordered.len() { ",\n" } else { "\n" });
    }
    let last = ordered.last().expect("non-empty, checked by assemble()");
    out.push_str(&format!("SELECT * FROM {};", last.name));
    out
}

fn reindent(query: &str, indent: &str) -> String {
    query
        .lines()
        .map(|line| format!("{indent}{}", line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir4ds_support::Metadata;

    fn cte(name: &str, query: &str, depends_on: &[&str]) -> CTE {
        CTE {
            name: name.to_string(),
            query: query.to_string(),
            depends_on: depends_on.iter().map(|s| s.to_string()).collect(),
            requires_unnest: false,
            source_fragment: None,
            metadata: Metadata::new(),
        }
    }

    #[test]
    fn empty_list_is_an_error() {
        let assembler = CTEAssembler::new();
        assert!(matches!(assembler.assemble(&[]), Err(AssemblyError::EmptyCteList)));
    }

    #[test]
    fn duplicate_name_is_an_error() {
        let assembler = CTEAssembler::new();
        let ctes = vec![cte("cte_1", "SELECT 1", &[]), cte("cte_1", "SELECT 2", &[])];
        assert!(matches!(assembler.assemble(&ctes), Err(AssemblyError::DuplicateCteName { .. })));
    }

    #[test]
    fn missing_dependency_is_an_error() {
        let assembler = CTEAssembler::new();
        let ctes = vec![cte("cte_1", "SELECT 1", &["cte_missing"])];
        assert!(matches!(assembler.assemble(&ctes), Err(AssemblyError::MissingDependency { .. })));
    }

    #[test]
    fn cycle_is_detected() {
        let assembler = CTEAssembler::new();
        let ctes = vec![cte("cte_1", "SELECT 1", &["cte_2"]), cte("cte_2", "SELECT 2", &["cte_1"])];
        let err = assembler.assemble(&ctes).unwrap_err();
        match err {
            AssemblyError::DependencyCycle { path } => assert_eq!(path, vec!["cte_1", "cte_2", "cte_1"]),
            other => panic!("expected DependencyCycle, got {other:?}"),
        }
    }

    #[test]
    fn ties_preserve_input_order() {
        let assembler = CTEAssembler::new();
        let ctes = vec![cte("cte_b", "SELECT 1", &[]), cte("cte_a", "SELECT 2", &[])];
        let rendered = assembler.assemble(&ctes).unwrap();
        assert!(rendered.find("cte_b").unwrap() < rendered.find("cte_a").unwrap());
    }

    #[test]
    fn renders_final_select_from_last_cte() {
        let assembler = CTEAssembler::new();
        let ctes = vec![cte("cte_1", "SELECT 1", &[]), cte("cte_2", "SELECT * FROM cte_1", &["cte_1"])];
        let rendered = assembler.assemble(&ctes).unwrap();
        assert!(rendered.trim_end().ends_with("SELECT * FROM cte_2;"));
        assert!(rendered.starts_with("WITH\n"));
    }
}
