//! DAG validation — run this before hashing or binding a workflow.
//!
//! Rules enforced:
//! 1. Node local ids must be unique within the workflow.
//! 2. Every upstream/downstream reference must name a real node.
//! 3. The directed graph must be acyclic (topological sort must succeed).
//!
//! Returns a topologically-sorted list of local node ids on success.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::ClientWorkflow, EngineError};

pub fn validate_dag(workflow: &ClientWorkflow) -> Result<Vec<String>, EngineError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &workflow.nodes {
        if !seen_ids.insert(node.local_id.as_str()) {
            return Err(EngineError::DuplicateNodeId(node.local_id.clone()));
        }
    }

    let node_set: HashSet<&str> = workflow.nodes.iter().map(|n| n.local_id.as_str()).collect();

    for node in &workflow.nodes {
        for up in &node.upstream {
            if !node_set.contains(up.as_str()) {
                return Err(EngineError::UnknownNodeReference {
                    node_id: up.clone(),
                    side: "upstream",
                });
            }
        }
        for down in &node.downstream {
            if !node_set.contains(down.as_str()) {
                return Err(EngineError::UnknownNodeReference {
                    node_id: down.clone(),
                    side: "downstream",
                });
            }
        }
    }

    // Kahn's algorithm over the upstream/downstream adjacency.
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = HashMap::new();

    for node in &workflow.nodes {
        adjacency.entry(node.local_id.as_str()).or_default();
        in_degree.entry(node.local_id.as_str()).or_insert(0);
    }

    for node in &workflow.nodes {
        for up in &node.upstream {
            adjacency.entry(up.as_str()).or_default().push(node.local_id.as_str());
            *in_degree.entry(node.local_id.as_str()).or_insert(0) += 1;
        }
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &d)| d == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(workflow.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        if let Some(neighbours) = adjacency.get(node_id) {
            for &neighbour in neighbours {
                let deg = in_degree.entry(neighbour).or_insert(0);
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    if sorted.len() != workflow.nodes.len() {
        return Err(EngineError::CycleDetected);
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClientNode;
    use std::collections::BTreeMap;

    fn make_node(id: &str, upstream: &[&str]) -> ClientNode {
        ClientNode {
            local_id: id.to_string(),
            task_template_version_id: 1,
            node_args: BTreeMap::new(),
            upstream: upstream.iter().map(|s| s.to_string()).collect(),
            downstream: Vec::new(),
        }
    }

    fn make_workflow(nodes: Vec<ClientNode>) -> ClientWorkflow {
        let mut wf = ClientWorkflow::new("unittest");
        wf.nodes = nodes;
        wf
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        let workflow = make_workflow(vec![
            make_node("a", &[]),
            make_node("b", &["a"]),
            make_node("c", &["b"]),
        ]);

        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        let workflow = make_workflow(vec![
            make_node("a", &[]),
            make_node("b", &["a"]),
            make_node("c", &["a"]),
            make_node("d", &["b", "c"]),
        ]);

        let sorted = validate_dag(&workflow).expect("should be valid");
        assert_eq!(sorted.first().unwrap(), "a");
        assert_eq!(sorted.last().unwrap(), "d");
        assert_eq!(sorted.len(), 4);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let workflow = make_workflow(vec![make_node("a", &[]), make_node("a", &[])]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let workflow = make_workflow(vec![make_node("a", &["ghost"])]);
        assert!(matches!(
            validate_dag(&workflow),
            Err(EngineError::UnknownNodeReference { node_id, .. }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        let workflow = make_workflow(vec![
            make_node("a", &["c"]),
            make_node("b", &["a"]),
            make_node("c", &["b"]),
        ]);
        assert!(matches!(validate_dag(&workflow), Err(EngineError::CycleDetected)));
    }

    #[test]
    fn single_node_no_edges_is_valid() {
        let workflow = make_workflow(vec![make_node("solo", &[])]);
        let sorted = validate_dag(&workflow).expect("single node should be valid");
        assert_eq!(sorted, vec!["solo"]);
    }
}
