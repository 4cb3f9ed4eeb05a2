//! The pipeline task graph.
//!
//! Rules enforced when a graph is built:
//! 1. Node names must be unique within the graph.
//! 2. Every edge must reference declared nodes (both `from` and `to`).
//! 3. A node feeds at most one consumer; any number of producers may feed
//!    one consumer.
//!
//! Acyclicity is not enforced at build time. [`TaskGraph::has_cycles`] checks
//! it, and [`TaskGraph::tasks_in_construction_order`] refuses cyclic graphs.

use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::factory::decode_task;
use crate::models::{GraphEdge, GraphNode, NodeId};
use crate::task::Task;
use crate::EngineError;

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects node and edge declarations and validates them into a
/// [`TaskGraph`]. Edges are resolved in [`GraphBuilder::build`], so they may
/// name nodes declared later.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<GraphNode>,
    by_name: HashMap<String, NodeId>,
    edges: Vec<(String, String)>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node. IDs are handed out in declaration order.
    ///
    /// # Errors
    /// [`EngineError::DuplicateNode`] if the name is already taken.
    pub fn node(
        &mut self,
        name: impl Into<String>,
        attributes: BTreeMap<String, String>,
    ) -> Result<NodeId, EngineError> {
        let name = name.into();
        if self.by_name.contains_key(&name) {
            return Err(EngineError::DuplicateNode(name));
        }

        let id = NodeId::from_index(self.nodes.len());
        self.by_name.insert(name.clone(), id);
        self.nodes.push(GraphNode { id, name, attributes });
        Ok(id)
    }

    /// Declare an edge from producer `from` to consumer `to`.
    pub fn edge(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.edges.push((from.into(), to.into()));
        self
    }

    /// Resolve edges and freeze the graph.
    ///
    /// # Errors
    /// - [`EngineError::UnknownNodeReference`] if an edge names a missing node.
    /// - [`EngineError::MultipleConsumers`] if a node gets a second, different
    ///   outgoing edge. Repeating the same edge is harmless.
    pub fn build(self) -> Result<TaskGraph, EngineError> {
        let mut consumers: Vec<Option<NodeId>> = vec![None; self.nodes.len()];

        for (from, to) in &self.edges {
            let from_id = self.lookup(from, "from")?;
            let to_id = self.lookup(to, "to")?;

            match consumers[from_id.index()] {
                None => consumers[from_id.index()] = Some(to_id),
                Some(existing) if existing == to_id => {}
                Some(existing) => {
                    return Err(EngineError::MultipleConsumers {
                        node: from.clone(),
                        first: self.nodes[existing.index()].name.clone(),
                        second: to.clone(),
                    })
                }
            }
        }

        let mut producers: Vec<Vec<NodeId>> = vec![Vec::new(); self.nodes.len()];
        for (from, to) in consumers.iter().enumerate() {
            if let Some(to) = to {
                producers[to.index()].push(NodeId::from_index(from));
            }
        }

        Ok(TaskGraph {
            nodes: self.nodes,
            by_name: self.by_name,
            consumers,
            producers,
        })
    }

    fn lookup(&self, name: &str, side: &'static str) -> Result<NodeId, EngineError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| EngineError::UnknownNodeReference {
                name: name.to_owned(),
                side,
            })
    }
}

// ---------------------------------------------------------------------------
// TaskGraph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Colour {
    White,
    Grey,
    Black,
}

/// An immutable pipeline graph: nodes indexed by [`NodeId`], each with at
/// most one outgoing edge.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<GraphNode>,
    by_name: HashMap<String, NodeId>,
    /// `consumers[i]` is the target of node `i`'s outgoing edge, if any.
    consumers: Vec<Option<NodeId>>,
    /// `producers[i]` lists the sources of node `i`'s incoming edges, ascending.
    producers: Vec<Vec<NodeId>>,
}

impl TaskGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// Nodes in ascending ID order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.iter()
    }

    /// Edges in ascending order of their producer's ID.
    pub fn edges(&self) -> impl Iterator<Item = GraphEdge> + '_ {
        self.consumers
            .iter()
            .enumerate()
            .filter_map(|(i, to)| to.map(|to| GraphEdge { from: NodeId::from_index(i), to }))
    }

    pub fn node(&self, id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(id.index())
    }

    pub fn node_by_name(&self, name: &str) -> Option<&GraphNode> {
        self.by_name.get(name).and_then(|&id| self.node(id))
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.consumers.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.consumer_of(from) == Some(to)
    }

    /// The single downstream consumer of `id`, if it has one.
    pub fn consumer_of(&self, id: NodeId) -> Option<NodeId> {
        self.consumers.get(id.index()).copied().flatten()
    }

    /// Producers feeding `id`, in ascending ID order. This is the order in
    /// which their results are handed to the consumer's `run`.
    pub fn producers_of(&self, id: NodeId) -> &[NodeId] {
        self.producers.get(id.index()).map(Vec::as_slice).unwrap_or_default()
    }

    /// Nodes without a consumer, in ascending ID order.
    pub fn sinks(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .map(|n| n.id)
            .filter(|&id| self.consumer_of(id).is_none())
            .collect()
    }

    fn successors(&self, id: NodeId) -> std::option::IntoIter<NodeId> {
        self.consumer_of(id).into_iter()
    }

    /// Whether the edge relation contains a directed cycle.
    ///
    /// Iterative depth-first search: a node is grey while it is on the
    /// current path and black once fully explored. Reaching a grey node
    /// again closes a cycle.
    pub fn has_cycles(&self) -> bool {
        let mut colour = vec![Colour::White; self.nodes.len()];

        for start in 0..self.nodes.len() {
            if colour[start] != Colour::White {
                continue;
            }

            let start = NodeId::from_index(start);
            colour[start.index()] = Colour::Grey;
            let mut stack = vec![(start, self.successors(start))];

            while let Some((node, successors)) = stack.last_mut() {
                let node = *node;
                match successors.next() {
                    Some(next) => match colour[next.index()] {
                        Colour::Grey => return true,
                        Colour::White => {
                            colour[next.index()] = Colour::Grey;
                            stack.push((next, self.successors(next)));
                        }
                        Colour::Black => {}
                    },
                    None => {
                        colour[node.index()] = Colour::Black;
                        stack.pop();
                    }
                }
            }
        }

        false
    }

    /// Decode every node into a [`Task`] wired to its consumer, returned so
    /// that each task's consumer appears before the task itself.
    ///
    /// Nodes are materialised in rounds: each round builds, in ascending ID
    /// order, every node whose consumer was built in the previous round.
    /// Sinks come first, sources last, and the same graph always yields the
    /// same sequence.
    ///
    /// # Errors
    /// - [`EngineError::Cycle`] if the graph is cyclic.
    /// - Any task decoding error, which aborts the whole compile.
    #[instrument(skip(self), fields(nodes = self.nodes.len()))]
    pub fn tasks_in_construction_order(&self) -> Result<Vec<Arc<Task>>, EngineError> {
        if self.has_cycles() {
            return Err(EngineError::Cycle);
        }

        let mut built: Vec<Option<Arc<Task>>> = vec![None; self.nodes.len()];
        let mut order: Vec<Arc<Task>> = Vec::with_capacity(self.nodes.len());
        let mut ready = self.sinks();

        while !ready.is_empty() {
            let mut next = Vec::new();
            for id in ready {
                let consumer = self.consumer_of(id).and_then(|c| built[c.index()].clone());
                let task = Arc::new(decode_task(&self.nodes[id.index()], consumer)?);
                debug!(task = %task.name(), task_type = %task.task_type(), "materialised task");

                built[id.index()] = Some(Arc::clone(&task));
                order.push(task);
                next.extend_from_slice(self.producers_of(id));
            }
            next.sort_unstable();
            ready = next;
        }

        // Nodes never reached from a sink wait on each other.
        if order.len() < self.nodes.len() {
            return Err(EngineError::Cycle);
        }

        Ok(order)
    }
}

impl FromStr for TaskGraph {
    type Err = EngineError;

    /// Decode a pipeline written in DOT notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::dot::decode(s)
    }
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use nodes::{BigDecimal, HttpMethod, JsonPath};

    pub(crate) const PIPELINE: &str = r#"
        // data source 1
        ds1          [type=bridge name=voter_turnout];
        ds1_parse    [type=jsonparse path="one,two"];
        ds1_multiply [type=multiply times=1.23];

        // data source 2
        ds2          [type=http method=GET url="https://chain.link/voter_turnout/USA-2020" requestData="{\"hi\": \"hello\"}"];
        ds2_parse    [type=jsonparse path="three,four"];
        ds2_multiply [type=multiply times=4.56];

        answer1 [type=median];

        ds1 -> ds1_parse -> ds1_multiply -> answer1;
        ds2 -> ds2_parse -> ds2_multiply -> answer1;

        answer2 [type=bridge name=election_winner];
    "#;

    fn attrs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn bridge(name: &str) -> BTreeMap<String, String> {
        attrs(&[("type", "bridge"), ("name", name)])
    }

    fn id(graph: &TaskGraph, name: &str) -> NodeId {
        graph.node_by_name(name).unwrap().id
    }

    #[test]
    fn adjacency_matches_declared_edges() {
        let graph: TaskGraph = PIPELINE.parse().expect("pipeline should decode");
        let names = [
            "ds1", "ds1_parse", "ds1_multiply", "ds2", "ds2_parse", "ds2_multiply", "answer1", "answer2",
        ];
        let expected = [
            ("ds1", "ds1_parse"),
            ("ds1_parse", "ds1_multiply"),
            ("ds1_multiply", "answer1"),
            ("ds2", "ds2_parse"),
            ("ds2_parse", "ds2_multiply"),
            ("ds2_multiply", "answer1"),
        ];

        assert_eq!(graph.node_count(), names.len());
        assert_eq!(graph.edge_count(), expected.len());
        for from in names {
            for to in names {
                let want = expected.contains(&(from, to));
                assert_eq!(graph.has_edge(id(&graph, from), id(&graph, to)), want, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn ids_follow_declaration_order() {
        let graph: TaskGraph = PIPELINE.parse().unwrap();
        let names: Vec<&str> = graph.nodes().map(|n| n.name.as_str()).collect();
        assert_eq!(names[0], "ds1");
        assert_eq!(names[7], "answer2");
        for (i, node) in graph.nodes().enumerate() {
            assert_eq!(node.id, NodeId(i as u64));
        }
    }

    #[test]
    fn producers_are_listed_by_ascending_id() {
        let graph: TaskGraph = PIPELINE.parse().unwrap();
        let producers = graph.producers_of(id(&graph, "answer1"));
        assert_eq!(producers, vec![id(&graph, "ds1_multiply"), id(&graph, "ds2_multiply")]);
        assert!(graph.producers_of(id(&graph, "ds1")).is_empty());
        assert_eq!(graph.sinks(), vec![id(&graph, "answer1"), id(&graph, "answer2")]);
    }

    #[test]
    fn producer_index_ignores_edge_declaration_order() {
        let mut builder = TaskGraph::builder();
        for name in ["p0", "p1", "p2", "p3", "sink"] {
            builder.node(name, bridge(name)).unwrap();
        }
        builder.edge("p3", "sink").edge("p0", "sink").edge("p2", "sink").edge("p1", "sink");
        let graph = builder.build().unwrap();

        let names: Vec<&str> = graph
            .producers_of(id(&graph, "sink"))
            .iter()
            .map(|&p| graph.node(p).unwrap().name.as_str())
            .collect();
        assert_eq!(names, vec!["p0", "p1", "p2", "p3"]);
        assert!(graph.producers_of(NodeId(99)).is_empty());
    }

    #[test]
    fn long_chain_compiles_sink_first() {
        const LEN: usize = 1_000;
        let mut builder = TaskGraph::builder();
        for i in 0..LEN {
            builder.node(format!("n{i}"), attrs(&[("type", "multiply"), ("times", "2")])).unwrap();
            if i > 0 {
                builder.edge(format!("n{}", i - 1), format!("n{i}"));
            }
        }
        let graph = builder.build().unwrap();

        let tasks = graph.tasks_in_construction_order().unwrap();
        assert_eq!(tasks.len(), LEN);
        assert_eq!(tasks[0].name(), format!("n{}", LEN - 1));
        assert_eq!(tasks[LEN - 1].name(), "n0");
        assert!(tasks.windows(2).all(|w| w[1].consumer().is_some_and(|c| Arc::ptr_eq(c, &w[0]))));
    }

    #[test]
    fn acyclic_pipeline_has_no_cycles() {
        let graph: TaskGraph = PIPELINE.parse().unwrap();
        assert!(!graph.has_cycles());
    }

    #[test]
    fn mutual_edge_is_a_cycle() {
        let graph: TaskGraph = r#"
            digraph {
                a [type=bridge];
                b [type=multiply times=1.23];
                a -> b -> a;
            }
        "#
        .parse()
        .unwrap();
        assert!(graph.has_cycles());
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let mut builder = TaskGraph::builder();
        builder.node("a", bridge("a")).unwrap();
        builder.edge("a", "a");
        assert!(builder.build().unwrap().has_cycles());
    }

    #[test]
    fn cycle_in_one_of_several_components_is_found() {
        let mut builder = TaskGraph::builder();
        for name in ["a", "b", "x", "y", "z", "lonely"] {
            builder.node(name, bridge(name)).unwrap();
        }
        builder.edge("a", "b").edge("x", "y").edge("y", "z").edge("z", "x");
        assert!(builder.build().unwrap().has_cycles());
    }

    #[test]
    fn graphs_without_edges_have_no_cycles() {
        assert!(!TaskGraph::builder().build().unwrap().has_cycles());

        let mut builder = TaskGraph::builder();
        builder.node("solo", bridge("solo")).unwrap();
        assert!(!builder.build().unwrap().has_cycles());
    }

    #[test]
    fn duplicate_node_name_is_rejected() {
        let mut builder = TaskGraph::builder();
        builder.node("a", bridge("a")).unwrap();
        assert_eq!(builder.node("a", bridge("a")), Err(EngineError::DuplicateNode("a".into())));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let mut builder = TaskGraph::builder();
        builder.node("a", bridge("a")).unwrap();
        builder.edge("a", "ghost");
        assert!(matches!(
            builder.build(),
            Err(EngineError::UnknownNodeReference { name, side: "to" }) if name == "ghost"
        ));
    }

    #[test]
    fn second_consumer_is_rejected_but_repeated_edge_is_not() {
        let mut builder = TaskGraph::builder();
        for name in ["a", "b", "c"] {
            builder.node(name, bridge(name)).unwrap();
        }
        builder.edge("a", "b").edge("a", "b");
        assert!(builder.build().is_ok());

        let mut builder = TaskGraph::builder();
        for name in ["a", "b", "c"] {
            builder.node(name, bridge(name)).unwrap();
        }
        builder.edge("a", "b").edge("a", "c");
        assert!(matches!(builder.build(), Err(EngineError::MultipleConsumers { node, .. }) if node == "a"));
    }

    #[test]
    fn consumers_precede_their_producers() {
        let graph: TaskGraph = PIPELINE.parse().unwrap();
        let tasks = graph.tasks_in_construction_order().expect("should compile");

        assert_eq!(tasks.len(), graph.node_count());
        for (i, task) in tasks.iter().enumerate() {
            if let Some(consumer) = task.consumer() {
                assert!(
                    tasks[..i].iter().any(|t| Arc::ptr_eq(t, consumer)),
                    "consumer of {} must come first",
                    task.name()
                );
            }
        }
    }

    #[test]
    fn compiled_tasks_match_their_declarations() {
        let graph: TaskGraph = PIPELINE.parse().unwrap();
        let tasks = graph.tasks_in_construction_order().unwrap();
        let by_name: HashMap<&str, &Arc<Task>> = tasks.iter().map(|t| (t.name(), t)).collect();
        let consumer_name = |name: &str| by_name[name].consumer().map(|c| c.name().to_owned());

        assert_eq!(by_name.len(), 8);

        assert!(matches!(by_name["ds1"].kind(), TaskKind::Bridge(b) if b.name == "voter_turnout"));
        assert_eq!(consumer_name("ds1").as_deref(), Some("ds1_parse"));

        let TaskKind::JsonParse(parse) = by_name["ds1_parse"].kind() else { panic!("ds1_parse kind") };
        assert_eq!(parse.path, ["one", "two"].into_iter().collect::<JsonPath>());
        assert_eq!(consumer_name("ds1_parse").as_deref(), Some("ds1_multiply"));

        let TaskKind::Multiply(mul) = by_name["ds1_multiply"].kind() else { panic!("ds1_multiply kind") };
        assert_eq!(mul.times, "1.23".parse::<BigDecimal>().unwrap());
        assert_eq!(consumer_name("ds1_multiply").as_deref(), Some("answer1"));

        let TaskKind::Http(http) = by_name["ds2"].kind() else { panic!("ds2 kind") };
        assert_eq!(http.url, "https://chain.link/voter_turnout/USA-2020");
        assert_eq!(http.method, HttpMethod::Get);
        assert_eq!(
            http.request_data.as_ref().and_then(|d| d.get("hi")),
            Some(&serde_json::json!("hello"))
        );

        let TaskKind::Multiply(mul) = by_name["ds2_multiply"].kind() else { panic!("ds2_multiply kind") };
        assert_eq!(mul.times, "4.56".parse::<BigDecimal>().unwrap());

        assert!(matches!(by_name["answer1"].kind(), TaskKind::Median(_)));
        assert!(by_name["answer1"].consumer().is_none());
        assert!(matches!(by_name["answer2"].kind(), TaskKind::Bridge(b) if b.name == "election_winner"));
        assert!(by_name["answer2"].consumer().is_none());
    }

    #[test]
    fn both_fan_in_branches_share_one_consumer() {
        let graph: TaskGraph = PIPELINE.parse().unwrap();
        let tasks = graph.tasks_in_construction_order().unwrap();
        let find = |name: &str| tasks.iter().find(|t| t.name() == name).unwrap();

        let left = find("ds1_multiply").consumer().unwrap();
        let right = find("ds2_multiply").consumer().unwrap();
        assert!(Arc::ptr_eq(left, right));
        assert!(Arc::ptr_eq(left, find("answer1")));
    }

    #[test]
    fn construction_order_is_deterministic() {
        let order = |text: &str| -> Vec<String> {
            let graph: TaskGraph = text.parse().unwrap();
            graph
                .tasks_in_construction_order()
                .unwrap()
                .iter()
                .map(|t| t.name().to_owned())
                .collect()
        };

        let first = order(PIPELINE);
        assert_eq!(
            first,
            vec![
                "answer1", "answer2", "ds1_multiply", "ds2_multiply", "ds1_parse", "ds2_parse", "ds1", "ds2",
            ]
        );
        for _ in 0..5 {
            assert_eq!(order(PIPELINE), first);
        }
    }

    #[test]
    fn cyclic_graph_does_not_compile() {
        let graph: TaskGraph = "a [type=bridge name=a]; b [type=median]; a -> b -> a;".parse().unwrap();
        assert_eq!(graph.tasks_in_construction_order().unwrap_err(), EngineError::Cycle);
    }

    #[test]
    fn task_decode_error_aborts_compile() {
        let graph: TaskGraph = "a [type=bridge name=a]; b [type=teleport]; a -> b;".parse().unwrap();
        assert!(matches!(
            graph.tasks_in_construction_order(),
            Err(EngineError::UnknownTaskType { node, task_type }) if node == "b" && task_type == "teleport"
        ));
    }
}
