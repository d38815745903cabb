use super::model::{Model, TypeId, TypeRef};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

#[cfg(feature = "layout_graph_trace")]
fn trace_log(msg: impl AsRef<str>) {
    eprintln!("[layout_graph] {}", msg.as_ref());
}

#[cfg(not(feature = "layout_graph_trace"))]
fn trace_log(_msg: impl AsRef<str>) {}

/// Type dependencies that constrain layout order: a type is laid out after its
/// base and after every user type it embeds as an attribute.
#[derive(Debug)]
pub struct LayoutGraph {
    nodes: BTreeMap<TypeId, LayoutGraphNode>,
}

#[derive(Debug, Clone)]
pub struct LayoutGraphNode {
    pub id: TypeId,
    pub name: String,
    pub deps: BTreeSet<TypeId>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutGraphError {
    #[error("circular layout dependency: {0:?}")]
    CircularDependency(Vec<String>),
}

impl LayoutGraph {
    pub fn build(model: &Model) -> Self {
        let mut nodes = BTreeMap::new();
        for id in model.type_ids() {
            let ty = model.ty(id);
            let mut deps = BTreeSet::new();
            if let Some(base) = ty.base {
                deps.insert(base);
            }
            for attr in &ty.attributes {
                if let TypeRef::Type(target) = model.attr(*attr).ty {
                    deps.insert(target);
                }
            }
            // A type embedding itself keeps its self edge and never reaches in-degree zero.
            nodes.insert(
                id,
                LayoutGraphNode {
                    id,
                    name: model.type_path(id),
                    deps,
                },
            );
        }
        Self { nodes }
    }

    /// Deterministic topological ordering using Kahn's algorithm.
    pub fn topo_order(&self) -> Result<Vec<TypeId>, LayoutGraphError> {
        let mut in_degree: BTreeMap<TypeId, usize> = BTreeMap::new();
        let mut adjacency: BTreeMap<TypeId, Vec<TypeId>> = BTreeMap::new();

        for (id, node) in &self.nodes {
            in_degree.entry(*id).or_insert(0);
            for dep in &node.deps {
                adjacency.entry(*dep).or_default().push(*id);
                *in_degree.entry(*id).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<TypeId> = in_degree
            .iter()
            .filter_map(|(id, degree)| if *degree == 0 { Some(*id) } else { None })
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(id) = queue.pop_front() {
            trace_log(format!("processing node {}", self.name(id)));
            order.push(id);

            if let Some(children) = adjacency.get(&id) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            trace_log(format!("enqueue {}", self.name(*child)));
                            queue.push_back(*child);
                        }
                    }
                }
            }
        }

        if order.len() == self.nodes.len() {
            Ok(order)
        } else {
            let cycle: Vec<String> = in_degree
                .into_iter()
                .filter_map(|(id, degree)| if degree > 0 { Some(self.name(id).to_string()) } else { None })
                .collect();
            Err(LayoutGraphError::CircularDependency(cycle))
        }
    }

    fn name(&self, id: TypeId) -> &str {
        self.nodes.get(&id).map(|n| n.name.as_str()).unwrap_or("?")
    }
}
