use std::collections::BTreeMap;
use std::fmt;

use super::entity::EntityId;
use super::ContextId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueryId(pub u32);

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "query{}", self.0)
    }
}

#[derive(Debug, Default)]
struct GraphState {
    listener: Option<ContextId>,
    current_input: Option<(String, String)>,
    pending: Option<QueryId>,
}

/// Animation graph front-end: inputs are acknowledged asynchronously through
/// query ids, completions are routed to the single registered listener per
/// graph. Entities without an installed graph reject every call, which the
/// sequencer treats as "advance immediately".
#[derive(Debug, Default)]
pub(super) struct AnimationSystem {
    graphs: BTreeMap<EntityId, GraphState>,
    next_query: u32,
}

impl AnimationSystem {
    pub(super) fn install_graph(&mut self, entity: EntityId) {
        self.graphs.entry(entity).or_default();
    }

    pub(super) fn has_graph(&self, entity: EntityId) -> bool {
        self.graphs.contains_key(&entity)
    }

    pub(super) fn add_listener(&mut self, entity: EntityId, context: ContextId) -> bool {
        match self.graphs.get_mut(&entity) {
            Some(graph) => {
                graph.listener = Some(context);
                true
            }
            None => false,
        }
    }

    pub(super) fn remove_listener(&mut self, entity: EntityId, context: ContextId) {
        if let Some(graph) = self.graphs.get_mut(&entity) {
            if graph.listener == Some(context) {
                graph.listener = None;
            }
        }
    }

    pub(super) fn listener(&self, entity: EntityId) -> Option<ContextId> {
        self.graphs.get(&entity).and_then(|graph| graph.listener)
    }

    fn alloc_query(&mut self) -> QueryId {
        self.next_query += 1;
        QueryId(self.next_query)
    }

    pub(super) fn set_input(
        &mut self,
        entity: EntityId,
        name: &str,
        value: &str,
    ) -> Option<QueryId> {
        if !self.graphs.contains_key(&entity) {
            return None;
        }
        let query = self.alloc_query();
        let graph = self.graphs.get_mut(&entity)?;
        graph.current_input = Some((name.to_string(), value.to_string()));
        graph.pending = Some(query);
        Some(query)
    }

    pub(super) fn query_leave_state(&mut self, entity: EntityId) -> Option<QueryId> {
        let query = self.alloc_query();
        let graph = self.graphs.get_mut(&entity)?;
        graph.pending = Some(query);
        Some(query)
    }

    pub(super) fn query_change_input(&mut self, entity: EntityId, _name: &str) -> Option<QueryId> {
        let query = self.alloc_query();
        let graph = self.graphs.get_mut(&entity)?;
        graph.pending = Some(query);
        Some(query)
    }

    pub(super) fn pending_query(&self, entity: EntityId) -> Option<QueryId> {
        self.graphs.get(&entity).and_then(|graph| graph.pending)
    }

    pub(super) fn current_input(&self, entity: EntityId) -> Option<(&str, &str)> {
        self.graphs
            .get(&entity)
            .and_then(|graph| graph.current_input.as_ref())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Driver side: acknowledge the pending query, reporting who must hear
    /// about it and which query it was.
    pub(super) fn complete_query(&mut self, entity: EntityId) -> Option<(ContextId, QueryId)> {
        let graph = self.graphs.get_mut(&entity)?;
        let query = graph.pending.take()?;
        let listener = graph.listener?;
        Some((listener, query))
    }

    /// Driver side: tear down the graph, reporting the orphaned listener.
    pub(super) fn destroy_graph(&mut self, entity: EntityId) -> Option<ContextId> {
        self.graphs
            .remove(&entity)
            .and_then(|graph| graph.listener)
    }
}
