//! The response merger: combines a local and a remote response of the same
//! kind, preserving local-first ordering and associativity/idempotence on disjoint keys.

use indexmap::IndexMap;

use crate::requests::{
    BulkVariableInfoResponse, EventResponse, NodeResponse, ObservationResponse, ResolveResponse,
    SearchStatVarResponse,
};

/// Resolve: merge per-`node` candidates, preserving local order and appending remote
/// candidates not already present.
pub fn merge_resolve(local: &ResolveResponse, remote: &ResolveResponse) -> ResolveResponse {
    let mut candidates = local.candidates.clone();
    for (node, remote_list) in &remote.candidates {
        let entry = candidates.entry(node.clone()).or_default();
        for candidate in remote_list {
            if !entry.contains(candidate) {
                entry.push(candidate.clone());
            }
        }
    }
    ResolveResponse { candidates }
}

/// Node: merge arcs per `(dcid, property)` by concatenation preserving local order; merge
/// pagination tokens keeping the local cursor primary and nesting the remote cursor in
/// `remotePaginationInfo`.
pub fn merge_node(local: &NodeResponse, remote: &NodeResponse) -> NodeResponse {
    let mut arcs = local.arcs.clone();
    for (key, values) in &remote.arcs {
        arcs.entry(key.clone()).or_default().extend(values.iter().cloned());
    }

    let remote_pagination_info = remote.pagination_token.as_ref().map(|token| {
        Box::new(NodeResponse {
            arcs: IndexMap::new(),
            pagination_token: Some(token.clone()),
            remote_pagination_info: None,
        })
    });

    NodeResponse {
        arcs,
        pagination_token: local.pagination_token.clone(),
        remote_pagination_info,
    }
}

/// Observation: union of `variable → entity → faceted-series`; within an entity,
/// concatenate facets preserving local order; if either side is empty, yield the other
/// verbatim.
pub fn merge_observation(local: &ObservationResponse, remote: &ObservationResponse) -> ObservationResponse {
    if local.data.is_empty() {
        return remote.clone();
    }
    if remote.data.is_empty() {
        return local.clone();
    }
    let mut data = local.data.clone();
    for (variable, entities) in &remote.data {
        let entity_map = data.entry(variable.clone()).or_default();
        for (entity, facets) in entities {
            entity_map.entry(entity.clone()).or_default().extend(facets.iter().cloned());
        }
    }
    ObservationResponse { data }
}

/// Event: concatenate event lists, union provenance maps (local wins on key conflict, the
/// same local-first convention every other merge rule follows), union date lists with
/// duplicates removed.
pub fn merge_event(local: &EventResponse, remote: &EventResponse) -> EventResponse {
    let mut events = local.events.clone();
    events.extend(remote.events.iter().cloned());

    let mut provenance = remote.provenance.clone();
    provenance.extend(local.provenance.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut dates = local.dates.clone();
    for date in &remote.dates {
        if !dates.contains(date) {
            dates.push(date.clone());
        }
    }

    EventResponse {
        events,
        provenance,
        dates,
    }
}

/// BulkVariableInfo: union by id, local wins on duplicates.
pub fn merge_bulk_variable_info(
    local: &BulkVariableInfoResponse,
    remote: &BulkVariableInfoResponse,
) -> BulkVariableInfoResponse {
    let mut by_id = remote.by_id.clone();
    by_id.extend(local.by_id.iter().map(|(k, v)| (k.clone(), v.clone())));
    BulkVariableInfoResponse { by_id }
}

/// SearchStatVar: union by id (local wins on duplicates); matches list is a set-union
/// preserving local order.
pub fn merge_search_stat_var(
    local: &SearchStatVarResponse,
    remote: &SearchStatVarResponse,
) -> SearchStatVarResponse {
    let mut by_id = remote.by_id.clone();
    by_id.extend(local.by_id.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut matches = local.matches.clone();
    for m in &remote.matches {
        if !matches.contains(m) {
            matches.push(m.clone());
        }
    }

    SearchStatVarResponse { by_id, matches }
}
