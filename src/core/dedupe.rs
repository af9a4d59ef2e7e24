use crate::domain::model::CanonicalLeg;
use std::collections::HashMap;

/// Collapse a batch to one record per id.
///
/// Later occurrences win (a re-listing within the same run carries fresher
/// fields), while output order preserves the first time each id was seen so
/// persistence stays deterministic.
pub fn dedupe_by_id(legs: Vec<CanonicalLeg>) -> Vec<CanonicalLeg> {
    let mut order: Vec<String> = Vec::with_capacity(legs.len());
    let mut latest: HashMap<String, CanonicalLeg> = HashMap::with_capacity(legs.len());

    for leg in legs {
        if !latest.contains_key(&leg.id) {
            order.push(leg.id.clone());
        }
        latest.insert(leg.id.clone(), leg);
    }

    order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .collect()
}
