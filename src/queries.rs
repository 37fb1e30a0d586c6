//! Candidate query generation.

use crate::models::Query;
use itertools::Itertools;
use rand::rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Build every distinct `"{entity} {phrase}"` query, in random order.
///
/// Duplicated phrases under one entity collapse into a single query. The
/// shuffle keeps the upstream from seeing the same scan order every run.
/// An empty mapping yields an empty list; callers decide whether that is fatal.
#[instrument(level = "info", skip_all, fields(entities = entities.len()))]
pub fn generate_queries(entities: &BTreeMap<String, Vec<String>>) -> Vec<Query> {
    let mut queries: Vec<Query> = entities
        .iter()
        .flat_map(|(entity, phrases)| {
            phrases
                .iter()
                .map(move |phrase| (entity.trim(), phrase.trim()))
        })
        .filter(|(entity, phrase)| !entity.is_empty() && !phrase.is_empty())
        .unique()
        .map(|(entity, phrase)| Query::new(entity, phrase))
        .collect();

    queries.shuffle(&mut rng());
    debug!(count = queries.len(), "Generated candidate queries");
    queries
}
