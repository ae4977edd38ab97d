use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::data::document::OsmDocument;
use crate::data::osm::OsmId;

use super::duplicates::{DuplicateClass, DuplicateIndex};

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RelationRepair {
    /// Way ids to excise, in the order they were decided.
    pub removals: Vec<OsmId>,
    pub rewritten_members: usize,
    pub skipped_members: usize,
}

impl RelationRepair {
    pub fn removal_set(&self) -> HashSet<&str> {
        self.removals.iter().map(|id| id.as_str()).collect()
    }
}

/// Points way members of every relation at the tagged twin of a duplicate
/// and records the untagged one for removal. Way elements are not touched.
///
/// Decisions are settled over all relations first. A way that has been
/// chosen as survivor is never removed afterwards, and every reference to a
/// removed way, earlier or later in the document, follows the same survivor.
pub fn process_relation_ways<F>(
    document: &mut OsmDocument,
    classes: &[DuplicateClass],
    has_tag: F,
) -> RelationRepair
where
    F: Fn(&str) -> bool,
{
    let index = DuplicateIndex::new(classes);
    let mut repair = RelationRepair::default();
    let mut survivor_of: HashMap<OsmId, OsmId> = HashMap::new();
    let mut survivors: HashSet<OsmId> = HashSet::new();

    for relation in document.elements("relation") {
        let relation_id = relation.attr("id").unwrap_or("?");

        for member in relation.children_named("member") {
            if member.attr("type") != Some("way") {
                continue;
            }
            let way_ref = match member.attr("ref") {
                Some(way_ref) => way_ref,
                None => {
                    warn!(relation = relation_id; "Skipping way member without a ref");
                    repair.skipped_members += 1;
                    continue;
                },
            };
            if survivor_of.contains_key(way_ref) || survivors.contains(way_ref) {
                continue;
            }

            let counterpart = match index.counterpart(way_ref) {
                Some(counterpart) => counterpart,
                None => continue,
            };
            let survivor = survivor_of.get(counterpart).unwrap_or(counterpart).clone();
            if !has_tag(&survivor) {
                continue;
            }

            debug!(relation = relation_id, from = way_ref, to = survivor.as_str(); "Redirecting way member");
            repair.removals.push(way_ref.to_string());
            survivors.insert(survivor.clone());
            survivor_of.insert(way_ref.to_string(), survivor);
        }
    }

    for relation in document.elements_mut("relation") {
        for member in relation.children_named_mut("member") {
            if member.attr("type") != Some("way") {
                continue;
            }
            let survivor = match member.attr("ref").and_then(|way_ref| survivor_of.get(way_ref)) {
                Some(survivor) => survivor,
                None => continue,
            };
            member.set_attr("ref", survivor);
            repair.rewritten_members += 1;
        }
    }

    repair
}
