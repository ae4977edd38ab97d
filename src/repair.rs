pub mod duplicates;
pub mod prune;
pub mod relations;

use std::collections::HashSet;

use log::info;

use crate::data::OsmMapData;
use crate::data::document::OsmDocument;
use crate::data::osm::OsmId;
use crate::errors::{Error, ErrorKind, Result};

use self::duplicates::DuplicateClass;
use self::prune::{dangling_way_members, remove_ways};
use self::relations::process_relation_ways;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct RepairReport {
    pub duplicate_sets: usize,
    pub duplicate_ways: usize,
    pub rewritten_members: usize,
    pub skipped_members: usize,
    pub removed_ways: Vec<OsmId>,
}

impl RepairReport {
    pub fn for_classes(classes: &[DuplicateClass]) -> RepairReport {
        RepairReport {
            duplicate_sets: classes.len(),
            duplicate_ways: classes.iter().map(|class| class.len()).sum(),
            ..RepairReport::default()
        }
    }
}

/// Rewrites relation members, then prunes the ways nothing points at any more.
/// Fails if pruning left a way member pointing at a way that was there before.
pub fn repair_document(
    document: &mut OsmDocument,
    data: &OsmMapData,
    classes: &[DuplicateClass],
) -> Result<RepairReport> {
    let dangling_before: HashSet<(String, String)> = dangling_way_members(document).into_iter().collect();

    let relation_repair = process_relation_ways(document, classes, |id| data.has_tag(id));
    let removed = remove_ways(document, &relation_repair.removal_set());
    info!(
        rewritten = relation_repair.rewritten_members,
        removed = removed,
        skipped = relation_repair.skipped_members;
        "Relations repaired"
    );

    let broken: Vec<String> = dangling_way_members(document).into_iter()
        .filter(|member| !dangling_before.contains(member))
        .map(|(relation, way_ref)| format!("relation {} -> way {}", relation, way_ref))
        .collect();
    if !broken.is_empty() {
        return Err(Error::new(
            ErrorKind::Repair,
            format!("pruning left dangling members: {}", broken.join(", ")),
        ));
    }

    Ok(RepairReport {
        rewritten_members: relation_repair.rewritten_members,
        skipped_members: relation_repair.skipped_members,
        removed_ways: relation_repair.removals,
        ..RepairReport::for_classes(classes)
    })
}
