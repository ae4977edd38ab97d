use std::collections::HashMap;

use log::warn;

use crate::data::osm::{compare_ids, OsmId};

/// Two or more ways whose node ids form the same set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateClass {
    pub way_ids: Vec<OsmId>,
}

impl DuplicateClass {
    pub fn len(&self) -> usize {
        self.way_ids.len()
    }
}

/// Groups ways by their node id set. Classes come out in order of first
/// appearance, members in input order; singletons are dropped.
pub fn find_duplicate_way_sets<'a, I>(way_nodes: I) -> Vec<DuplicateClass>
where
    I: IntoIterator<Item = (&'a OsmId, &'a [OsmId])>,
{
    let mut group_by_key: HashMap<Vec<&'a str>, usize> = HashMap::new();
    let mut groups: Vec<(bool, Vec<OsmId>)> = Vec::new();

    for (way_id, node_ids) in way_nodes {
        let mut key: Vec<&str> = node_ids.iter().map(|id| id.as_str()).collect();
        key.sort_unstable();
        key.dedup();

        let is_empty = key.is_empty();
        match group_by_key.get(&key) {
            Some(idx) => groups[*idx].1.push(way_id.clone()),
            None => {
                group_by_key.insert(key, groups.len());
                groups.push((is_empty, vec![way_id.clone()]));
            },
        }
    }

    groups.into_iter()
        .filter(|(_, way_ids)| way_ids.len() > 1)
        .map(|(is_empty, way_ids)| {
            if is_empty {
                warn!(ways = way_ids.join(",").as_str(); "Ways without nodes grouped as duplicates");
            }
            DuplicateClass { way_ids }
        })
        .collect()
}

/// Reverse index from way id to its duplicate class.
pub struct DuplicateIndex<'a> {
    classes: &'a [DuplicateClass],
    class_of: HashMap<&'a str, usize>,
}

impl<'a> DuplicateIndex<'a> {
    pub fn new(classes: &'a [DuplicateClass]) -> DuplicateIndex<'a> {
        let mut class_of = HashMap::new();
        for (idx, class) in classes.iter().enumerate() {
            for way_id in &class.way_ids {
                class_of.insert(way_id.as_str(), idx);
            }
        }
        DuplicateIndex {
            classes,
            class_of,
        }
    }

    pub fn class_of(&self, way_id: &str) -> Option<&'a DuplicateClass> {
        self.class_of.get(way_id).map(|idx| &self.classes[*idx])
    }

    /// The other members of the class containing `way_id`, smallest id first.
    pub fn others(&self, way_id: &str) -> Option<Vec<&'a OsmId>> {
        let class = self.class_of(way_id)?;
        let mut others: Vec<&OsmId> = class.way_ids.iter()
            .filter(|id| id.as_str() != way_id)
            .collect();
        others.sort_by(|a, b| compare_ids(a, b));
        Some(others)
    }

    /// One other member of the class: the smallest remaining id.
    pub fn counterpart(&self, way_id: &str) -> Option<&'a OsmId> {
        self.others(way_id)?.into_iter().next()
    }
}
