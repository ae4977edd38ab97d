use std::collections::HashMap;

use self::osm::{Node, OsmId, Way};

pub mod document;
pub mod osm;

/// Map data as defined in the .osm file. Nodes are keyed by id, ways are kept
/// in document order so everything derived from them is deterministic.

#[derive(Debug, Default, Clone)]
pub struct OsmMapData {
    pub nodes: HashMap<OsmId, Node>,
    pub ways: Vec<Way>,
    way_index: HashMap<OsmId, usize>,
}

impl OsmMapData {
    pub fn new(nodes: HashMap<OsmId, Node>, ways: Vec<Way>) -> OsmMapData {
        let way_index = ways.iter()
            .enumerate()
            .map(|(idx, way)| (way.id.clone(), idx))
            .collect();
        OsmMapData {
            nodes,
            ways,
            way_index,
        }
    }

    pub fn way(&self, id: &str) -> Option<&Way> {
        self.way_index.get(id).map(|idx| &self.ways[*idx])
    }

    pub fn has_tag(&self, id: &str) -> bool {
        self.way(id).map(|way| way.has_tag).unwrap_or(false)
    }

    /// Way id to ordered node ids, in document order.
    pub fn way_nodes(&self) -> impl Iterator<Item = (&OsmId, &[OsmId])> {
        self.ways.iter().map(|way| (&way.id, way.node_ids.as_slice()))
    }
}
