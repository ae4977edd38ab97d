use std::collections::HashSet;

use crate::data::document::{OsmDocument, XmlNode};

/// Drops every top-level `way` element whose id is in `removals`, children
/// included. Returns how many elements were removed.
pub fn remove_ways(document: &mut OsmDocument, removals: &HashSet<&str>) -> usize {
    let before = document.root.children.len();
    document.root.children.retain(|child| match child {
        XmlNode::Element(el) if el.name == "way" => {
            !el.attr("id").map(|id| removals.contains(id)).unwrap_or(false)
        },
        _ => true,
    });
    before - document.root.children.len()
}

/// `(relation id, way ref)` for every way member pointing at a way that is
/// not in the document.
pub fn dangling_way_members(document: &OsmDocument) -> Vec<(String, String)> {
    let way_ids: HashSet<&str> = document.elements("way")
        .filter_map(|way| way.attr("id"))
        .collect();

    let mut dangling = Vec::new();
    for relation in document.elements("relation") {
        for member in relation.children_named("member") {
            if member.attr("type") != Some("way") {
                continue;
            }
            if let Some(way_ref) = member.attr("ref") {
                if !way_ids.contains(way_ref) {
                    dangling.push((relation.attr("id").unwrap_or("?").to_string(), way_ref.to_string()));
                }
            }
        }
    }
    dangling
}
