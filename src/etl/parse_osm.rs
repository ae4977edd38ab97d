use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::debug;
use xz::bufread::XzDecoder;

use crate::data::OsmMapData;
use crate::data::document::{Element, OsmDocument};
use crate::data::osm::{MapCoords, Node, OsmId, Way};
use crate::errors::{Error, ErrorKind, Result};

pub const OSM_EXTENSION: &str = ".osm";
pub const OSM_XZ_EXTENSION: &str = ".osm.xz";

pub fn is_osm_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.ends_with(OSM_EXTENSION) || name.ends_with(OSM_XZ_EXTENSION))
        .unwrap_or(false)
}

/// File name without the `.osm` / `.osm.xz` suffix.
pub fn osm_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(OSM_XZ_EXTENSION)
        .or_else(|| name.strip_suffix(OSM_EXTENSION))
}

fn create_osm_reader(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = fs::File::open(path)?;
    let file_reader = BufReader::new(file);
    if path.extension().map(|ext| ext == "xz").unwrap_or(false) {
        let xz_reader = XzDecoder::new(file_reader);
        Ok(Box::new(BufReader::new(xz_reader)))
    } else {
        Ok(Box::new(file_reader))
    }
}

pub fn read_document(path: &Path) -> Result<OsmDocument> {
    if !is_osm_file(path) {
        return Err(Error::new(ErrorKind::InvalidInput, format!("{} is not a .osm file", path.display())));
    }
    let reader = create_osm_reader(path)
        .map_err(|err| err.context(path.display()))?;
    let document = OsmDocument::from_reader(reader)
        .map_err(|err| err.context(format!("Error parsing {}", path.display())))?;
    if document.root.name != "osm" {
        return Err(Error::new(
            ErrorKind::Parse,
            format!("Error parsing {}: root element is <{}>, expected <osm>", path.display(), document.root.name),
        ));
    }
    Ok(document)
}

fn required_attr<'a>(el: &'a Element, key: &str, owner: &str) -> Result<&'a str> {
    el.attr(key).ok_or_else(|| Error::new(
        ErrorKind::MissingAttribute,
        format!("{} is missing the '{}' attribute", owner, key),
    ))
}

fn parse_coordinate(el: &Element, key: &str, id: &str) -> Result<f64> {
    let value = required_attr(el, key, &format!("node {}", id))?;
    value.trim().parse()
        .map_err(|err: std::num::ParseFloatError| Error::from(err).context(format!("node {} has invalid {} '{}'", id, key, value)))
}

fn parse_node(el: &Element) -> Result<Node> {
    let id = required_attr(el, "id", "node")?;
    Ok(Node {
        id: id.to_string(),
        lat: parse_coordinate(el, "lat", id)?,
        lon: parse_coordinate(el, "lon", id)?,
    })
}

pub fn parse_nodes(document: &OsmDocument) -> Result<HashMap<OsmId, Node>> {
    let mut nodes = HashMap::new();
    for el in document.elements("node") {
        let node = parse_node(el)?;
        nodes.insert(node.id.clone(), node);
    }
    debug!(nodes = nodes.len(); "Parsed nodes");
    Ok(nodes)
}

fn parse_way(el: &Element, nodes: &HashMap<OsmId, Node>) -> Result<Way> {
    let id = required_attr(el, "id", "way")?;
    let owner = format!("way {}", id);

    let mut node_ids = Vec::new();
    let mut geometry = Vec::new();
    for nd in el.children_named("nd") {
        let node_ref = required_attr(nd, "ref", &owner)?;
        let node = nodes.get(node_ref).ok_or_else(|| Error::new(
            ErrorKind::MissingNodeReference,
            format!("{} references node {} which is not in the document", owner, node_ref),
        ))?;
        node_ids.push(node_ref.to_string());
        geometry.push(MapCoords::from(node));
    }

    let tag_keys: Vec<&str> = el.children_named("tag")
        .filter_map(|tag| tag.attr("k"))
        .collect();

    Ok(Way {
        id: id.to_string(),
        node_ids,
        has_tag: el.children_named("tag").next().is_some(),
        tags: tag_keys.join(", "),
        geometry,
    })
}

pub fn parse_ways(document: &OsmDocument, nodes: &HashMap<OsmId, Node>) -> Result<Vec<Way>> {
    let mut ways = Vec::new();
    let mut seen = HashSet::new();
    for el in document.elements("way") {
        let way = parse_way(el, nodes)?;
        if !seen.insert(way.id.clone()) {
            return Err(Error::new(ErrorKind::Parse, format!("way {} appears more than once", way.id)));
        }
        ways.push(way);
    }
    debug!(ways = ways.len(); "Parsed ways");
    Ok(ways)
}

pub fn build_map_data(document: &OsmDocument) -> Result<OsmMapData> {
    let nodes = parse_nodes(document)
        .map_err(|err| err.context("Error processing nodes"))?;
    let ways = parse_ways(document, &nodes)
        .map_err(|err| err.context("Error processing ways"))?;
    Ok(OsmMapData::new(nodes, ways))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;

    const OSM_SAMPLE: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<osm version="0.6" generator="test">
  <bounds minlat="0.0" minlon="0.0" maxlat="1.0" maxlon="1.0" />
  <node id="1" lat="0.0" lon="0.0" />
  <node id="2" lat="0.0" lon="1.0" />
  <node id="3" lat="1.0" lon="1.0" />
  <way id="10">
    <nd ref="1" />
    <nd ref="2" />
    <nd ref="3" />
    <tag k="highway" v="residential" />
    <tag k="name" v="Main Street" />
  </way>
  <way id="11">
    <nd ref="3" />
    <nd ref="1" />
  </way>
</osm>
"#;

    #[test]
    fn builds_node_and_way_tables() {
        let document = OsmDocument::parse_str(OSM_SAMPLE).unwrap();
        let data = build_map_data(&document).unwrap();

        assert_eq!(data.nodes.len(), 3);
        assert_eq!(data.nodes["2"].lon, 1.0);

        let main_street = data.way("10").unwrap();
        assert_eq!(main_street.node_ids, vec!["1", "2", "3"]);
        assert!(main_street.has_tag);
        assert_eq!(main_street.tags, "highway, name");
        assert_eq!(main_street.geometry[1], MapCoords { lat: 0.0, lon: 1.0 });

        let untagged = data.way("11").unwrap();
        assert!(!untagged.has_tag);
        assert_eq!(untagged.tags, "");
        assert!(!data.has_tag("11"));
        assert!(!data.has_tag("404"));
    }

    #[test]
    fn missing_node_is_an_explicit_error() {
        let xml = r#"<osm><node id="1" lat="0" lon="0"/><way id="5"><nd ref="1"/><nd ref="2"/></way></osm>"#;
        let document = OsmDocument::parse_str(xml).unwrap();
        let err = build_map_data(&document).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingNodeReference);
        assert!(err.message.contains("way 5"));
        assert!(err.message.contains("node 2"));
    }

    #[test]
    fn bad_coordinates_are_parse_errors() {
        let xml = r#"<osm><node id="1" lat="north" lon="0"/></osm>"#;
        let document = OsmDocument::parse_str(xml).unwrap();
        let err = parse_nodes(&document).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("node 1"));
    }

    #[test]
    fn node_without_id_is_rejected() {
        let xml = r#"<osm><node lat="0" lon="0"/></osm>"#;
        let document = OsmDocument::parse_str(xml).unwrap();
        let err = parse_nodes(&document).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingAttribute);
    }

    #[test]
    fn repeated_way_id_is_rejected() {
        let xml = r#"<osm><way id="5"/><way id="5"/></osm>"#;
        let document = OsmDocument::parse_str(xml).unwrap();
        assert!(build_map_data(&document).is_err());
    }

    #[test]
    fn recognises_osm_file_names() {
        assert!(is_osm_file(&PathBuf::from("data/city.osm")));
        assert!(is_osm_file(&PathBuf::from("city.osm.xz")));
        assert!(!is_osm_file(&PathBuf::from("city.pbf")));
        assert!(!is_osm_file(&PathBuf::from("city.osm.bak")));
        assert_eq!(osm_stem(&PathBuf::from("a/city.osm")), Some("city"));
        assert_eq!(osm_stem(&PathBuf::from("city.osm.xz")), Some("city"));
    }

    #[test]
    fn read_document_checks_extension_and_root() {
        let dir = tempdir().unwrap();

        let wrong_ext = dir.path().join("city.xml");
        fs::write(&wrong_ext, OSM_SAMPLE).unwrap();
        assert_eq!(read_document(&wrong_ext).unwrap_err().kind, ErrorKind::InvalidInput);

        let wrong_root = dir.path().join("other.osm");
        fs::write(&wrong_root, "<gpx></gpx>").unwrap();
        let err = read_document(&wrong_root).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("other.osm"));

        let good = dir.path().join("city.osm");
        let mut file = fs::File::create(&good).unwrap();
        file.write_all(OSM_SAMPLE.as_bytes()).unwrap();
        drop(file);
        let document = read_document(&good).unwrap();
        assert_eq!(document.elements("way").count(), 2);
    }

    #[test]
    fn reads_xz_compressed_input() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("city.osm.xz");
        let mut encoder = xz::write::XzEncoder::new(fs::File::create(&path).unwrap(), 6);
        encoder.write_all(OSM_SAMPLE.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let document = read_document(&path).unwrap();
        assert_eq!(document.elements("node").count(), 3);
    }

    #[test]
    fn malformed_xml_names_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.osm");
        fs::write(&path, "<osm><way id=\"1\"></node></osm>").unwrap();
        let err = read_document(&path).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        assert!(err.message.contains("broken.osm"));
    }
}
