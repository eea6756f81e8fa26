use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use geo::{Distance, Haversine, Point};
use log::{debug, info, warn};
use roxmltree::Document;
use thiserror::Error;
use crate::Result;

pub type CampusNodeID = i64;
pub type BuildingID = i64;
pub type Coordinate = f64;
pub type Miles = f64;

const METERS_PER_MILE: f64 = 1609.344;

/// A `<tag k=".." v=".."/>` of a node or way.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub key: String,
    pub val: String,
}

/// A (latitude, longitude) pair in degrees.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Location(pub Coordinate, pub Coordinate);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub id: CampusNodeID,
    pub location: Location,
    pub is_entrance: bool,
}

/// Every node of the map, keyed by id. Read-only once built.
#[derive(Debug, Default)]
pub struct Nodes {
    nodes: HashMap<CampusNodeID, Node>,
}

#[derive(Debug, Default)]
pub struct NodesBuilder {
    nodes: HashMap<CampusNodeID, Node>,
}

/// Defines a campus building with a name (e.g. "Mudd"), a street address
/// (e.g. "2233 Tech Dr"), and the ids of the nodes outlining it.
///
/// The name and the address may both be empty, map data is imperfect.
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    pub id: BuildingID,
    pub name: String,
    pub street_address: String,
    pub node_ids: Vec<CampusNodeID>,
}

/// Buildings in the order they were loaded.
#[derive(Debug, Default)]
pub struct Buildings {
    buildings: Vec<Building>,
}

/// Handle to a building that is still being assembled by a [`BuildingsBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildingRef(usize);

#[derive(Debug, Default)]
pub struct BuildingsBuilder {
    buildings: Vec<Building>,
}

/// The loaded map: nodes plus the buildings drawn over them.
#[derive(Debug, Default)]
pub struct Campus {
    nodes: Nodes,
    buildings: Buildings,
}

#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Required value of the `building` tag; `None` takes every building.
    pub building_value: Option<String>,
}

#[derive(Debug, Error)]
pub enum CampusError {
    #[error("unable to read map file: {0}")]
    IO(#[from] std::io::Error),
    #[error("unable to parse map: {0}")]
    LoadMapError(#[from] roxmltree::Error),
    #[error("map has no nodes")]
    EmptyCampus,
}

pub type BoundingBox = ((Coordinate, Coordinate), (Coordinate, Coordinate));

/// Great-circle distance in miles between two (lat, lon) points.
pub fn dist_between(lat1: Coordinate, lon1: Coordinate, lat2: Coordinate, lon2: Coordinate) -> Miles {
    Haversine.distance(Point::new(lon1, lat1), Point::new(lon2, lat2)) / METERS_PER_MILE
}

/// Reads an OSM XML file exported from OpenStreetMap.
/// See more at https://www.openstreetmap.org/about
/// If you're unsure about the config, just use the default
pub fn read_osm_data<P: AsRef<Path>>(filepath: P, config: &MapConfig) -> Result<Campus> {
    let file = File::open(filepath).map_err(CampusError::IO)?;
    read_osm(file, config)
}

pub fn read_osm<R: Read>(mut source: R, config: &MapConfig) -> Result<Campus> {
    let mut text = String::new();
    source.read_to_string(&mut text).map_err(CampusError::IO)?;
    let doc = Document::parse(&text).map_err(CampusError::LoadMapError)?;

    let mut nodes = NodesBuilder::default();
    let mut buildings = BuildingsBuilder::default();
    for element in doc.root_element().children().filter(|n| n.is_element()) {
        match element.tag_name().name() {
            "node" => {
                let (Some(id), Some(lat), Some(lon)) = (
                    attribute(element, "id"),
                    attribute(element, "lat"),
                    attribute(element, "lon"),
                ) else {
                    warn!("skipping node without id/lat/lon at {}", doc.text_pos_at(element.range().start));
                    continue;
                };
                nodes.add(id, lat, lon, is_entrance(&tags(element)));
            }
            "way" => {
                let tags = tags(element);
                if !config.is_building(&tags) {
                    continue;
                }
                let Some(id) = attribute(element, "id") else {
                    warn!("skipping building without id at {}", doc.text_pos_at(element.range().start));
                    continue;
                };
                let name = tag_value(&tags, "name").unwrap_or_default();
                let building = buildings.add(id, name, street_address(&tags));
                for nd in element.children().filter(|n| n.has_tag_name("nd")) {
                    if let Some(node_id) = attribute(nd, "ref") {
                        buildings.add_node_to_building(building, node_id);
                    }
                }
            }
            _ => {}
        }
    }

    let campus = Campus::new(nodes.build(), buildings.build());
    info!(
        "Loaded {} nodes and {} buildings",
        campus.nodes().len(),
        campus.buildings().len()
    );
    Ok(campus)
}

fn attribute<T: FromStr>(element: roxmltree::Node, name: &str) -> Option<T> {
    element.attribute(name)?.trim().parse().ok()
}

fn tags(element: roxmltree::Node) -> Vec<Tag> {
    element
        .children()
        .filter(|n| n.has_tag_name("tag"))
        .filter_map(|t| {
            Some(Tag {
                key: t.attribute("k")?.to_string(),
                val: t.attribute("v")?.to_string(),
            })
        })
        .collect()
}

fn tag_value<'a>(tags: &'a [Tag], key: &str) -> Option<&'a str> {
    tags.iter()
        .find(|t| t.key.as_str() == key)
        .map(|t| t.val.as_str())
}

fn is_entrance(tags: &[Tag]) -> bool {
    matches!(tag_value(tags, "entrance"), Some("yes" | "main" | "entrance"))
}

fn street_address(tags: &[Tag]) -> String {
    let number = tag_value(tags, "addr:housenumber").unwrap_or_default();
    let street = tag_value(tags, "addr:street").unwrap_or_default();
    format!("{} {}", number, street).trim().to_string()
}

// ----------------- impls --------------------------------
impl Location {
    pub fn lat(&self) -> f64 {
        self.0
    }
    pub fn lng(&self) -> f64 {
        self.1
    }

    pub fn dist(&self, other: &Location) -> Miles {
        dist_between(self.lat(), self.lng(), other.lat(), other.lng())
    }
}

impl Nodes {
    /// Missing ids are expected (buildings may reference nodes outside the export).
    pub fn find(&self, id: CampusNodeID) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}

impl NodesBuilder {
    /// Last write wins for a repeated id.
    pub fn add(&mut self, id: CampusNodeID, lat: Coordinate, lon: Coordinate, is_entrance: bool) {
        self.nodes.insert(id, Node {
            id,
            location: Location(lat, lon),
            is_entrance,
        });
    }

    pub fn build(self) -> Nodes {
        Nodes { nodes: self.nodes }
    }
}

impl FromIterator<Node> for Nodes {
    fn from_iter<T: IntoIterator<Item = Node>>(iter: T) -> Self {
        let mut builder = NodesBuilder::default();
        for node in iter {
            builder.add(node.id, node.location.lat(), node.location.lng(), node.is_entrance);
        }
        builder.build()
    }
}

impl Building {
    pub fn new(id: BuildingID, name: impl Into<String>, street_address: impl Into<String>) -> Building {
        Building {
            id,
            name: name.into(),
            street_address: street_address.into(),
            node_ids: vec![],
        }
    }

    pub fn add(&mut self, node_id: CampusNodeID) {
        self.node_ids.push(node_id);
    }

    pub fn contains_node(&self, node_id: CampusNodeID) -> bool {
        self.node_ids.iter().any(|id| *id == node_id)
    }

    /// Perimeter nodes that exist in `nodes`, in outline order.
    pub fn perimeter<'a>(&'a self, nodes: &'a Nodes) -> impl Iterator<Item = &'a Node> + 'a {
        self.node_ids.iter().filter_map(move |id| nodes.find(*id))
    }

    /// Mean position of the resolvable perimeter nodes.
    /// `None` when none of them resolve.
    pub fn center(&self, nodes: &Nodes) -> Option<Location> {
        let (sum_lat, sum_lon, count) = self
            .perimeter(nodes)
            .fold((0., 0., 0usize), |(lat, lon, n), node| {
                (lat + node.location.lat(), lon + node.location.lng(), n + 1)
            });
        if count == 0 {
            debug!("building {} has no resolvable perimeter nodes", self.id);
            return None;
        }
        Some(Location(sum_lat / count as f64, sum_lon / count as f64))
    }
}

impl Buildings {
    /// Case-sensitive substring match on the name, in storage order.
    /// The iterator is lazy and can be cloned to restart it. An empty
    /// query matches every building.
    pub fn find_by_name_partial<'a, 'q>(&'a self, query: &'q str) -> impl Iterator<Item = &'a Building> + Clone + 'q
    where
        'a: 'q,
    {
        self.buildings.iter().filter(move |b| b.name.contains(query))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Building> {
        self.buildings.iter()
    }

    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

impl BuildingsBuilder {
    pub fn add(&mut self, id: BuildingID, name: impl Into<String>, street_address: impl Into<String>) -> BuildingRef {
        self.buildings.push(Building::new(id, name, street_address));
        BuildingRef(self.buildings.len() - 1)
    }

    /// Duplicates are kept. A handle from another builder is ignored.
    pub fn add_node_to_building(&mut self, building: BuildingRef, node_id: CampusNodeID) {
        if let Some(b) = self.buildings.get_mut(building.0) {
            b.add(node_id);
        }
    }

    pub fn build(self) -> Buildings {
        Buildings { buildings: self.buildings }
    }
}

impl Campus {
    pub fn new(nodes: Nodes, buildings: Buildings) -> Campus {
        Campus { nodes, buildings }
    }

    pub fn nodes(&self) -> &Nodes {
        &self.nodes
    }

    pub fn buildings(&self) -> &Buildings {
        &self.buildings
    }

    pub fn center_of(&self, building: &Building) -> Option<Location> {
        building.center(&self.nodes)
    }
}

/// ((min lat, max lat), (min lng, max lng)) over the given points.
pub fn bounding_box<I: IntoIterator<Item = Location>>(points: I) -> Option<BoundingBox> {
    points.into_iter().fold(None, |bb, Location(lat, lng)| match bb {
        None => Some(((lat, lat), (lng, lng))),
        Some(((min_lat, max_lat), (min_lng, max_lng))) => Some((
            (min_lat.min(lat), max_lat.max(lat)),
            (min_lng.min(lng), max_lng.max(lng)),
        )),
    })
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            building_value: Some("university".to_string()),
        }
    }
}

impl MapConfig {
    pub fn any_building() -> MapConfig {
        MapConfig { building_value: None }
    }

    fn is_building(&self, tags: &[Tag]) -> bool {
        match (tag_value(tags, "building"), &self.building_value) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(v), Some(wanted)) => v == wanted,
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use super::*;

    fn nodes() -> Nodes {
        let mut builder = NodesBuilder::default();
        builder.add(1, 10., 20., false);
        builder.add(2, 30., 40., true);
        builder.add(3, 42.05, -87.67, false);
        builder.build()
    }

    #[test]
    fn test_dist_same_point_is_zero() {
        assert_eq!(dist_between(42.0564, -87.6752, 42.0564, -87.6752), 0.);
        assert_eq!(dist_between(0., 0., 0., 0.), 0.);
    }

    #[test]
    fn test_dist_is_symmetric() {
        let a = Location(42.0564, -87.6752);
        let b = Location(42.0519, -87.6772);
        assert_relative_eq!(a.dist(&b), b.dist(&a));
        assert!(a.dist(&b) > 0.);
        // about a third of a mile apart
        assert!(a.dist(&b) > 0.25 && a.dist(&b) < 0.4);
    }

    #[test]
    fn test_dist_grows_with_separation() {
        let origin = Location(42.05, -87.67);
        let near = Location(42.06, -87.67);
        let far = Location(42.10, -87.67);
        assert!(origin.dist(&near) < origin.dist(&far));
    }

    #[test]
    fn test_node_add_overwrites() {
        let mut builder = NodesBuilder::default();
        builder.add(7, 1., 1., false);
        builder.add(7, 2., 3., true);
        let nodes = builder.build();
        assert_eq!(nodes.len(), 1);
        let node = nodes.find(7).unwrap();
        assert_eq!(node.location, Location(2., 3.));
        assert!(node.is_entrance);
        assert!(nodes.find(8).is_none());

        let copied = nodes.iter().copied().collect::<Nodes>();
        assert_eq!(copied.find(7), nodes.find(7));
    }

    #[test]
    fn test_center_is_mean() {
        let mut building = Building::new(100, "Mudd Hall", "2233 Tech Dr");
        building.add(1);
        building.add(2);
        let center = building.center(&nodes()).unwrap();
        assert_abs_diff_eq!(center.lat(), 20.);
        assert_abs_diff_eq!(center.lng(), 30.);
    }

    #[test]
    fn test_center_skips_missing_nodes() {
        let mut building = Building::new(100, "Mudd Hall", "");
        building.add(1);
        building.add(999);
        building.add(2);
        let center = building.center(&nodes()).unwrap();
        assert_abs_diff_eq!(center.lat(), 20.);
        assert_abs_diff_eq!(center.lng(), 30.);
    }

    #[test]
    fn test_center_without_resolvable_nodes() {
        let mut building = Building::new(100, "Ghost", "");
        assert_eq!(building.center(&nodes()), None);
        building.add(404);
        building.add(405);
        assert_eq!(building.center(&nodes()), None);
    }

    #[test]
    fn test_contains_node() {
        let mut building = Building::new(1, "Tech", "");
        building.add(5);
        building.add(5);
        assert!(building.contains_node(5));
        assert!(!building.contains_node(6));
        assert_eq!(building.node_ids, vec![5, 5]);
    }

    #[test]
    fn test_find_by_name_partial() {
        let mut builder = BuildingsBuilder::default();
        builder.add(1, "Mudd Hall", "");
        builder.add(2, "Annenberg", "");
        builder.add(3, "Seeley G. Mudd Library", "");
        builder.add(4, "", "");
        let buildings = builder.build();

        let found = buildings.find_by_name_partial("Mudd").map(|b| b.id).collect::<Vec<_>>();
        assert_eq!(found, vec![1, 3]);
        assert_eq!(buildings.find_by_name_partial("mudd").count(), 0);
        assert_eq!(buildings.find_by_name_partial("").count(), 4);

        let matches = buildings.find_by_name_partial("Annen");
        assert_eq!(matches.clone().count(), 1);
        assert_eq!(matches.map(|b| b.name.as_str()).collect::<Vec<_>>(), vec!["Annenberg"]);
    }

    #[test]
    fn test_builder_appends_perimeter() {
        let mut builder = BuildingsBuilder::default();
        let tech = builder.add(1, "Tech", "2145 Sheridan Rd");
        let mudd = builder.add(2, "Mudd", "");
        builder.add_node_to_building(tech, 1);
        builder.add_node_to_building(mudd, 3);
        builder.add_node_to_building(tech, 2);
        let buildings = builder.build();
        let all = buildings.iter().collect::<Vec<_>>();
        assert_eq!(all[0].node_ids, vec![1, 2]);
        assert_eq!(all[1].node_ids, vec![3]);
    }

    #[test]
    fn test_bounding_box() {
        let bb = bounding_box(nodes().iter().map(|n| n.location)).unwrap();
        assert_eq!(bb, ((10., 42.05), (-87.67, 40.)));
        assert!(bounding_box(Vec::<Location>::new()).is_none());
    }

    #[test]
    fn test_tags() {
        let tag = |k: &str, v: &str| Tag { key: k.to_string(), val: v.to_string() };
        assert!(is_entrance(&[tag("entrance", "main")]));
        assert!(!is_entrance(&[tag("entrance", "emergency")]));
        assert_eq!(street_address(&[tag("addr:street", "Tech Dr"), tag("addr:housenumber", "2233")]), "2233 Tech Dr");
        assert_eq!(street_address(&[tag("addr:street", "Tech Dr")]), "Tech Dr");
        assert_eq!(street_address(&[]), "");

        let university = [tag("building", "university")];
        let dorm = [tag("building", "dormitory")];
        assert!(MapConfig::default().is_building(&university));
        assert!(!MapConfig::default().is_building(&dorm));
        assert!(MapConfig::any_building().is_building(&dorm));
        assert!(!MapConfig::any_building().is_building(&[tag("highway", "footway")]));
    }
}
