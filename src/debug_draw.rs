use std::collections::HashMap;
use std::path::Path;
use log::info;
use plotters::prelude::*;
use plotters::style::full_palette::BROWN;
use crate::bus_stops::BusStops;
use crate::campus_data::{bounding_box, BoundingBox, Campus, CampusError, Location};
use crate::Error;

const WIDTH: u32 = 1920;
const MAX_HEIGHT: u32 = 4 * WIDTH;
// keeps a single point or a straight line from collapsing the screen mapping
const MIN_SPAN: f64 = 1e-6;

fn aspect_ratio(bb: BoundingBox) -> f32 {
    let ((min_x, max_x), (min_y, max_y)) = bb;
    let width = (max_y - min_y).max(MIN_SPAN);
    let height = (max_x - min_x).max(MIN_SPAN);
    height as f32 / width as f32
}

fn map_to_screen(bb: BoundingBox, screen_dims: (u32, u32)) -> Box<dyn Fn(&Location) -> (i32, i32)> {
    let (width, height) = screen_dims;
    let ((min_lat, max_lat), (min_long, max_long)) = bb;
    let lat_span = (max_lat - min_lat).max(MIN_SPAN);
    let long_span = (max_long - min_long).max(MIN_SPAN);
    let map_long = move |x| ((x - min_long) / long_span * width as f64) as i32;
    let map_lat = move |y| height as i32 - ((y - min_lat) / lat_span * height as f64) as i32;
    let map_loc = move |loc: &Location| (map_long(loc.lng()), map_lat(loc.lat()));
    Box::new(map_loc)
}

/// Writes a PNG of every building outline, building centers, entrances
/// and the bus stops, one color per direction of travel.
pub fn draw_campus(campus: &Campus, stops: &BusStops, path: &Path) -> Result<(), Error> {
    let nodes = campus.nodes();
    let outlines = campus
        .buildings()
        .iter()
        .map(|b| b.perimeter(nodes).collect::<Vec<_>>())
        .filter(|outline| !outline.is_empty())
        .collect::<Vec<_>>();
    let points = outlines
        .iter()
        .flatten()
        .map(|n| n.location)
        .chain(stops.iter().map(|s| s.location()));
    let bb = bounding_box(points).ok_or(CampusError::EmptyCampus)?;
    let aspect = aspect_ratio(bb);
    let height = ((WIDTH as f32 * aspect) as u32).clamp(1, MAX_HEIGHT);
    let map_loc = map_to_screen(bb, (WIDTH, height));
    info!("Drawing {} buildings and {} stops, bounding box {:?}", outlines.len(), stops.len(), bb);

    let root = BitMapBackend::new(path, (WIDTH, height)).into_drawing_area();
    root.fill(&WHITE)?;
    for outline in outlines.iter() {
        let mut points = outline.iter().map(|n| map_loc(&n.location)).collect::<Vec<_>>();
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        root.draw(&PathElement::new(points, &BLACK))?;
        for entrance in outline.iter().filter(|n| n.is_entrance) {
            root.draw(&Circle::new(map_loc(&entrance.location), 3, GREEN.filled()))?;
        }
    }
    for building in campus.buildings().iter() {
        if let Some(center) = campus.center_of(building) {
            root.draw(&Circle::new(map_loc(&center), 2, &BROWN))?;
        }
    }

    let palette = [BLUE, RED, MAGENTA, CYAN];
    let mut direction_color: HashMap<&str, RGBColor> = HashMap::new();
    for stop in stops.iter() {
        let next = palette[direction_color.len() % palette.len()];
        let color = *direction_color.entry(stop.direction.as_str()).or_insert(next);
        root.draw(&Circle::new(map_loc(&stop.location()), 4, color.filled()))?;
    }
    root.present()?;
    Ok(())
}

impl<DB: std::error::Error + Send + Sync> From<DrawingAreaErrorKind<DB>> for Error {
    fn from(e: DrawingAreaErrorKind<DB>) -> Self {
        Error::DebugDrawing(e.to_string())
    }
}
