use std::fs::File;
use std::io::Read;
use std::path::Path;
use log::{info, warn};
use thiserror::Error;
use crate::campus_data::{dist_between, Location, Miles};
use crate::Result;

pub type StopID = i32;
pub type Route = i32;

/// A fixed transit stop. `direction` is a free-form label such as
/// "Northbound" and is only ever compared for exact equality.
#[derive(Debug, Clone, PartialEq)]
pub struct BusStop {
    pub id: StopID,
    pub route: Route,
    pub name: String,
    pub direction: String,
    pub corner: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Stops in the order they were loaded. Read-only once built.
#[derive(Debug, Default)]
pub struct BusStops {
    stops: Vec<BusStop>,
}

#[derive(Debug, Default)]
pub struct BusStopsBuilder {
    stops: Vec<BusStop>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestStop<'a> {
    pub stop: &'a BusStop,
    pub distance: Miles,
}

/// What happened while loading a stop table.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    pub line: u64,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum BusStopError {
    #[error("unable to open bus stop file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unable to read bus stop table: {0}")]
    Csv(#[from] csv::Error),
}

// stop id, route, name, direction, corner, latitude, longitude
type StopRow = (StopID, Route, String, String, String, f64, f64);
const STOP_FIELDS: usize = 7;

impl BusStop {
    pub fn new(
        id: StopID,
        route: Route,
        name: impl Into<String>,
        direction: impl Into<String>,
        corner: impl Into<String>,
        latitude: f64,
        longitude: f64,
    ) -> BusStop {
        BusStop {
            id,
            route,
            name: name.into(),
            direction: direction.into(),
            corner: corner.into(),
            latitude,
            longitude,
        }
    }

    pub fn location(&self) -> Location {
        Location(self.latitude, self.longitude)
    }
}

impl From<StopRow> for BusStop {
    fn from((id, route, name, direction, corner, latitude, longitude): StopRow) -> Self {
        BusStop { id, route, name, direction, corner, latitude, longitude }
    }
}

impl BusStopsBuilder {
    /// Appends every well-formed line of a headerless, comma separated
    /// stop table. Malformed lines are logged and reported, never fatal.
    pub fn load<R: Read>(&mut self, source: R) -> std::result::Result<LoadReport, BusStopError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .trim(csv::Trim::All)
            .from_reader(source);
        let mut report = LoadReport::default();
        // one physical line per record; quotes are plain characters
        for record in reader.byte_records() {
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    report.skip(line, String::new(), e.to_string());
                    continue;
                }
            };
            let line = record.position().map(|p| p.line()).unwrap_or_default();
            let text = record.iter().map(String::from_utf8_lossy).collect::<Vec<_>>().join(",");
            if record.len() != STOP_FIELDS {
                let reason = format!("expected {} fields, found {}", STOP_FIELDS, record.len());
                report.skip(line, text, reason);
                continue;
            }
            match record.deserialize::<StopRow>(None) {
                Ok(row) => {
                    self.stops.push(row.into());
                    report.loaded += 1;
                }
                Err(e) => report.skip(line, text, e.to_string()),
            }
        }
        Ok(report)
    }

    pub fn build(self) -> BusStops {
        BusStops { stops: self.stops }
    }
}

impl LoadReport {
    fn skip(&mut self, line: u64, text: String, reason: String) {
        warn!("skipping bus stop on line {} ({}): {}", line, reason, text);
        self.skipped.push(SkippedRecord { line, text, reason });
    }
}

impl FromIterator<BusStop> for BusStops {
    fn from_iter<T: IntoIterator<Item = BusStop>>(iter: T) -> Self {
        BusStops { stops: iter.into_iter().collect() }
    }
}

impl BusStops {
    pub fn read_csv<P: AsRef<Path>>(filepath: P) -> Result<BusStops> {
        let file = File::open(filepath).map_err(BusStopError::Io)?;
        let mut builder = BusStopsBuilder::default();
        let report = builder.load(file)?;
        info!("Loaded {} bus stops, skipped {}", report.loaded, report.skipped.len());
        Ok(builder.build())
    }

    /// All stops ordered by id. Stored order is left alone.
    pub fn list(&self) -> Vec<&BusStop> {
        let mut sorted = self.stops.iter().collect::<Vec<_>>();
        sorted.sort_by_key(|s| s.id);
        sorted
    }

    /// Nearest stop travelling in `direction`. The first stop in load
    /// order wins a tie; `None` when no stop has that direction.
    pub fn find_closest(&self, lat: f64, lon: f64, direction: &str) -> Option<ClosestStop<'_>> {
        let mut closest: Option<ClosestStop> = None;
        for stop in self.stops.iter().filter(|s| s.direction == direction) {
            let distance = dist_between(lat, lon, stop.latitude, stop.longitude);
            if distance < closest.map_or(Miles::MAX, |c| c.distance) {
                closest = Some(ClosestStop { stop, distance });
            }
        }
        closest
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BusStop> {
        self.stops.iter()
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}
