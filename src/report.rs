use std::fmt::{Display, Formatter};
use log::{debug, warn};
use crate::bus_stops::{BusStop, BusStops};
use crate::campus_data::{Building, Campus, Location, Miles};
use crate::predictions::{Arrival, PredictionSource};

#[derive(Debug, Clone)]
pub struct ReportConfig {
    /// Travel directions to find a stop for, in report order.
    pub directions: Vec<String>,
}

/// Live arrival information for one stop.
#[derive(Debug, Clone, PartialEq)]
pub enum Predictions {
    Arrivals(Vec<Arrival>),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NearestStop<'a> {
    pub stop: &'a BusStop,
    pub distance: Miles,
    /// `None` when no prediction source is attached.
    pub predictions: Option<Predictions>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectionReport<'a> {
    pub direction: String,
    pub nearest: Option<NearestStop<'a>>,
}

/// Everything known about one building that matched a query.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingReport<'a> {
    pub building: &'a Building,
    /// `None` when none of the perimeter nodes are on the map.
    pub center: Option<Location>,
    /// Empty when the building has no location.
    pub directions: Vec<DirectionReport<'a>>,
}

/// Resolves building names against the campus and pairs each match with
/// its nearest stops.
pub struct ReportEngine<'a> {
    campus: &'a Campus,
    stops: &'a BusStops,
    predictions: Option<&'a dyn PredictionSource>,
    config: ReportConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            directions: vec!["Southbound".to_string(), "Northbound".to_string()],
        }
    }
}

impl<'a> ReportEngine<'a> {
    pub fn new(campus: &'a Campus, stops: &'a BusStops, config: ReportConfig) -> ReportEngine<'a> {
        ReportEngine {
            campus,
            stops,
            predictions: None,
            config,
        }
    }

    pub fn with_predictions(mut self, source: &'a dyn PredictionSource) -> ReportEngine<'a> {
        self.predictions = Some(source);
        self
    }

    /// One report per building whose name contains `query`, in storage
    /// order. Reports are built as the iterator is consumed.
    pub fn reports<'q>(&'q self, query: &'q str) -> impl Iterator<Item = BuildingReport<'a>> + 'q
    where
        'a: 'q,
    {
        debug!("resolving buildings matching {:?}", query);
        self.campus
            .buildings()
            .find_by_name_partial(query)
            .map(move |building| self.report(building))
    }

    pub fn report(&self, building: &'a Building) -> BuildingReport<'a> {
        let center = self.campus.center_of(building);
        let directions = match center {
            None => {
                warn!("building {} ({:?}) has no location", building.id, building.name);
                vec![]
            }
            Some(center) => self
                .config
                .directions
                .iter()
                .map(|direction| self.direction_report(center, direction))
                .collect(),
        };
        BuildingReport {
            building,
            center,
            directions,
        }
    }

    fn direction_report(&self, center: Location, direction: &str) -> DirectionReport<'a> {
        let nearest = self
            .stops
            .find_closest(center.lat(), center.lng(), direction)
            .map(|closest| NearestStop {
                stop: closest.stop,
                distance: closest.distance,
                predictions: self.predictions.map(|source| predict(source, closest.stop)),
            });
        DirectionReport {
            direction: direction.to_string(),
            nearest,
        }
    }
}

fn predict(source: &dyn PredictionSource, stop: &BusStop) -> Predictions {
    match source.predictions(stop) {
        Ok(arrivals) => Predictions::Arrivals(arrivals),
        Err(e) => {
            warn!("predictions for stop {} unavailable: {}", stop.id, e);
            Predictions::Unavailable(e.to_string())
        }
    }
}

// ----------------- formatting --------------------------------
/// Six significant digits with trailing zeros dropped, e.g. `0.302134`
/// or `42.0512`.
struct Significant(f64);

impl Display for Significant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = self.0;
        if value == 0. || !value.is_finite() {
            return write!(f, "{}", value);
        }
        let decimals = (5 - value.abs().log10().floor() as i32).max(0) as usize;
        let text = format!("{:.*}", decimals, value);
        if text.contains('.') {
            write!(f, "{}", text.trim_end_matches('0').trim_end_matches('.'))
        } else {
            write!(f, "{}", text)
        }
    }
}

impl Display for BuildingReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let building = self.building;
        writeln!(f, "{}", building.name)?;
        writeln!(f, "Address: {}", building.street_address)?;
        writeln!(f, "Building ID: {}", building.id)?;
        writeln!(f, "# perimeter nodes: {}", building.node_ids.len())?;
        match self.center {
            Some(Location(lat, lng)) => writeln!(f, "Location: ({}, {})", Significant(lat), Significant(lng))?,
            None => {
                writeln!(f, "Location: unknown")?;
                writeln!(f, "  <<no nearby bus stops, building has no mapped outline>>")?;
            }
        }
        for direction in self.directions.iter() {
            write!(f, "{}", direction)?;
        }
        Ok(())
    }
}

impl Display for DirectionReport<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = self.direction.to_lowercase();
        writeln!(f, "Closest {} bus stop:", label)?;
        let Some(nearest) = &self.nearest else {
            return writeln!(f, "  <<no {} bus stop available>>", label);
        };
        let stop = nearest.stop;
        writeln!(
            f,
            "  {}: {}, bus #{}, {}, {} miles",
            stop.id, stop.name, stop.route, stop.corner, Significant(nearest.distance)
        )?;
        match &nearest.predictions {
            None => Ok(()),
            Some(predictions) => write!(f, "{}", predictions),
        }
    }
}

impl Display for Predictions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Predictions::Arrivals(arrivals) if arrivals.is_empty() => {
                writeln!(f, "  <<no predictions available>>")
            }
            Predictions::Arrivals(arrivals) => {
                for arrival in arrivals {
                    writeln!(f, "  {}", arrival)?;
                }
                Ok(())
            }
            Predictions::Unavailable(reason) => {
                writeln!(f, "  <<bus predictions unavailable, {}>>", reason)
            }
        }
    }
}

/// `id: name, address`, as shown in the building listing.
impl Display for Building {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}, {}", self.id, self.name, self.street_address)
    }
}

impl Display for BusStop {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: bus {}, {}, {}, {}, location ({}, {})",
            self.id, self.route, self.name, self.direction, self.corner, self.latitude, self.longitude
        )
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use crate::campus_data::{BuildingsBuilder, NodesBuilder};
    use crate::predictions::PredictionError;
    use super::*;

    struct AlwaysFails;
    impl PredictionSource for AlwaysFails {
        fn predictions(&self, _stop: &BusStop) -> Result<Vec<Arrival>, PredictionError> {
            Err(PredictionError::NotConfigured)
        }
    }

    /// Fails for one stop, answers for the rest.
    struct FlakyFor {
        stop_id: i32,
        calls: Cell<usize>,
    }
    impl PredictionSource for FlakyFor {
        fn predictions(&self, stop: &BusStop) -> Result<Vec<Arrival>, PredictionError> {
            self.calls.set(self.calls.get() + 1);
            if stop.id == self.stop_id {
                return Err(PredictionError::NotConfigured);
            }
            Ok(vec![Arrival {
                vehicle: "1".to_string(),
                route: stop.route.to_string(),
                direction: stop.direction.clone(),
                minutes: "3".to_string(),
            }])
        }
    }

    fn campus() -> Campus {
        let mut nodes = NodesBuilder::default();
        nodes.add(1, 42.050, -87.680, false);
        nodes.add(2, 42.052, -87.680, true);
        nodes.add(3, 42.052, -87.678, false);
        nodes.add(4, 42.050, -87.678, false);
        let mut buildings = BuildingsBuilder::default();
        let mudd = buildings.add(10, "Mudd Hall", "2233 Tech Dr");
        for id in [1, 2, 3, 4] {
            buildings.add_node_to_building(mudd, id);
        }
        buildings.add(11, "Annenberg", "2120 Campus Dr");
        let ghost = buildings.add(12, "Mudd Annex", "");
        buildings.add_node_to_building(ghost, 99);
        Campus::new(nodes.build(), buildings.build())
    }

    fn stops() -> BusStops {
        vec![
            BusStop::new(100, 201, "Far North", "Northbound", "NE corner", 42.060, -87.679),
            BusStop::new(101, 201, "Near North", "Northbound", "NW corner", 42.053, -87.679),
            BusStop::new(200, 201, "Near South", "Southbound", "SW corner", 42.049, -87.679),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_report_nearest_per_direction() {
        let campus = campus();
        let stops = stops();
        let engine = ReportEngine::new(&campus, &stops, ReportConfig::default());
        let reports = engine.reports("Mudd Hall").collect::<Vec<_>>();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        let Location(lat, lng) = report.center.unwrap();
        assert!((lat - 42.051).abs() < 1e-9 && (lng + 87.679).abs() < 1e-9);
        assert_eq!(report.directions.len(), 2);
        assert_eq!(report.directions[0].direction, "Southbound");
        assert_eq!(report.directions[0].nearest.as_ref().unwrap().stop.id, 200);
        assert_eq!(report.directions[1].nearest.as_ref().unwrap().stop.id, 101);
        assert!(report.directions[1].nearest.as_ref().unwrap().predictions.is_none());

        let text = report.to_string();
        assert!(text.contains("Location: (42.051, -87.679)\n"));
        let south = text.lines().find(|l| l.starts_with("  200: Near South")).unwrap();
        let miles = south.trim_end_matches(" miles").rsplit(", ").next().unwrap();
        assert!(miles.starts_with("0.1"));
        assert!(miles.chars().filter(|c| c.is_ascii_digit()).count() <= 7);
    }

    #[test]
    fn test_report_matches_in_storage_order() {
        let campus = campus();
        let stops = stops();
        let engine = ReportEngine::new(&campus, &stops, ReportConfig::default());
        let ids = engine.reports("Mudd").map(|r| r.building.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![10, 12]);
        assert_eq!(engine.reports("").count(), 3);
        assert_eq!(engine.reports("Tech").count(), 0);
    }

    #[test]
    fn test_report_without_location() {
        let campus = campus();
        let stops = stops();
        let engine = ReportEngine::new(&campus, &stops, ReportConfig::default());
        let report = engine.reports("Annex").next().unwrap();
        assert_eq!(report.center, None);
        assert!(report.directions.is_empty());
        assert!(report.to_string().contains("Location: unknown"));
    }

    #[test]
    fn test_report_direction_without_stops() {
        let campus = campus();
        let stops = stops();
        let config = ReportConfig {
            directions: vec!["Eastbound".to_string(), "Northbound".to_string()],
        };
        let engine = ReportEngine::new(&campus, &stops, config);
        let report = engine.reports("Mudd Hall").next().unwrap();
        assert!(report.directions[0].nearest.is_none());
        assert!(report.directions[1].nearest.is_some());
        let text = report.to_string();
        assert!(text.contains("<<no eastbound bus stop available>>"));
        assert!(text.contains("101: Near North, bus #201, NW corner"));
    }

    #[test]
    fn test_failing_predictions_do_not_stop_report() {
        let campus = campus();
        let stops = stops();
        let source = AlwaysFails;
        let engine = ReportEngine::new(&campus, &stops, ReportConfig::default()).with_predictions(&source);
        let report = engine.reports("Mudd Hall").next().unwrap();
        assert_eq!(report.directions.len(), 2);
        for direction in report.directions.iter() {
            let nearest = direction.nearest.as_ref().unwrap();
            assert!(matches!(nearest.predictions, Some(Predictions::Unavailable(_))));
        }
        assert_eq!(report.to_string().matches("<<bus predictions unavailable").count(), 2);
    }

    #[test]
    fn test_one_failing_stop_leaves_others() {
        let campus = campus();
        let stops = stops();
        let source = FlakyFor {
            stop_id: 200,
            calls: Cell::new(0),
        };
        let engine = ReportEngine::new(&campus, &stops, ReportConfig::default()).with_predictions(&source);
        let report = engine.reports("Mudd Hall").next().unwrap();
        assert_eq!(source.calls.get(), 2);
        let south = report.directions[0].nearest.as_ref().unwrap();
        let north = report.directions[1].nearest.as_ref().unwrap();
        assert!(matches!(south.predictions, Some(Predictions::Unavailable(_))));
        assert!(matches!(&north.predictions, Some(Predictions::Arrivals(a)) if a.len() == 1));
        let text = report.to_string();
        assert!(text.contains("vehicle #1 on route 201 travelling Northbound to arrive in 3 mins"));
    }

    #[test]
    fn test_listing_lines() {
        let stop = BusStop::new(1836, 201, "Central & Sheridan", "Northbound", "NE corner", 42.0643, -87.6771);
        assert_eq!(
            stop.to_string(),
            "1836: bus 201, Central & Sheridan, Northbound, NE corner, location (42.0643, -87.6771)"
        );
        let building = Building::new(10, "Mudd Hall", "2233 Tech Dr");
        assert_eq!(building.to_string(), "10: Mudd Hall, 2233 Tech Dr");
        assert_eq!(Predictions::Arrivals(vec![]).to_string(), "  <<no predictions available>>\n");
    }

    #[test]
    fn test_significant_digits() {
        assert_eq!(Significant(0.302123456).to_string(), "0.302123");
        assert_eq!(Significant(1.5).to_string(), "1.5");
        assert_eq!(Significant(12.0).to_string(), "12");
        assert_eq!(Significant(0.).to_string(), "0");
        assert_eq!(Significant(42.051199999999994).to_string(), "42.0512");
        assert_eq!(Significant(-87.67919999999).to_string(), "-87.6792");
        assert_eq!(Significant(0.000123456789).to_string(), "0.000123457");
    }
}
