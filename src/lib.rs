pub mod campus_data;
pub mod bus_stops;
pub mod predictions;
pub mod report;
pub mod debug_draw;

use thiserror::Error;

pub use bus_stops::{BusStop, BusStops, BusStopsBuilder, ClosestStop};
pub use campus_data::{Building, Buildings, Campus, Location, Node, Nodes};
pub use predictions::{Arrival, CtaClient, PredictionConfig, PredictionError, PredictionSource};
pub use report::{BuildingReport, ReportConfig, ReportEngine};

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Campus(#[from] campus_data::CampusError),
    #[error(transparent)]
    Stops(#[from] bus_stops::BusStopError),
    #[error("debug drawing failed: {0}")]
    DebugDrawing(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
