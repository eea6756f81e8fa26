use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use clap::Parser;
use log::warn;
use campusbus::campus_data::{read_osm_data, Campus, MapConfig};
use campusbus::debug_draw::draw_campus;
use campusbus::predictions::CTA_BUS_TRACKER_URL;
use campusbus::{BusStops, CtaClient, PredictionConfig, PredictionSource, ReportConfig, ReportEngine};

/// Finds campus buildings by name and the closest bus stops around them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Bus stop table: id,route,name,direction,corner,lat,lon
    #[arg(long, default_value = "bus-stops.txt")]
    stops: PathBuf,

    /// OSM XML map file; asked for when missing
    #[arg(long)]
    map: Option<PathBuf>,

    /// CTA Bus Tracker API key
    #[arg(long, env = "CTA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, default_value = CTA_BUS_TRACKER_URL)]
    api_url: String,

    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,

    /// Skip live arrival predictions
    #[arg(long)]
    offline: bool,

    /// Take every building=* way, not just building=university
    #[arg(long)]
    any_building: bool,

    /// Directions of travel to report, in order
    #[arg(long = "direction", default_values_t = ["Southbound".to_string(), "Northbound".to_string()])]
    directions: Vec<String>,

    /// Draw the loaded map to this PNG
    #[arg(long)]
    render: Option<PathBuf>,
}

enum Command<'a> {
    End,
    ListBuildings,
    ListStops,
    Find(&'a str),
}

fn parse_command(line: &str) -> Option<Command<'_>> {
    match line.trim_end_matches(['\r', '\n']) {
        "" => None,
        "$" => Some(Command::End),
        "*" => Some(Command::ListBuildings),
        "@" => Some(Command::ListStops),
        name => Some(Command::Find(name)),
    }
}

fn prompt(input: &mut impl BufRead, text: &str) -> io::Result<Option<String>> {
    println!();
    println!("{}", text);
    io::stdout().flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn run(args: Args) -> campusbus::Result<()> {
    let stops = BusStops::read_csv(&args.stops)?;

    println!("** NU open street map **");
    let stdin = io::stdin();
    let mut input = stdin.lock();
    let map_path = match args.map {
        Some(path) => path,
        None => match prompt(&mut input, "Enter map filename> ")? {
            Some(line) => PathBuf::from(line.trim()),
            None => return Ok(()),
        },
    };
    let map_config = if args.any_building {
        MapConfig::any_building()
    } else {
        MapConfig::default()
    };
    let campus: Campus = read_osm_data(&map_path, &map_config)?;

    println!("# of nodes: {}", campus.nodes().len());
    println!("# of buildings: {}", campus.buildings().len());
    println!("# of bus stops: {}", stops.len());

    if let Some(path) = &args.render {
        match draw_campus(&campus, &stops, path) {
            Ok(()) => println!("Map drawn to {}", path.display()),
            Err(e) => warn!("unable to draw map: {}", e),
        }
    }

    let client = if args.offline {
        None
    } else {
        let config = PredictionConfig {
            base_url: args.api_url,
            api_key: args.api_key,
            timeout: Duration::from_secs(args.timeout_secs),
        };
        match CtaClient::new(config) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("bus predictions disabled: {}", e);
                None
            }
        }
    };
    let engine = ReportEngine::new(&campus, &stops, ReportConfig { directions: args.directions });
    let engine = match &client {
        Some(client) => engine.with_predictions(client as &dyn PredictionSource),
        None => engine,
    };

    let text = "Enter building name (partial or complete), or * to list, or @ for bus stops, or $ to end> ";
    while let Some(line) = prompt(&mut input, text)? {
        match parse_command(&line) {
            None => continue,
            Some(Command::End) => break,
            Some(Command::ListBuildings) => {
                for building in campus.buildings().iter() {
                    println!("{}", building);
                }
            }
            Some(Command::ListStops) => {
                for stop in stops.list() {
                    println!("{}", stop);
                }
            }
            Some(Command::Find(name)) => {
                let mut found = false;
                for report in engine.reports(name) {
                    found = true;
                    print!("{}", report);
                }
                if !found {
                    println!("No such building");
                }
            }
        }
    }

    println!();
    println!("** Done **");
    println!();
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("**ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
