use osm_text2coord::config::{Config, TestSet};
use osm_text2coord::{SearchResult, World};
use serde::Serialize;
use std::error::Error;
use std::io::{self, Write};
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(about = "Resolve Swedish free-form text to geographic coordinates")]
struct Cli {
    /// JSON configuration file
    #[structopt(parse(from_os_str))]
    config: std::path::PathBuf,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(StructOpt)]
enum Command {
    /// Parse the configured PBF extract and write snapshots
    Ingest,
    /// Resolve a text to ranked coordinates
    Query {
        /// Words to resolve (joined with spaces)
        text: Vec<String>,
        #[structopt(short, long)]
        json: bool,
    },
    /// Run the test sets from the configuration file
    Test,
}

#[derive(Serialize)]
struct JSONResult<'a> {
    latitude: f64,
    longitude: f64,
    quality: f64,
    origin: &'a str,
}

fn write_results(
    world: &World,
    results: &[SearchResult],
    json: bool,
    writer: &mut dyn Write,
) -> Result<(), Box<dyn Error>> {
    for result in results {
        let (latitude, longitude) = world.latlon(result.coord);
        if json {
            let line = serde_json::to_string(&JSONResult {
                latitude,
                longitude,
                quality: result.quality,
                origin: &result.origin,
            })?;
            writeln!(writer, "{}", line)?;
        } else {
            writeln!(
                writer,
                "{:.5} {:.5}  quality {:.2}  {}",
                latitude, longitude, result.quality, result.origin
            )?;
        }
    }
    Ok(())
}

/// Distance in meters from the best result to the closest expected
/// coordinate, if the test set has both.
fn best_result_error(world: &World, testset: &TestSet, results: &[SearchResult]) -> Option<i64> {
    let best = results.first()?;
    testset
        .latitude
        .iter()
        .zip(testset.longitude.iter())
        .map(|(&lat, &lon)| {
            world
                .grid
                .distance_meters(best.coord, world.grid.coord(lon, lat))
        })
        .min()
}

fn run_testsets(world: &World, config: &Config, writer: &mut dyn Write) -> Result<(), Box<dyn Error>> {
    const ACCEPTED_ERROR_M: i64 = 10_000;
    let mut passed = 0;
    for testset in &config.testsets {
        let results = world.find_results(&testset.text, config.duplicate_proximity, config.max_results);
        match best_result_error(world, testset, &results) {
            Some(error) => {
                let verdict = if error <= ACCEPTED_ERROR_M { "ok" } else { "FAILED" };
                if error <= ACCEPTED_ERROR_M {
                    passed += 1;
                }
                writeln!(
                    writer,
                    "{:7} {}  ({} results, best off by {:.1} km)",
                    verdict,
                    testset.name,
                    results.len(),
                    error as f64 / 1000.0
                )?;
            }
            None => writeln!(writer, "{:7} {}  (no results)", "FAILED", testset.name)?,
        }
    }
    writeln!(writer, "{} of {} test sets passed", passed, config.testsets.len())?;
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::from_args();
    let config = Config::from_file(&args.config)?;
    config.init_logging()?;

    let stdout = io::stdout();
    let mut handle = io::BufWriter::new(stdout);

    match args.cmd {
        Command::Ingest => {
            World::ingest(&config)?;
        }
        Command::Query { text, json } => {
            let world = World::load_or_ingest(&config)?;
            let results = world.find_results(
                &text.join(" "),
                config.duplicate_proximity,
                config.max_results,
            );
            write_results(&world, &results, json, &mut handle)?;
        }
        Command::Test => {
            let world = World::load_or_ingest(&config)?;
            run_testsets(&world, &config, &mut handle)?;
        }
    }
    Ok(())
}
