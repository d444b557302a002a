use std::path::PathBuf;

use clap::{Arg, Command};
use gis_subsetter::{subset_file, subset_from_table, Bbox, CrsSpec, SubsetRequest};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("GIS Subsetter")
        .version("1.0")
        .about("Subsets GeoJSON files by bounding box and attribute columns for dashboard pipelines")
        .arg(
            Arg::new("table")
                .short('t')
                .long("table")
                .num_args(1)
                .help("CSV table describing multiple subsetting jobs"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .num_args(1)
                .conflicts_with("table")
                .help("Input GeoJSON file to subset"),
        )
        .arg(
            Arg::new("bbox")
                .short('b')
                .long("bbox")
                .num_args(4)
                .value_names(["MINX", "MINY", "MAXX", "MAXY"])
                .help("Bounding box in lon/lat; only features within it are kept"),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .num_args(1)
                .default_value("output")
                .help("Directory for the subset file (created if absent)"),
        )
        .arg(
            Arg::new("prefix")
                .short('p')
                .long("prefix")
                .num_args(1)
                .help("Output filename prefix; the file is named <prefix>_subset.geojson"),
        )
        .arg(
            Arg::new("columns")
                .short('c')
                .long("columns")
                .num_args(1..)
                .help("Property columns to keep (default: all)"),
        )
        .arg(
            Arg::new("crs")
                .long("crs")
                .num_args(1)
                .default_value("4326")
                .help("EPSG code of the input data, or 'no' to skip reprojection"),
        )
        .get_matches();

    // Batch mode: every other argument comes from the table
    if let Some(table) = matches.get_one::<String>("table") {
        let table = PathBuf::from(table);
        if !table.exists() {
            eprintln!("Error: Table not found: {}", table.display());
            std::process::exit(1);
        }

        match subset_from_table(&table) {
            Ok(summaries) => {
                println!("Processed {} files from {}", summaries.len(), table.display());
            }
            Err(e) => {
                eprintln!("Error processing table: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // Single-file mode
    let input = match matches.get_one::<String>("input") {
        Some(input) => PathBuf::from(input),
        None => {
            eprintln!("Error: Either --table or --input must be provided");
            std::process::exit(2);
        }
    };
    if !input.exists() {
        eprintln!("Error: File not found: {}", input.display());
        std::process::exit(1);
    }

    let bbox = match matches.get_many::<String>("bbox") {
        Some(values) => {
            let coords: Vec<f64> = values
                .map(|v| {
                    v.parse::<f64>().unwrap_or_else(|_| {
                        eprintln!("Error: Invalid bounding box coordinate: {}", v);
                        std::process::exit(2);
                    })
                })
                .collect();
            Bbox::new(coords[0], coords[1], coords[2], coords[3])
        }
        None => {
            eprintln!("Error: --bbox is required in single-file mode");
            std::process::exit(2);
        }
    };

    let prefix = match matches.get_one::<String>("prefix") {
        Some(prefix) => prefix.clone(),
        None => {
            eprintln!("Error: --prefix is required in single-file mode");
            std::process::exit(2);
        }
    };

    let crs = match matches.get_one::<String>("crs").unwrap().parse::<CrsSpec>() {
        Ok(crs) => crs,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };

    let columns: Vec<String> = matches
        .get_many::<String>("columns")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();

    let request = SubsetRequest {
        input,
        output_dir: PathBuf::from(matches.get_one::<String>("output-dir").unwrap()),
        bbox,
        prefix,
        columns,
        crs,
    };

    match subset_file(&request) {
        Ok(summary) => {
            println!(
                "Saved {} features to {}",
                summary.features_written,
                summary.output_path.display()
            );
        }
        Err(e) => {
            eprintln!("Error processing file: {}", e);
            std::process::exit(1);
        }
    }
}
