//! Command-line front end: validate a configuration, inspect the engine
//! parameters, sample the model at a point, or prepare a run.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use ideate_engine::config::{ModelConfig, ValidationMode};
use ideate_engine::fields::{FieldProvider, Model};
use ideate_engine::geom::Point3;
use ideate_engine::molecule::MoleculeDirectory;
use ideate_engine::parse::shape_tsv::check_format;
use ideate_engine::session::Session;

#[derive(Parser, Debug)]
#[command(name = "ideate_cli")]
#[command(about = "Prepare and inspect radiative-transfer model configurations")]
struct Cli {
    /// Log at debug level regardless of RUST_LOG
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a configuration and the header of its shape file
    Check { config: PathBuf },
    /// Print the five field values at a point given in the coordinate unit
    Sample {
        config: PathBuf,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        y: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
    },
    /// Print the engine parameter block
    Params { config: PathBuf },
    /// Run every start-up step and write the engine configuration
    Prepare {
        config: PathBuf,
        /// Directory receiving the engine configuration and molecule files
        #[arg(long, default_value = ".ideate")]
        work_dir: PathBuf,
        /// Local directory holding `<species>.dat` files
        #[arg(long)]
        molecules: PathBuf,
        /// Where fetched molecule files are stored, default `<work-dir>/mols`
        #[arg(long)]
        mol_path: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    if let Err(err) = run(cli.command) {
        eprintln!("ideate_cli error: {err}");
        process::exit(1);
    }
}

fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Check { config } => {
            let config = ModelConfig::load(&config)?;
            config.validate(ValidationMode::Strict)?;
            if let Some(shape) = &config.run.shape_file {
                check_format(shape, &config.vars)?;
            }
            println!("ok");
        }
        Commands::Sample { config, x, y, z } => {
            let config = ModelConfig::load(&config)?;
            let model = Model::prepare(&config, ValidationMode::Lenient)?;
            let point = Point3::new(x, y, z) * model.length_factor();
            let sample = model.sample(point)?;
            println!("{}", serde_json::to_string_pretty(&sample)?);
        }
        Commands::Params { config } => {
            let params = ModelConfig::load(&config)?.model_parameters()?;
            println!("{}", serde_json::to_string_pretty(&params)?);
        }
        Commands::Prepare {
            config,
            work_dir,
            molecules,
            mol_path,
        } => {
            let mut session = Session::open(&config, work_dir)?;
            if let Some(dir) = mol_path {
                session = session.with_molecule_dir(dir);
            }
            let run = session.start(&MoleculeDirectory::new(molecules))?;
            println!("{}", run.config_file.display());
            if let Some(molecule) = &run.molecule {
                println!("{}", serde_json::to_string_pretty(molecule)?);
            }
            println!("{}", serde_json::to_string_pretty(&run.parameters)?);
        }
    }
    Ok(())
}
