#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Operator CLI for the terrain ETL pipeline.
//!
//! Configuration comes from the environment (see
//! [`terrain_etl::config`]); `RUST_LOG` controls log output.

mod app;
mod export;

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use serde_json::Value;
use terrain_etl::{EtlConfig, EtlWorker};
use terrain_etl_terrain_models::{LayerName, ProjectRef};

use crate::app::App;

#[derive(Parser)]
#[command(name = "terrain_etl", about = "Terrain ETL pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load reference datasets and run each configured country's initializer
    Init,
    /// Print the area of a geometry in hectares
    Area {
        /// `GeoJSON` file, or inline `GeoJSON`
        geometry: String,
    },
    /// Resolve the country and subdivision containing a geometry
    Region {
        /// `GeoJSON` file, or inline `GeoJSON`
        geometry: String,
    },
    /// Run the full pipeline for a project and wait for it to finish
    Run {
        project_id: String,
        /// `GeoJSON` file, or inline `GeoJSON`
        geometry: String,
    },
    /// Re-run a single layer (`dem`, `soil`, `land_cover`)
    Backfill {
        project_id: String,
        layer: String,
        /// Geometry to use instead of the one stored by the last run
        #[arg(long)]
        geometry: Option<String>,
    },
    /// Show per-layer status of a project
    Status { project_id: String },
    /// Write a stored layer as a single-band `GeoTIFF`
    Export {
        project_id: String,
        layer: String,
        output: PathBuf,
    },
    /// Delete a project's terrain document
    Delete { project_id: String },
}

/// Reads `arg` as a path when it names a file, otherwise as JSON text.
fn read_geometry(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let path = PathBuf::from(arg);
    let text = if path.is_file() {
        std::fs::read_to_string(&path)?
    } else {
        arg.to_string()
    };
    Ok(serde_json::from_str(&text)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    if let Commands::Area { geometry } = &cli.command {
        let hectares = terrain_etl_geometry::compute_area_hectares(&read_geometry(geometry)?)?;
        println!("{hectares:.4} ha");
        return Ok(());
    }

    let app = App::build(EtlConfig::from_env())?;

    match cli.command {
        Commands::Area { .. } => {}
        Commands::Init => {
            log::info!("Initializing reference datasets...");
            app.initialize().await?;
            log::info!("Initialization complete.");
        }
        Commands::Region { geometry } => {
            let region = app.resolver.resolve(&read_geometry(&geometry)?).await?;
            println!("{}", serde_json::to_string_pretty(&region)?);
        }
        Commands::Run {
            project_id,
            geometry,
        } => {
            let project = ProjectRef {
                project_id: project_id.clone(),
                geometry: read_geometry(&geometry)?,
            };
            let worker = EtlWorker::start(
                app.pipeline.clone(),
                app.config.workers,
                app.config.queue_capacity,
            );
            worker.submit(project).await?;
            worker.shutdown().await;

            let terrain = app
                .repo
                .get(&project_id)
                .await?
                .ok_or_else(|| format!("No terrain stored for project {project_id}"))?;
            print!("{}", export::render_status(&terrain));
        }
        Commands::Backfill {
            project_id,
            layer,
            geometry,
        } => {
            let geometry = geometry.as_deref().map(read_geometry).transpose()?;
            let outcome = app.pipeline.backfill(&project_id, &layer, geometry).await?;
            println!(
                "{} {} ({} cells/rows)",
                outcome.layer,
                outcome.status.status,
                outcome.count
            );
        }
        Commands::Status { project_id } => {
            let terrain = app
                .repo
                .get(&project_id)
                .await?
                .ok_or_else(|| format!("No terrain stored for project {project_id}"))?;
            print!("{}", export::render_status(&terrain));
        }
        Commands::Export {
            project_id,
            layer,
            output,
        } => {
            let layer = LayerName::from_str(&layer).map_err(|_| format!("Unknown layer: {layer}"))?;
            let terrain = app
                .repo
                .get(&project_id)
                .await?
                .ok_or_else(|| format!("No terrain stored for project {project_id}"))?;
            let (grid, transform) = export::layer_raster(&terrain, layer)
                .ok_or_else(|| format!("Project {project_id} has no {layer} grid"))?;
            let bytes = terrain_etl_raster::encode(&grid, &transform, None)?;
            std::fs::write(&output, bytes)?;
            log::info!("Wrote {layer} for project {project_id} to {}", output.display());
        }
        Commands::Delete { project_id } => {
            let removed = app.repo.delete(&project_id).await?;
            println!("Deleted {removed} terrain document(s)");
        }
    }

    Ok(())
}
