//! rok4 - storage and pyramid command line tool.
//!
//! Thin wrapper over `rok4_core`: every subcommand maps to one storage or
//! pyramid operation.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rok4_core::{
    config::{Cli, Command},
    Pyramid, PyramidError, PyramidType, SlabKind, Storage, TileExtractor, TmsDirectory,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let storage = Arc::new(Storage::new(cli.storage));

    let result = run(cli.command, storage.clone()).await;
    storage.disconnect().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "rok4_core=debug,rok4=debug"
    } else {
        "rok4_core=info,rok4=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(command: Command, storage: Arc<Storage>) -> Result<(), PyramidError> {
    match command {
        // =====================================================================
        // Storage commands
        // =====================================================================
        Command::Cat {
            path,
            offset,
            length,
        } => {
            let data = match (offset, length) {
                (Some(offset), Some(length)) => storage.read_range(&path, offset, length).await?,
                _ => storage.read_all(&path).await?,
            };
            write_stdout(&data)
        }

        Command::Exists { path } => {
            let exists = storage.exists(&path).await?;
            println!("{}", exists);
            Ok(())
        }

        Command::Size { path, recursive } => {
            let size = if recursive {
                storage.size_path(&path).await?
            } else {
                storage.size(&path).await?
            };
            println!("{}", size);
            Ok(())
        }

        Command::Copy { from, to, md5 } => {
            storage.copy(&from, &to, md5.as_deref()).await?;
            debug!(from = %from, to = %to, "copied");
            Ok(())
        }

        Command::Link { target, link, hard } => {
            storage.link(&target, &link, hard).await?;
            Ok(())
        }

        Command::Rm { path } => {
            storage.remove(&path).await?;
            Ok(())
        }

        // =====================================================================
        // Pyramid commands
        // =====================================================================
        Command::SlabPath {
            descriptor,
            level,
            column,
            row,
            mask,
        } => {
            let pyramid = load_pyramid(&storage, &descriptor).await?;
            let level_object = pyramid
                .level(&level)
                .ok_or_else(|| PyramidError::UnknownLevel(level.clone()))?;
            let kind = if mask { SlabKind::Mask } else { SlabKind::Data };

            println!(
                "{}",
                pyramid.slab_path(
                    kind,
                    &level,
                    column / level_object.slab_width() as u64,
                    row / level_object.slab_height() as u64,
                    true
                )
            );
            Ok(())
        }

        Command::Tile {
            descriptor,
            level,
            column,
            row,
            output,
        } => {
            let pyramid = load_pyramid(&storage, &descriptor).await?;
            let extractor = TileExtractor::new(storage.clone());

            if let Some(output) = output {
                let Some(data) = extractor.tile_binary(&pyramid, &level, column, row).await? else {
                    println!("No tile");
                    return Ok(());
                };
                storage.write_all(&output, data).await?;
                return Ok(());
            }

            match pyramid.pyramid_type() {
                PyramidType::Vector => {
                    match extractor.tile_vector(&pyramid, &level, column, row).await? {
                        Some(tile) => {
                            let json = serde_json::to_string_pretty(&tile)
                                .map_err(|e| PyramidError::Invalid(e.to_string()))?;
                            println!("{}", json);
                        }
                        None => println!("No tile"),
                    }
                }
                PyramidType::Raster => {
                    match extractor.tile_raster(&pyramid, &level, column, row).await? {
                        Some(tile) => {
                            let (height, width, channels) = tile.shape();
                            println!("{}x{}x{} {}", height, width, channels, pyramid.format());
                        }
                        None => println!("No tile"),
                    }
                }
            }
            Ok(())
        }
    }
}

async fn load_pyramid(storage: &Arc<Storage>, descriptor: &str) -> Result<Pyramid, PyramidError> {
    let tms = TmsDirectory::from_config(storage.clone())?;
    Pyramid::from_descriptor(storage, &tms, descriptor).await
}

fn write_stdout(data: &[u8]) -> Result<(), PyramidError> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(data)
        .and_then(|_| stdout.flush())
        .map_err(|e| PyramidError::Invalid(format!("Cannot write to stdout: {}", e)))
}
