use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use veloxdb::storage::page::VectorRecord;
use veloxdb::Db;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the database file.
    path: PathBuf,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Create a new collection.
    CreateCollection { id: u32, dimensions: u32 },
    /// Insert one vector into an existing collection.
    Add {
        collection: u32,
        id: u32,
        /// Comma-separated float32 components, e.g. "1.0,2.0,3.0".
        position: String,
    },
    /// Print the number of collections and, for one, its vector count.
    Info { collection: Option<u32> },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut db = Db::open(&cli.path)?;

    match cli.command {
        Action::CreateCollection { id, dimensions } => {
            db.create_collection(id, dimensions)?;
            println!("created collection {id} ({dimensions} dims)");
        }
        Action::Add {
            collection,
            id,
            position,
        } => {
            let position: Vec<f32> = position
                .split(',')
                .map(|s| s.trim().parse::<f32>())
                .collect::<Result<_, _>>()?;
            let mut handle = db.collection(collection)?;
            handle.add(VectorRecord { id, position })?;
            db.flush()?;
            println!("inserted vector {id} into collection {collection}");
        }
        Action::Info { collection } => {
            println!("collections: {}", db.collection_count()?);
            if let Some(id) = collection {
                let mut handle = db.collection(id)?;
                println!("collection {id}: {} vectors", handle.len()?);
            }
        }
    }

    db.close()?;
    Ok(())
}
