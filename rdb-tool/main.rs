//!
//! @file main.rs
//! @brief Developer front end for the relocation database files.
//! @bug No known bugs.
//!

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use host_common::version::RuntimeVersion;
use reloc_db::{RelocationDatabase, RelocationDatabaseItem};

#[derive(Parser)]
#[command(name = "rdb-tool")]
#[command(about = "Inspect and edit relocation database files")]
struct Args {
    /// Directory holding the database files.
    #[arg(short, long, default_value = ".")]
    dir: PathBuf,

    /// Host version the database is bound to, e.g. 1.6.1130.0.
    #[arg(short, long)]
    version: RuntimeVersion,

    #[command(subcommand)]
    command: Command
}

#[derive(Subcommand)]
enum Command {
    /// Create a fresh, empty database for the version, replacing any
    /// existing file.
    Create,

    /// Merge a developer file into the database, adding the named item or
    /// replacing the entries of the existing one.
    Update {
        /// The item to add or update.
        name: String,

        /// The developer file to read.
        file: PathBuf
    },

    /// Write one item out as a developer file.
    Extract {
        /// The item to extract.
        name: String,

        /// The developer file to write.
        file: PathBuf
    },

    /// Print every item and entry to stdout.
    Dump
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Create => {
            RelocationDatabase::create(args.version).save(&args.dir)?;
            println!(
                "Created {}",
                RelocationDatabase::path_in(&args.dir, args.version).display()
            );
        },

        Command::Update { ref name, ref file } => {
            let item = RelocationDatabaseItem::load_developed(&file)
                .with_context(|| format!("failed to parse {}", file.display()))?;
            if item.name() != name {
                bail!("{} describes item {}, not {}", file.display(), item.name(), name);
            }

            let mut db = open(&args)?;
            if db.get_by_name(&name).is_some() {
                db.update(item)?;
                println!("Updated {} ({} entries)", name, count(&db, &name));
            } else {
                db.append(item)?;
                println!("Added {} ({} entries)", name, count(&db, &name));
            }
            db.save(&args.dir)?;
        },

        Command::Extract { ref name, ref file } => {
            let db = open(&args)?;
            let item = match db.get_by_name(&name) {
                Some(item) => item,
                None => bail!("no item named {}", name)
            };

            item.save_developed(&file)
                .with_context(|| format!("failed to write {}", file.display()))?;
            println!("Wrote {} entries to {}", item.len(), file.display());
        },

        Command::Dump => {
            let db = open(&args)?;
            println!("version {}, {} items", db.version(), db.len());
            for item in db.items() {
                println!();
                println!("item {} (source: {})", item.name(), item.source());
                for entry in item.entries() {
                    print!(
                        "  {} {:#010x} {}",
                        entry.version(),
                        entry.offset(),
                        entry.kind().keyword()
                    );
                    match entry.redirect_target() {
                        Some(target) => println!(" {:#x}", target.offset()),
                        None => {
                            for b in entry.payload() {
                                print!(" {:02x}", b);
                            }
                            println!();
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Opens the database named by the command line.
fn open(
    args: &Args
) -> Result<RelocationDatabase> {
    RelocationDatabase::open(&args.dir, args.version).with_context(|| {
        format!(
            "failed to open {}",
            RelocationDatabase::path_in(&args.dir, args.version).display()
        )
    })
}

/// Gets the entry count of an item known to be present.
fn count(
    db: &RelocationDatabase,
    name: &str
) -> usize {
    db.get_by_name(name).map(|i| i.len()).unwrap_or(0)
}
