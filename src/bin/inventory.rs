use anyhow::Result;
use clap::{Parser, Subcommand};
use stone_inventory::cli;
use stone_inventory::tracing::{init_tracing, LogFormat};
use stone_inventory::util::env;

#[derive(Parser, Debug)]
#[command(name = "inventory", version, about = "Stone inventory operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Load the merged dataset (cache first) and print a per-location summary
    Fetch {
        /// Ignore a fresh cache entry and refetch every location
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Facet selection as facet=value (repeatable), e.g. --filter color="Blue Pearl"
        #[arg(long = "filter")]
        filters: Vec<String>,
        /// Free-text search across every field
        #[arg(long)]
        search: Option<String>,
    },
    /// Print the distinct values of one facet
    Facets {
        /// type, color, design, finish, size or location
        field: String,
    },
    /// Print stone records and images for a product code
    Details {
        product_code: String,
    },
    /// Estimate the weight of a stone from its size text
    Weight {
        size: String,
        /// ft or in, for sizes written as bare numbers
        #[arg(long)]
        unit: Option<String>,
    },
    /// Remove the persisted cache entry
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    env::init_env();
    init_tracing("info", LogFormat::from_env())?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Fetch {
            force,
            filters,
            search,
        } => {
            use cli::fetch::{run, FetchConfig};
            run(FetchConfig {
                force,
                filters,
                search,
            })
            .await?;
        }
        Commands::Facets { field } => {
            use cli::facets::{run, FacetsConfig};
            run(FacetsConfig { field }).await?;
        }
        Commands::Details { product_code } => {
            use cli::details::{run, DetailsConfig};
            run(DetailsConfig { product_code }).await?;
        }
        Commands::Weight { size, unit } => {
            use cli::weight::{run, WeightConfig};
            run(WeightConfig { size, unit }).await?;
        }
        Commands::ClearCache => {
            use cli::clear_cache::{run, ClearCacheConfig};
            run(ClearCacheConfig).await?;
        }
    }

    Ok(())
}
