use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use data_loader::{DataIndex, Movie, Rating};
use knn::SimilarityMetric;
use node_protocol::NodeServer;
use server::{
    catalog, DispatchMode, MemoryCache, MemoryStore, PostgresStore, RecommendationCache,
    RecommendationService, RecommendationStore, RecommendedItem, RedisCache, ServiceConfig,
    Source,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

const MIB: usize = 1024 * 1024;

/// knn-recs - distributed KNN movie recommendations
#[derive(Parser)]
#[command(name = "knn-recs")]
#[command(about = "User-based KNN recommendations fanned out over worker nodes", long_about = None)]
struct Cli {
    /// Path to the MovieLens dataset directory
    #[arg(short, long, env = "KNN_DATA_DIR", default_value = "data/ml-latest-small")]
    data_dir: PathBuf,

    /// Print JSON instead of a formatted listing
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a worker node
    Node {
        /// Address to listen on
        #[arg(long, env = "KNN_LISTEN", default_value = "0.0.0.0:9001")]
        listen: String,

        /// Largest task frame accepted, in MiB
        #[arg(long, env = "KNN_MAX_FRAME_MIB", default_value = "256")]
        max_frame_mib: usize,
    },

    /// Get movie recommendations for a user
    Recommend {
        /// User ID to get recommendations for
        user_id: String,

        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Show a user's ratings
    Ratings {
        user_id: String,
    },

    /// List the movies of a genre
    Genre {
        /// Genre name, e.g. "Sci-Fi"
        name: String,
    },

    /// List the full catalog
    Movies,
}

#[derive(Args)]
struct ServiceArgs {
    /// Worker node addresses, in partition order
    #[arg(long, env = "KNN_NODES", value_delimiter = ',', required = true)]
    nodes: Vec<String>,

    /// Neighborhood size
    #[arg(short, long, default_value = "50")]
    k: usize,

    /// Number of recommendations
    #[arg(short = 'n', long, default_value = "10")]
    top_n: usize,

    #[arg(long, default_value = "cosine")]
    metric: SimilarityMetric,

    #[arg(long, default_value = "concurrent")]
    dispatch: DispatchMode,

    /// Per-stage node I/O timeout in seconds
    #[arg(long, default_value = "30")]
    node_timeout_secs: u64,

    /// Largest node frame, in MiB; must not exceed the nodes' own limit
    #[arg(long, env = "KNN_MAX_FRAME_MIB", default_value = "256")]
    max_frame_mib: usize,

    /// Cache entry lifetime in seconds
    #[arg(long, default_value = "600")]
    cache_ttl_secs: u64,

    /// Redis URL; an in-process cache is used when absent
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// PostgreSQL URL; an in-process store is used when absent
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

impl ServiceArgs {
    fn config(&self) -> ServiceConfig {
        ServiceConfig::new(self.nodes.clone())
            .with_k(self.k)
            .with_top_n(self.top_n)
            .with_metric(self.metric)
            .with_dispatch(self.dispatch)
            .with_node_timeout(Duration::from_secs(self.node_timeout_secs))
            .with_cache_ttl(Duration::from_secs(self.cache_ttl_secs))
            .with_max_frame_len(self.max_frame_mib.saturating_mul(MIB))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Node {
            listen,
            max_frame_mib,
        } => handle_node(&listen, max_frame_mib.saturating_mul(MIB)).await?,
        Commands::Recommend { user_id, service } => {
            let data_index = load_data(&cli.data_dir)?;
            handle_recommend(data_index, &user_id, &service, cli.json).await?
        }
        Commands::Ratings { user_id } => {
            let data_index = load_data(&cli.data_dir)?;
            handle_ratings(&data_index, &user_id, cli.json)?
        }
        Commands::Genre { name } => {
            let data_index = load_data(&cli.data_dir)?;
            let movies = catalog::movies_by_genre(&data_index, &name)?;
            print_movies(&movies, cli.json)?
        }
        Commands::Movies => {
            let data_index = load_data(&cli.data_dir)?;
            print_movies(&catalog::all_movies(&data_index), cli.json)?
        }
    }

    Ok(())
}

fn load_data(data_dir: &Path) -> Result<Arc<DataIndex>> {
    eprintln!("Loading MovieLens dataset from {}...", data_dir.display());
    let start = Instant::now();
    let data_index = DataIndex::load_from_files(data_dir).context("Failed to load MovieLens dataset")?;
    eprintln!("{} Loaded dataset in {:?}", "✓".green(), start.elapsed());
    Ok(Arc::new(data_index))
}

/// Handle the 'node' command
async fn handle_node(listen: &str, max_frame_len: usize) -> Result<()> {
    let server = NodeServer::bind(listen)
        .await
        .with_context(|| format!("Failed to bind node on {}", listen))?
        .with_max_frame_len(max_frame_len);
    server
        .serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}

/// Handle the 'recommend' command
async fn handle_recommend(
    data_index: Arc<DataIndex>,
    user_id: &str,
    args: &ServiceArgs,
    json: bool,
) -> Result<()> {
    let user_id = catalog::parse_user_id(Some(user_id))?;

    let cache: Arc<dyn RecommendationCache> = match &args.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await.context("Failed to connect to Redis")?),
        None => Arc::new(MemoryCache::new()),
    };
    let store: Arc<dyn RecommendationStore> = match &args.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("Failed to connect to PostgreSQL")?;
            store.ensure_schema().await.context("Failed to prepare schema")?;
            Arc::new(store)
        }
        None => Arc::new(MemoryStore::new()),
    };

    let service = RecommendationService::new(data_index, args.config(), cache, store)?;

    let start = Instant::now();
    let served = service.recommend(user_id).await?;
    let elapsed = start.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&served.items)?);
    } else {
        print_recommendations(user_id, &served.items, served.source, elapsed);
    }

    // The process is about to exit; let the background write finish first
    if let Some(persistence) = served.persistence {
        match persistence.await {
            Ok(outcome) => info!("Persistence finished: {:?}", outcome),
            Err(e) => warn!("Persistence task failed: {}", e),
        }
    }
    Ok(())
}

/// Handle the 'ratings' command
fn handle_ratings(data_index: &DataIndex, user_id: &str, json: bool) -> Result<()> {
    let user_id = catalog::parse_user_id(Some(user_id))?;
    let ratings = catalog::ratings(data_index, user_id);

    if json {
        println!("{}", serde_json::to_string_pretty(ratings)?);
        return Ok(());
    }

    println!("{}", format!("Ratings for user {}:", user_id).bold().blue());
    if ratings.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    let mut sorted: Vec<&Rating> = ratings.iter().collect();
    sorted.sort_by(|a, b| b.rating.total_cmp(&a.rating).then(a.movie_id.cmp(&b.movie_id)));
    for rating in sorted {
        let title = data_index.title(rating.movie_id).unwrap_or("<unknown>");
        println!("  {} {} ({})", format!("{:.1}", rating.rating).yellow(), title, rating.movie_id);
    }
    let avg = ratings.iter().map(|r| r.rating as f64).sum::<f64>() / ratings.len() as f64;
    println!("{}{} ratings, average {:.2}", "• ".cyan(), ratings.len(), avg);
    Ok(())
}

fn print_movies(movies: &[&Movie], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(movies)?);
        return Ok(());
    }
    for movie in movies {
        let genres = movie
            .genres
            .iter()
            .map(|g| g.to_string())
            .collect::<Vec<_>>()
            .join("|");
        println!("{}: {} [{}]", movie.id.to_string().green(), movie.title, genres);
    }
    println!("{}{} movies", "• ".cyan(), movies.len());
    Ok(())
}

fn print_recommendations(
    user_id: u32,
    items: &[RecommendedItem],
    source: Source,
    elapsed: Duration,
) {
    println!(
        "{}",
        format!("Recommendations for user {} ({:?}, {:.2?}):", user_id, source, elapsed)
            .bold()
            .blue()
    );
    if items.is_empty() {
        println!("  (no movie could be predicted)");
    }
    for (rank, item) in items.iter().enumerate() {
        println!(
            "{}. {} - predicted {:.2}",
            (rank + 1).to_string().green(),
            item.title.as_deref().unwrap_or("<unknown title>"),
            item.predicted
        );
    }
}
