//! Scene Search CLI - index a video by scenes and search it by text
//!
//! Two retrieval paths share the collage output: `search` fuzzy-matches a
//! word against captions generated for every detected scene, while `ask`
//! sends the whole video plus a prompt to a generative video-understanding
//! model and samples frames out of the time ranges it returns.

use anyhow::{bail, Context as _, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use scene_search_captioning::GeminiCaptioner;
use scene_search_collage::{generate_collage, CollageConfig};
use scene_search_indexer::{
    build_index, caption_vocabulary, find_matches, IndexConfig, DEFAULT_THRESHOLD,
};
use scene_search_video_query::{
    extract_frames, query_video, GeminiVideoClient, VideoQueryConfig,
};

#[derive(Parser)]
#[command(
    name = "scene-search",
    version,
    about = "Searchable scene index over a downloaded video",
    after_help = "EXAMPLES:\n  \
                  # Build the scene index for a video found by search query\n  \
                  scene-search index --query \"super mario movie trailer\"\n\n  \
                  # Fuzzy-search the captions and collage the matching scenes\n  \
                  scene-search search --word car\n\n  \
                  # List completion candidates drawn from the captions\n  \
                  scene-search search --word car --suggest\n\n  \
                  # Ask a video-understanding model directly\n  \
                  scene-search ask --prompt \"mario jumping\" --video ./trailer.mp4"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct IndexArgs {
    /// Search query used to locate the source video
    #[arg(long)]
    query: String,

    /// Scene caption store path
    #[arg(long, default_value = "scene_captions.json")]
    store: PathBuf,

    /// Directory for representative scene frames
    #[arg(long, default_value = "scene_images")]
    scenes_dir: PathBuf,

    /// Scene change detection sensitivity (0-100)
    #[arg(long, default_value_t = 30.0)]
    detect_threshold: f64,

    /// Minimum scene length in frames
    #[arg(long, default_value_t = 15)]
    min_scene_len: u64,

    /// Captioning model
    #[arg(long, default_value = "gemini-1.5-pro")]
    model: String,
}

#[derive(Args)]
struct SearchArgs {
    /// Word or phrase to match against scene captions
    #[arg(long)]
    word: String,

    /// Fuzzy-match acceptance threshold (0-100)
    #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
    threshold: f64,

    /// Scene caption store path
    #[arg(long, default_value = "scene_captions.json")]
    store: PathBuf,

    /// Print the caption vocabulary instead of searching
    #[arg(long)]
    suggest: bool,

    /// Collage output path
    #[arg(long, default_value = "collage.png")]
    output: PathBuf,

    /// Skip opening the collage in the system viewer
    #[arg(long)]
    no_open: bool,
}

#[derive(Args)]
struct AskArgs {
    /// What to find in the video
    #[arg(long)]
    prompt: String,

    /// Path to the video file to analyze
    #[arg(long)]
    video: PathBuf,

    /// Video-understanding model
    #[arg(long, default_value = "gemini-1.5-pro")]
    model: String,

    /// Frame sampling period within matched ranges, in seconds
    #[arg(long, default_value_t = 3.0)]
    period: f64,

    /// Directory extracted frames are written into
    #[arg(long, default_value = "extracted_images")]
    frames_dir: PathBuf,

    /// Collage output path
    #[arg(long, default_value = "collage.png")]
    output: PathBuf,

    /// Skip opening the collage in the system viewer
    #[arg(long)]
    no_open: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the scene caption index (no-op if the store already exists)
    Index(IndexArgs),

    /// Fuzzy-search captions and collage the matching scenes
    Search(SearchArgs),

    /// Ask a video-understanding model for matching time ranges
    Ask(AskArgs),
}

fn main() -> Result<()> {
    // Credentials may live in a .env next to the binary; absence is fine.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    scene_search_frames::init().context("Failed to initialize FFmpeg")?;

    match cli.command {
        Commands::Index(args) => run_index(&args),
        Commands::Search(args) => run_search(&args),
        Commands::Ask(args) => run_ask(&args),
    }
}

fn run_index(args: &IndexArgs) -> Result<()> {
    let model = GeminiCaptioner::from_env(&args.model)
        .context("Captioning model initialization failed")?;

    let mut config = IndexConfig::default();
    config.detector.threshold = args.detect_threshold;
    config.detector.min_scene_len = args.min_scene_len;

    let store = build_index(&model, &args.query, &args.scenes_dir, &args.store, &config)
        .context("Indexing pipeline failed")?;
    info!("Scene index ready at {}", store.display());
    Ok(())
}

fn run_search(args: &SearchArgs) -> Result<()> {
    let word = args.word.trim();
    if word.is_empty() {
        bail!("Please type a word.");
    }

    if args.suggest {
        for candidate in caption_vocabulary(&args.store) {
            println!("{candidate}");
        }
        return Ok(());
    }

    if !args.store.exists() {
        bail!(
            "Scene store {} does not exist; run `scene-search index` first",
            args.store.display()
        );
    }

    let matched: Vec<PathBuf> = find_matches(word, &args.store, args.threshold)
        .into_iter()
        .map(PathBuf::from)
        .collect();
    info!("{} scenes matched '{}'", matched.len(), word);

    let config = CollageConfig {
        output_file: args.output.clone(),
        open_after_save: !args.no_open,
        ..CollageConfig::default()
    };
    generate_collage(&matched, &config).context("Collage composition failed")?;
    Ok(())
}

fn run_ask(args: &AskArgs) -> Result<()> {
    let prompt = args.prompt.trim();
    if prompt.is_empty() {
        bail!("Please type a word.");
    }

    let client = GeminiVideoClient::from_env(&args.model)
        .context("Video analysis model initialization failed")?;

    let config = VideoQueryConfig {
        sample_period: args.period,
        extracted_dir: args.frames_dir.clone(),
        ..VideoQueryConfig::default()
    };

    let ranges = query_video(&client, prompt, &args.video, &config)
        .context("Video analysis failed")?;
    info!("Model returned {} usable time ranges", ranges.len());

    let frames = extract_frames(&ranges, &args.video, &config)
        .context("Frame extraction failed")?;

    let collage_config = CollageConfig {
        output_file: args.output.clone(),
        open_after_save: !args.no_open,
        ..CollageConfig::default()
    };
    generate_collage(&frames, &collage_config).context("Collage composition failed")?;
    Ok(())
}
