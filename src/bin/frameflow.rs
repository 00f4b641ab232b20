//! CLI for Frameflow - animate an image with Veo.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use frameflow::controller::BILLING_URL;
use frameflow::video::{VeoApi, VeoModel};
use frameflow::{
    AspectRatio, CancelToken, Controller, EnvKeys, GenerationClient, ImageFile, KeyState,
};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "frameflow")]
#[command(about = "Animate a still image into a short video with Veo")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Animate an image
    Animate(AnimateArgs),

    /// Report whether an API key is selected
    KeyStatus,
}

#[derive(Args)]
struct AnimateArgs {
    /// Image to animate
    image: PathBuf,

    /// Output video path
    #[arg(short, long)]
    output: PathBuf,

    /// Text prompt describing the motion
    #[arg(short, long, default_value = "")]
    prompt: String,

    /// Output aspect ratio
    #[arg(long, value_enum, default_value = "16:9")]
    aspect_ratio: AspectRatioArg,

    /// Veo model
    #[arg(short, long, value_enum, default_value = "fast")]
    model: ModelArg,

    /// Seconds between status polls
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Give up after this many polls
    #[arg(long)]
    max_polls: Option<u32>,

    /// Give up after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// API base URL
    #[arg(long, env = "FRAMEFLOW_BASE_URL")]
    base_url: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "16:9")]
    Landscape,
    #[value(name = "9:16")]
    Portrait,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Landscape => AspectRatio::Landscape,
            AspectRatioArg::Portrait => AspectRatio::Portrait,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    Fast,
    Standard,
}

impl From<ModelArg> for VeoModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Fast => VeoModel::Veo31FastPreview,
            ModelArg::Standard => VeoModel::Veo31Preview,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("frameflow=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Animate(args) => {
            animate(args, cli.json).await?;
        }
        Commands::KeyStatus => {
            key_status(cli.json).await?;
        }
    }

    Ok(())
}

fn env_keys() -> Arc<EnvKeys> {
    Arc::new(EnvKeys::from_env().interactive(std::io::stdin().is_terminal()))
}

async fn animate(args: AnimateArgs, json_output: bool) -> anyhow::Result<()> {
    let keys = env_keys();

    let mut api = VeoApi::builder().model(args.model.into());
    if let Some(url) = args.base_url {
        api = api.base_url(url);
    }

    let mut builder = GenerationClient::builder()
        .key_provider(keys.clone())
        .credentials(keys.clone())
        .api(Arc::new(api.build()?))
        .poll_interval(Duration::from_secs(args.poll_interval));
    if let Some(max) = args.max_polls {
        builder = builder.max_polls(max);
    }
    if let Some(secs) = args.timeout {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    let mut controller = Controller::new(keys, builder.build()?);

    if controller.check_key_status().await == KeyState::Missing {
        controller
            .request_key_selection()
            .await
            .context("no API key selected")?;
    }

    let file = ImageFile::open(&args.image)
        .with_context(|| format!("failed to read {}", args.image.display()))?;
    controller.select_image(file)?;
    controller.set_prompt(args.prompt);
    controller.set_aspect_ratio(args.aspect_ratio.into());

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
    }

    eprintln!("Generating video (this may take a few minutes)...");
    if let Err(e) = controller.generate_with_cancel(&cancel).await {
        let view = controller.view();
        if let Some(message) = view.error {
            eprintln!("{message}");
        }
        if e.is_key_error() {
            eprintln!("See {BILLING_URL} for key and billing setup.");
        }
        return Err(e.into());
    }

    let video = controller
        .state()
        .result
        .as_ref()
        .context("generation finished without a video")?;
    video.save(&args.output)?;

    if json_output {
        let result = serde_json::json!({
            "type": "video",
            "success": true,
            "output": args.output.display().to_string(),
            "size_bytes": video.size(),
            "model": video.metadata.model,
            "aspect_ratio": video.metadata.aspect_ratio,
            "resolution": video.metadata.resolution,
            "polls": video.metadata.polls,
            "duration_ms": video.metadata.duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Generated video: {} ({} bytes)",
            args.output.display(),
            video.size()
        );
        if let Some(duration) = video.metadata.duration_ms {
            println!("Generation time: {}ms", duration);
        }
    }

    Ok(())
}

async fn key_status(json_output: bool) -> anyhow::Result<()> {
    let keys = env_keys();
    let client = GenerationClient::builder()
        .key_provider(keys.clone())
        .credentials(keys.clone())
        .build()?;
    let mut controller = Controller::new(keys, client);
    let state = controller.check_key_status().await;
    let view = controller.view();

    if json_output {
        let result = serde_json::json!({
            "key_selected": state.is_present(),
            "env_vars": frameflow::key::KEY_ENV_VARS,
            "billing_url": view.billing_url,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if state.is_present() {
        println!("API key selected.");
    } else {
        println!(
            "No API key selected. Set {} (see {}).",
            frameflow::key::KEY_ENV_VARS.join(", "),
            view.billing_url
        );
    }

    Ok(())
}
