//! CLI for Smart Image - image generation across AWS Bedrock, OpenAI and Gemini.

use clap::{Args, Parser, Subcommand};
use smart_image::{
    GenerateImageArgs, ImageTools, McpServer, Provider, ProviderConfig, SmartImageError,
    TransformImageArgs,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "smart-image")]
#[command(about = "Generate and transform images via AWS Bedrock, OpenAI and Gemini")]
#[command(version)]
struct Cli {
    /// Defaults to `mcp` when omitted
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging (debug level) on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List available image models
    Models {
        /// Only show models from this provider (aws, openai, gemini)
        #[arg(short, long, value_parser = parse_provider)]
        provider: Option<Provider>,
    },

    /// Generate an image from a text prompt
    Generate(GenerateArgs),

    /// Transform an existing image according to a prompt
    Transform(TransformArgs),

    /// Show prompt writing guidance
    Guide,

    /// Run as MCP server (for AI agent integration)
    Mcp,
}

#[derive(Args)]
struct GenerateArgs {
    /// The text prompt describing the image
    prompt: String,

    /// Model identifier (see `smart-image models`)
    #[arg(short, long)]
    model: String,

    /// Output file path
    #[arg(short, long)]
    output: String,

    /// Reference image steering style or content
    #[arg(short, long)]
    reference: Option<String>,

    /// Image width in pixels
    #[arg(long, default_value_t = smart_image::image::DEFAULT_SIZE)]
    width: u32,

    /// Image height in pixels
    #[arg(long, default_value_t = smart_image::image::DEFAULT_SIZE)]
    height: u32,
}

#[derive(Args)]
struct TransformArgs {
    /// Image to transform
    input: String,

    /// Description of the change
    prompt: String,

    /// Model identifier (see `smart-image models`)
    #[arg(short, long)]
    model: String,

    /// Output file path
    #[arg(short, long)]
    output: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let command = cli.command.unwrap_or(Commands::Mcp);
    if matches!(command, Commands::Guide) {
        println!("{}", ImageTools::new(ProviderConfig::disabled()).prompt_guide());
        return Ok(());
    }

    let config = ProviderConfig::from_env()?;
    tracing::debug!(providers = ?config.enabled_providers(), "configuration loaded");
    let tools = ImageTools::new(config);

    match command {
        Commands::Models { provider } => list_models(&tools, provider, cli.json).await?,
        Commands::Generate(args) => generate(&tools, args, cli.json).await?,
        Commands::Transform(args) => transform(&tools, args, cli.json).await?,
        Commands::Mcp => run_mcp_server(tools).await?,
        Commands::Guide => {}
    }

    Ok(())
}

fn parse_provider(slug: &str) -> Result<Provider, String> {
    Provider::from_slug(slug)
        .ok_or_else(|| format!("unknown provider '{}', expected aws, openai or gemini", slug))
}

/// Logs go to stderr so stdout stays clean for MCP.
fn init_tracing(verbose: bool) {
    let default = if verbose { "smart_image=debug" } else { "smart_image=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn list_models(
    tools: &ImageTools,
    provider: Option<Provider>,
    json_output: bool,
) -> anyhow::Result<()> {
    let mut models = tools.list_models().await?;
    if let Some(provider) = provider {
        models.retain(|m| m.provider == provider);
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else if models.is_empty() {
        println!(
            "No models available. Enable a provider with ENABLE_AWS, ENABLE_OPENAI or ENABLE_GEMINI."
        );
    } else {
        for model in &models {
            println!(
                "{:<8} {:<48} {}",
                model.provider.slug(),
                model.model_id,
                model.display_name
            );
        }
    }

    Ok(())
}

async fn generate(tools: &ImageTools, args: GenerateArgs, json_output: bool) -> anyhow::Result<()> {
    let result = tools
        .generate_image(GenerateImageArgs {
            prompt: args.prompt,
            model_id: args.model.clone(),
            output_path: args.output,
            reference_image: args.reference,
            width: args.width,
            height: args.height,
        })
        .await;
    report(result, &args.model, json_output)
}

async fn transform(
    tools: &ImageTools,
    args: TransformArgs,
    json_output: bool,
) -> anyhow::Result<()> {
    let result = tools
        .transform_image(TransformImageArgs {
            image_path: args.input,
            prompt: args.prompt,
            model_id: args.model.clone(),
            output_path: args.output,
        })
        .await;
    report(result, &args.model, json_output)
}

fn report(
    result: smart_image::Result<smart_image::ToolOutput>,
    model: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    match result {
        Ok(output) => {
            if json_output {
                let result = serde_json::json!({
                    "success": true,
                    "output_path": output.output_path,
                    "model": model,
                });
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Saved image: {} via {}", output.output_path, model);
            }
            Ok(())
        }
        Err(e) if json_output => {
            print_error_json(&e)?;
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

fn print_error_json(err: &SmartImageError) -> anyhow::Result<()> {
    let result = serde_json::json!({
        "success": false,
        "error": err.to_string(),
        "kind": err.kind(),
        "provider": err.provider(),
    });
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn run_mcp_server(tools: ImageTools) -> anyhow::Result<()> {
    tracing::info!("starting MCP server on stdio");
    let server = McpServer::new(tools);
    server.run().await?;
    Ok(())
}
