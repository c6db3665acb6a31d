use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "stack-cli")]
#[command(about = "Probe client for counter-stack tiers", long_about = None)]
struct Cli {
    /// Base URL of the tier to probe.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// GET /liveness
    Liveness,
    /// GET /readiness
    Readiness,
    /// GET /metrics
    Metrics,
    /// GET / on the API tier (increments the counter)
    Hit,
    /// GET /send on the web tier
    Send,
}

impl Commands {
    fn path(&self) -> &'static str {
        match self {
            Commands::Liveness => "/liveness",
            Commands::Readiness => "/readiness",
            Commands::Metrics => "/metrics",
            Commands::Hit => "/",
            Commands::Send => "/send",
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let url = format!("{}{}", cli.url.trim_end_matches('/'), cli.command.path());
    let res = client.get(&url).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let request_id = res
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let text = res.text().await?;
    println!("{}", status);
    if let Some(id) = request_id {
        println!("x-request-id: {}", id);
    }
    println!("{}", text.trim_end());

    if !status.is_success() {
        return Err(format!("request failed with status {}", status).into());
    }
    Ok(())
}
