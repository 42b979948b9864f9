use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "proxy-cli")]
#[command(about = "Management CLI for origin-dispatch", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "ORIGIN_DISPATCH_ADMIN_KEY")]
    key: String,

    /// Print the raw JSON instead of a table.
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check proxy system status
    Status,
    /// List origins and pool statistics, for every application or one
    Origins { app: Option<String> },
    /// Put an origin back into rotation
    Enable { app: String, origin: String },
    /// Take an origin out of rotation
    Disable { app: String, origin: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{}/admin/status", cli.url)),
        Commands::Origins { app: None } => client.get(format!("{}/admin/origins", cli.url)),
        Commands::Origins { app: Some(app) } => client.get(format!("{}/admin/origins/{app}", cli.url)),
        Commands::Enable { app, origin } => {
            client.post(format!("{}/admin/origins/{app}/{origin}/enable", cli.url))
        }
        Commands::Disable { app, origin } => {
            client.post(format!("{}/admin/origins/{app}/{origin}/disable", cli.url))
        }
    };

    let res = request.headers(headers).send().await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    if cli.json || matches!(cli.command, Commands::Status) {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        print_origins(&json);
    }
    Ok(())
}

/// One line per origin: application, id, state, address, busy/available connections.
fn print_origins(json: &Value) {
    let applications = match json {
        Value::Array(apps) => apps.clone(),
        app => vec![app.clone()],
    };

    println!("{:<16} {:<16} {:<9} {:<24} {:>5} {:>5}", "APP", "ORIGIN", "STATE", "ADDRESS", "BUSY", "IDLE");
    for app in &applications {
        let app_id = app["app_id"].as_str().unwrap_or("-");
        for origin in app["origins"].as_array().into_iter().flatten() {
            println!(
                "{:<16} {:<16} {:<9} {:<24} {:>5} {:>5}",
                app_id,
                origin["id"].as_str().unwrap_or("-"),
                origin["state"].as_str().unwrap_or("-"),
                origin["address"].as_str().unwrap_or("-"),
                origin["pool"]["busy"],
                origin["pool"]["available"],
            );
        }
    }
}
