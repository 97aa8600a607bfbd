use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the compliance gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:5001")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway status and provider sessions
    Status,
    /// List circuit breakers
    Breakers,
    /// Force a circuit breaker back to closed
    ResetBreaker {
        /// Breaker name, e.g. nic:eway_generate
        name: String,
    },
    /// Idempotency cache statistics
    Idempotency,
    /// Usage counters
    Usage {
        #[arg(long)]
        tenant: Option<String>,
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match cli.command {
        Commands::Status => client.get(format!("{}/admin/status", base)),
        Commands::Breakers => client.get(format!("{}/admin/circuit-breakers", base)),
        Commands::ResetBreaker { name } => {
            client.post(format!("{}/admin/circuit-breakers/{}/reset", base, name))
        }
        Commands::Idempotency => client.get(format!("{}/admin/idempotency", base)),
        Commands::Usage { tenant, year, month } => {
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(tenant) = tenant {
                query.push(("tenant", tenant));
            }
            if let Some(year) = year {
                query.push(("year", year.to_string()));
            }
            if let Some(month) = month {
                query.push(("month", month.to_string()));
            }
            client.get(format!("{}/admin/usage", base)).query(&query)
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
