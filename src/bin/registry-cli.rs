use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "registry-cli")]
#[command(about = "Operator CLI for discovery-gateway nodes", long_about = None)]
struct Cli {
    /// Base URL of the node.
    #[arg(short, long, default_value = "http://localhost:8761")]
    url: String,

    /// Admin API key (admin commands only).
    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Healthy instance count per service
    Services,
    /// Healthy instances of one service
    Lookup { service_name: String },
    /// Register an instance
    Register {
        service_name: String,
        host: String,
        port: u16,
        #[arg(long)]
        instance_id: Option<String>,
    },
    /// Renew an instance's lease
    Heartbeat { instance_id: String },
    /// Remove an instance
    Deregister { instance_id: String },
    /// Node status (admin)
    Status,
    /// Every registry record, DOWN ones included (admin)
    Instances,
    /// Circuit breaker states (admin)
    Breakers,
    /// Force a circuit breaker closed (admin)
    ResetBreaker { name: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut admin = HeaderMap::new();
    admin.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);

    let res = match cli.command {
        Commands::Services => client.get(format!("{base}/registry/services")).send().await?,
        Commands::Lookup { service_name } => {
            client
                .get(format!("{base}/registry/instances"))
                .query(&[("serviceName", service_name)])
                .send()
                .await?
        }
        Commands::Register {
            service_name,
            host,
            port,
            instance_id,
        } => {
            let mut body = json!({ "serviceName": service_name, "host": host, "port": port });
            if let Some(id) = instance_id {
                body["instanceId"] = Value::String(id);
            }
            client.post(format!("{base}/registry/register")).json(&body).send().await?
        }
        Commands::Heartbeat { instance_id } => {
            client
                .post(format!("{base}/registry/heartbeat"))
                .json(&json!({ "instanceId": instance_id }))
                .send()
                .await?
        }
        Commands::Deregister { instance_id } => {
            client
                .post(format!("{base}/registry/deregister"))
                .json(&json!({ "instanceId": instance_id }))
                .send()
                .await?
        }
        Commands::Status => client.get(format!("{base}/admin/status")).headers(admin).send().await?,
        Commands::Instances => client.get(format!("{base}/admin/instances")).headers(admin).send().await?,
        Commands::Breakers => client.get(format!("{base}/admin/breakers")).headers(admin).send().await?,
        Commands::ResetBreaker { name } => {
            client
                .post(format!("{base}/admin/breakers/{name}/reset"))
                .headers(admin)
                .send()
                .await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    if !status.is_success() {
        eprintln!("Error: node returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if text.is_empty() => println!("{}", status),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
