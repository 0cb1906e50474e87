use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use mockend::{
    config::Config,
    endpoint::Endpoint,
    error::Error,
    http::ReqwestClient,
    response::SuccessEnvelope,
    telemetry::{initialize_fmt_subscriber, initialize_otlp_subscriber, OTLP_ENDPOINT},
};
use serde_json::Value;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Parser)]
#[command(name = "mockend")]
#[command(about = "mockend simulated http backend", long_about = None)]
struct Cli {
    #[arg(long)]
    config_path: PathBuf,
    /// Path of the endpoint to call, as registered in the config
    #[arg(short, long)]
    endpoint: Option<String>,
    #[arg(short, long, default_value = "false")]
    tracing_otlp: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Get {
        #[arg(long)]
        id: Option<String>,
    },
    GetAll,
    Query {
        query: String,
    },
    Create {
        data: String,
    },
    Update {
        id: String,
        data: String,
    },
    Save {
        data: String,
    },
    /// Draws random errors and prints how often each status code came out
    Sample {
        #[arg(long, default_value = "1000")]
        iterations: usize,
    },
    /// Lists the endpoints defined by the config
    List,
}

/// Identifiers are JSON when they parse as such (`1`), plain strings otherwise (`a1`)
fn parse_id(id: String) -> Value {
    serde_json::from_str(&id).unwrap_or(Value::String(id))
}

fn render(result: Result<SuccessEnvelope, Error>) -> anyhow::Result<String> {
    let rendered = match result {
        Ok(envelope) => serde_json::to_string_pretty(&envelope)?,
        Err(Error::Rejected(envelope)) => serde_json::to_string_pretty(&envelope)?,
        Err(err) => return Err(err.into()),
    };
    Ok(rendered)
}

async fn run(endpoint: &dyn Endpoint, command: Commands) -> anyhow::Result<String> {
    let output = match command {
        Commands::Get { id } => render(endpoint.get(id.map(parse_id)).await)?,
        Commands::GetAll => render(endpoint.get_all().await)?,
        Commands::Query { query } => render(endpoint.query(serde_json::from_str(&query)?).await)?,
        Commands::Create { data } => render(endpoint.create(serde_json::from_str(&data)?).await)?,
        Commands::Update { id, data } => {
            render(endpoint.update(parse_id(id), serde_json::from_str(&data)?).await)?
        }
        Commands::Save { data } => render(endpoint.save(serde_json::from_str(&data)?).await)?,
        Commands::Sample { iterations } => {
            let mut histogram: BTreeMap<String, usize> = BTreeMap::new();
            for _ in 0..iterations {
                let key = match endpoint.faults().selector().draw()? {
                    Some(envelope) => envelope.status_code.to_string(),
                    None => "ok".to_string(),
                };
                *histogram.entry(key).or_default() += 1;
            }
            histogram
                .iter()
                .map(|(key, n)| {
                    format!("{:>4} {:>6.2}%", key, *n as f64 * 100.0 / iterations.max(1) as f64)
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        Commands::List => anyhow::bail!("list doesn't target an endpoint"),
    };
    Ok(output)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    if args.tracing_otlp {
        initialize_otlp_subscriber(OTLP_ENDPOINT)?;
    } else {
        initialize_fmt_subscriber()?;
    }

    let config = Config::from_path(&args.config_path).await?;
    let namespace = config.build(Some(Arc::new(ReqwestClient::default())))?;

    let output = match args.command {
        Commands::List => namespace.list_endpoints()?.join("\n"),
        command => {
            let path = args
                .endpoint
                .ok_or_else(|| anyhow::anyhow!("--endpoint is required"))?;
            let endpoint = namespace.endpoint(&path)?.ok_or_else(|| {
                anyhow::anyhow!("{} is not defined in {:?}", path, args.config_path)
            })?;
            run(endpoint.as_ref(), command).await?
        }
    };

    let mut stdout = tokio::io::stdout();
    stdout.write_all(output.as_bytes()).await?;
    stdout.write_all(b"\n").await?;

    Ok(())
}
