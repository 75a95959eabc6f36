use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use featurecast_lib::client::{StatusKind, StreamClient};
use featurecast_lib::config::{default_config_path, load_with_env, save_config, Config};
use featurecast_lib::logging::init_tracing;
use featurecast_lib::models::MetricsPayload;
use featurecast_lib::server::ServerState;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "featurecast", version, about = "Foundry feature showcase relay")]
struct Cli {
    /// 配置文件路径（默认 ~/.featurecast/config.yaml）
    #[arg(long, global = true, env = "FEATURECAST_CONFIG")]
    config: Option<PathBuf>,

    /// 客户端命令连接的 Relay 地址
    #[arg(long, global = true, default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the relay server
    Serve,
    /// Write a default config file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// List the feature catalog
    Features,
    /// List selectable models
    Models,
    /// Show whether the relay has an upstream connection
    Status,
    /// Configure the relay's upstream connection
    Configure {
        #[arg(long)]
        endpoint: String,
        #[arg(long, env = "FOUNDRY_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(long)]
        model: String,
    },
    /// Run a feature and print its event stream
    Run {
        #[arg(long)]
        feature: String,
        #[arg(long, default_value = "")]
        input: String,
        /// File to upload before running (files_api)
        #[arg(long)]
        upload: Option<PathBuf>,
        /// Where to save a generated document
        #[arg(long, default_value = ".")]
        download_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    match cli.command {
        Commands::Serve => serve(&config_path).await,
        Commands::InitConfig { force } => {
            if config_path.exists() && !force {
                anyhow::bail!("{} already exists (use --force)", config_path.display());
            }
            save_config(&Config::default(), &config_path)?;
            println!("Wrote {}", config_path.display());
            Ok(())
        }
        command => {
            init_tracing(&load_with_env(&config_path)?.logging);
            let client = StreamClient::new(&cli.server);
            client_command(client, command).await
        }
    }
}

async fn serve(config_path: &std::path::Path) -> Result<()> {
    let config = load_with_env(config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    init_tracing(&config.logging);

    let mut server = ServerState::new(config);
    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start server: {e}"))?;
    let status = server.status();
    tracing::info!("[SERVER] 已启动 http://{}:{}", status.host, status.port);

    tokio::signal::ctrl_c().await?;
    tracing::info!("[SERVER] 收到退出信号，正在关闭");
    server.stop().await;
    Ok(())
}

async fn client_command(client: StreamClient, command: Commands) -> Result<()> {
    match command {
        Commands::Features => {
            for feature in client.list_features().await? {
                println!("{:<16} {}  {}", feature.id, feature.name, feature.description);
                for sub in &feature.sub_features {
                    println!("  └ {:<14} {}", sub.id, sub.name);
                }
            }
        }
        Commands::Models => {
            for model in client.list_models().await? {
                println!("{model}");
            }
        }
        Commands::Status => {
            let status = client.config_status().await?;
            match (status.configured, status.model, status.endpoint) {
                (true, Some(model), Some(endpoint)) => println!("configured: {model} @ {endpoint}"),
                (true, model, _) => println!("configured: {}", model.unwrap_or_default()),
                _ => println!("not configured"),
            }
        }
        Commands::Configure {
            endpoint,
            api_key,
            model,
        } => {
            let model = client.configure(&endpoint, &api_key, &model).await?;
            println!("Configured with model {model}");
        }
        Commands::Run {
            feature,
            input,
            upload,
            download_dir,
        } => run(Arc::new(client), feature, input, upload, download_dir).await?,
        Commands::Serve | Commands::InitConfig { .. } => {}
    }
    Ok(())
}

async fn run(
    client: Arc<StreamClient>,
    feature: String,
    input: String,
    upload: Option<PathBuf>,
    download_dir: PathBuf,
) -> Result<()> {
    let upload_key = match upload {
        Some(path) => {
            let uploaded = client.upload(&path).await?;
            println!("📎 Uploaded {} ({})", uploaded.filename, uploaded.upload_key);
            Some(uploaded.upload_key)
        }
        None => None,
    };

    let mut rx = client.subscribe();
    let task = {
        let client = client.clone();
        tokio::spawn(async move { client.start_run(&feature, &input, upload_key).await })
    };
    tokio::pin!(task);

    let mut printed = 0usize;
    let mut last_status = String::new();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let result = loop {
        tokio::select! {
            joined = &mut task => break joined?,
            _ = tokio::signal::ctrl_c() => client.cancel(),
            _ = ticker.tick() => client.tick(),
            changed = rx.changed() => {
                if changed.is_err() {
                    continue;
                }
                let state = rx.borrow_and_update().clone();
                if state.output.len() > printed {
                    print!("{}", &state.output[printed..]);
                    std::io::stdout().flush().ok();
                    printed = state.output.len();
                }
                if !state.status.is_empty() && state.status != last_status && state.running {
                    eprintln!("\n[{}]", state.status);
                    last_status = state.status;
                }
            }
        }
    };

    let state = client.snapshot();
    if state.output.len() > printed {
        print!("{}", &state.output[printed..]);
    }
    println!();
    if let Some(metrics) = &state.metrics {
        print_metrics(metrics);
    }
    if let Some(artifact) = &state.artifact {
        let path = client.download(&artifact.filename, &download_dir).await?;
        println!("📄 Saved {}", path.display());
    }
    if let Some(remaining) = state.cache_remaining_secs {
        println!("⏱ Cache expires in {}:{:02}", remaining / 60, remaining % 60);
    }
    println!("{} ({}s)", state.status, state.elapsed_secs);

    result?;
    if state.status_kind == StatusKind::Error {
        std::process::exit(1);
    }
    Ok(())
}

fn print_metrics(metrics: &MetricsPayload) {
    match metrics {
        MetricsPayload::Comparison(table) => {
            println!("{:<20} {:>14} {:>14}", "Metric", "Traditional", "PTC");
            for row in &table.rows {
                println!("{:<20} {:>14} {:>14}", row.metric, row.traditional, row.ptc);
            }
        }
        MetricsPayload::Cache(cache) => {
            println!("{} ({} cache)", cache.cache_status, cache.cache_type);
            println!(
                "  input={} output={} cache_write={} cache_read={}",
                cache.input_tokens,
                cache.output_tokens,
                cache.cache_creation_input_tokens,
                cache.cache_read_input_tokens
            );
            if let Some(t) = cache.response_time_seconds {
                println!("  response {t}s, speedup {}", cache.speedup);
            }
        }
        MetricsPayload::Other(map) => {
            println!("{}", serde_json::Value::Object(map.clone()));
        }
    }
}
