use std::io::{self, Read, Write};

use futures_util::StreamExt;
use responses_adapter::config::{load_config, AdapterConfig};
use responses_adapter::observability::init_tracing;
use responses_adapter::protocol::canonical::{CallOptions, Message, UserPart};
use responses_adapter::ResponsesModel;
use tokio_util::sync::CancellationToken;

fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.logging.log_level, config.logging.log_format);

    let mut prompt = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut prompt) {
        eprintln!("Failed to read prompt from stdin: {e}");
        std::process::exit(1);
    }
    let prompt = prompt.trim().to_string();
    if prompt.is_empty() {
        eprintln!("Prompt is empty; pipe the user message on stdin.");
        std::process::exit(1);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    let code = runtime.block_on(run(config, prompt));
    std::process::exit(code);
}

async fn run(config: AdapterConfig, prompt: String) -> i32 {
    let model = match ResponsesModel::new(&config) {
        Ok(model) => model,
        Err(e) => {
            eprintln!("Failed to initialize model: {e}");
            return 1;
        }
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing stream");
            ctrl_c.cancel();
        }
    });

    let options = CallOptions {
        prompt: vec![Message::User {
            parts: vec![UserPart::Text(prompt)],
        }],
        ..CallOptions::default()
    };
    let mut result = match model.do_stream(&options, Some(cancel)).await {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Request failed: {e}");
            return 1;
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    while let Some(event) = result.stream.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => {
                if writeln!(out, "{line}").is_err() {
                    return 1;
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize lifecycle event"),
        }
    }
    let _ = out.flush();
    0
}
