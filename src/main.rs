use anyhow::{bail, Context, Result};
use lazy_translate::{parse_params, Config, HttpFetcher, MemoryStore, Params, Translator};
use std::sync::Arc;
use tracing::info;

fn print_usage() {
    println!("Usage: lazy-translate [--lang <code>] <key> [<params>]...");
    println!();
    println!("Resolves each key and prints its translation. A params argument");
    println!("(e.g. \"{{name: 'Ann'}}\") applies to the key before it.");
}

/// Parse `<key> [<params>]...` pairs.
fn parse_requests(args: &[String]) -> Result<Vec<(String, Option<Params>)>> {
    let mut requests: Vec<(String, Option<Params>)> = Vec::new();

    for arg in args {
        if arg.trim_start().starts_with('{') {
            let Some((key, params)) = requests.last_mut() else {
                bail!("Parameters {} given before any key", arg);
            };
            *params = Some(
                parse_params(arg).with_context(|| format!("Invalid parameters for {}: {}", key, arg))?,
            );
        } else {
            requests.push((arg.clone(), None));
        }
    }

    Ok(requests)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored when not present)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lazy_translate=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let (language, rest) = match args.first().map(String::as_str) {
        Some("--lang") => {
            let code = args.get(1).context("--lang requires a language code")?;
            (Some(code.clone()), &args[2..])
        }
        _ => (None, &args[..]),
    };

    let requests = parse_requests(rest)?;
    if requests.is_empty() {
        bail!("No translation keys given");
    }

    let config = Config::from_env()?;
    let fetcher = HttpFetcher::from_env()?;
    info!("Loading dictionaries from {}", fetcher.base_url());

    let translator = Translator::new(config, Arc::new(fetcher), Arc::new(MemoryStore::new()))?;
    if let Some(code) = language {
        translator.set_language(&code);
    }

    for (key, params) in &requests {
        let value = translator.translate(key, params.as_ref(), None).await;
        info!("{} = {}", key, value);
    }

    info!("{}", translator.metrics().report().format_summary());
    Ok(())
}
