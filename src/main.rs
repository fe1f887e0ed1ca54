use std::sync::Arc;

use code_relay::auth::StdinPrompt;
use code_relay::bot::CodeRelay;
use code_relay::channels::{GatewaySession, GatewayTransport};
use code_relay::config::RelayConfig;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; the real environment still applies.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: could not read .env: {e}");
        }
    }

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export API_ID=... API_HASH=... PHONE_NUMBER=+...");
        std::process::exit(1);
    });

    eprintln!("📨 Code Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Phone: {}", config.phone_number);
    eprintln!("   Session: {}", config.session_name);
    eprintln!("   Gateway: {}", config.gateway_url);
    eprintln!(
        "   Code source: {} ({})",
        config.code_chat_number,
        if config.code_source_strict {
            "strict"
        } else {
            "any sender"
        }
    );
    eprintln!(
        "   Webhook: {}",
        config.webhook_url.as_deref().unwrap_or("disabled")
    );
    if config.login_code.is_some() {
        eprintln!("   Login code: from LOGIN_CODE");
    }
    eprintln!();

    let transport = Arc::new(GatewayTransport::new(
        config.gateway_url.clone(),
        GatewaySession {
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            session_name: config.session_name.clone(),
        },
    ));

    let interactive = config.interactive;
    let mut relay = CodeRelay::new(config, transport);
    if interactive {
        relay = relay.with_prompt(Arc::new(StdinPrompt));
    }

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let reason = relay.run(shutdown).await?;
    tracing::info!(?reason, "Code relay stopped");

    Ok(())
}
