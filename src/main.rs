use std::sync::Arc;

use deskpilot::api_server;
use deskpilot::config::Config;
use deskpilot::dispatcher::Assistant;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deskpilot=info,tower_http=info".into()),
        )
        .init();

    let config = Config::from_env();

    println!("🤖 DeskPilot Started!");
    println!("--------------------------------------------------");
    println!("   OS: {}", config.os_family);
    println!("   Model: {}", config.llm.model);
    if !config.llm.is_configured() {
        println!("   ⚠️  LLM_API_KEY not set — commands will fail until configured");
    }
    println!("--------------------------------------------------");

    let assistant = Arc::new(Assistant::new(config)?);
    println!("   📦 Indexed {} applications", assistant.apps.count());

    api_server::start_api_server(assistant).await
}
