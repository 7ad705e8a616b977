//! `agentgate serve`: Start the HTTP gateway.

use agentgate_config::AppConfig;

pub async fn run(
    port_override: Option<u16>,
    backend_override: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    if let Some(kind) = backend_override {
        config.backend.kind = kind;
    }
    config.validate()?;

    println!("agentgate gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Backend:   {}", config.backend.kind);
    if config.backend.kind == "live" && !config.has_api_key() {
        println!("   Warning:   no API key set, turns will use the fallback reply");
    }

    agentgate_gateway::start(config).await?;

    Ok(())
}
