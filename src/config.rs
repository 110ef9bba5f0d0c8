use serde::Deserialize;

/// Runtime configuration, loaded once at startup from the environment.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub ampersand_api_key: String,
    pub ampersand_write_url: String,
    pub ampersand_read_url: String,
    /// Default project id when a webhook payload carries none.
    pub ampersand_project: Option<String>,
    /// Installation id of the configured CRM connection.
    pub installation_id: Option<String>,
    /// Default group reference when a webhook payload carries none.
    pub group_ref: Option<String>,
    /// Directory for raw webhook payload log files.
    pub log_dir: String,
}

fn optional_url(var: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(var)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", var);
    }
    Ok(url)
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            openai_api_key: std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("OPENAI_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            openai_base_url: optional_url("OPENAI_BASE_URL", "https://api.openai.com/v1")?,
            openai_model: std::env::var("OPENAI_MODEL")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "gpt-4-turbo-preview".to_string()),
            ampersand_api_key: std::env::var("AMPERSAND_API_KEY")
                .map_err(|_| anyhow::anyhow!("AMPERSAND_API_KEY environment variable required"))
                .and_then(|key| {
                    if key.trim().is_empty() {
                        anyhow::bail!("AMPERSAND_API_KEY cannot be empty");
                    }
                    Ok(key)
                })?,
            ampersand_write_url: optional_url(
                "AMPERSAND_WRITE_URL",
                "https://write.withampersand.com/v1",
            )?,
            ampersand_read_url: optional_url(
                "AMPERSAND_READ_URL",
                "https://read.withampersand.com/v1",
            )?,
            ampersand_project: std::env::var("AMPERSAND_PROJECT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            installation_id: std::env::var("INSTALLATION_ID")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            group_ref: std::env::var("GROUP_REF")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            log_dir: std::env::var("LOG_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "./logs".to_string()),
        };

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("OpenAI base URL: {}", config.openai_base_url);
        tracing::debug!("OpenAI model: {}", config.openai_model);
        tracing::debug!("Ampersand write URL: {}", config.ampersand_write_url);
        tracing::debug!("Ampersand read URL: {}", config.ampersand_read_url);
        if config.ampersand_project.is_none() {
            tracing::warn!("AMPERSAND_PROJECT not set; webhook payloads must carry projectId");
        }
        if config.installation_id.is_none() {
            tracing::warn!("INSTALLATION_ID not set; CRM write-back will fail until configured");
        }
        tracing::debug!("Server port: {}", config.port);

        Ok(config)
    }
}
