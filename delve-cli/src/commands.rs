//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use delve_core::config::{DelveConfig, load_config, workspace_config_path};
use delve_tools::registry::{FALLBACK_PROVIDER, KNOWN_PROVIDERS, chain_order};
use std::path::Path;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Config { action } => handle_config(action, workspace, config_file).await,
        Commands::Providers => handle_providers(workspace, config_file).await,
    }
}

async fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(dir) = config_path.parent() {
                std::fs::create_dir_all(dir)?;
            }

            let toml_str = toml::to_string_pretty(&DelveConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!(
                "Created default configuration at: {}",
                config_path.display()
            );
            Ok(())
        }
        ConfigAction::Show => {
            let config = load_config(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

async fn handle_providers(workspace: &Path, config_file: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    for line in provider_report(&config) {
        println!("{line}");
    }
    Ok(())
}

/// One line per provider in chain order, then the fallback, then the rest.
pub(crate) fn provider_report(config: &DelveConfig) -> Vec<String> {
    let order = chain_order(&config.search);
    let mut lines = vec!["Search providers (in fallback order):".to_string()];

    for (i, name) in order.iter().enumerate() {
        lines.push(format!("  {}. {:<11} {}", i + 1, name, availability(config, name)));
    }
    lines.push(format!(
        "  -  {:<11} keyless, always-on last resort",
        FALLBACK_PROVIDER
    ));

    let unused: Vec<&str> = KNOWN_PROVIDERS
        .iter()
        .copied()
        .filter(|name| *name != FALLBACK_PROVIDER && !order.iter().any(|o| o == name))
        .collect();
    if !unused.is_empty() {
        lines.push(format!("Not in fallback order: {}", unused.join(", ")));
    }
    lines
}

fn availability(config: &DelveConfig, name: &str) -> String {
    let settings = config.search.settings(name);
    match (&settings.api_key_env, settings.resolve_api_key()) {
        (None, _) => "keyless".to_string(),
        (Some(_), Some(_)) => "ready".to_string(),
        (Some(env), None) => format!("disabled (set {env})"),
    }
}
