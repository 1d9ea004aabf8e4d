//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{CairnError, CairnResult};
use console::style;

/// Keys accepted by `config set`
const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "engine.binary",
    "build.utilize_cache",
    "build.probe_timeout_secs",
    "build.tmp_prefix",
    "exports.rsync_image",
    "exports.rsync_volume",
    "exports.exports_volume",
    "registry.username",
    "registry.password",
    "registry.server_address",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, manager: &ConfigManager, config: &Config) -> CairnResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut updated = config.clone();
            set_value(&mut updated, &key, &value)?;
            updated.validate().map_err(CairnError::User)?;
            manager.save(&updated).await?;
            println!("{} Set {} = {}", style("✓").green(), key, value);
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> CairnResult<()> {
    let mut shown = config.clone();
    if shown.registry.password.is_some() {
        shown.registry.password = Some("********".to_string());
    }
    println!("{}", toml::to_string_pretty(&shown)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> CairnResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            style("!").yellow(),
            path.display()
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    println!(
        "{} Configuration initialized at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}

/// Apply a dot-separated key to the configuration
fn set_value(config: &mut Config, key: &str, value: &str) -> CairnResult<()> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["general", "log_format"] => config.general.log_format = value.to_string(),
        ["engine", "binary"] => config.engine.binary = value.to_string(),
        ["build", "utilize_cache"] => config.build.utilize_cache = parse_bool(value)?,
        ["build", "probe_timeout_secs"] => config.build.probe_timeout_secs = parse_u64(value)?,
        ["build", "tmp_prefix"] => config.build.tmp_prefix = value.to_string(),
        ["exports", "rsync_image"] => config.exports.rsync_image = value.to_string(),
        ["exports", "rsync_volume"] => config.exports.rsync_volume = value.to_string(),
        ["exports", "exports_volume"] => config.exports.exports_volume = value.to_string(),
        ["registry", "username"] => config.registry.username = Some(value.to_string()),
        ["registry", "password"] => config.registry.password = Some(value.to_string()),
        ["registry", "server_address"] => {
            config.registry.server_address = Some(value.to_string())
        }
        _ => {
            return Err(CairnError::User(format!(
                "Unknown config key: {} (valid keys: {})",
                key,
                VALID_KEYS.join(", ")
            )))
        }
    }

    Ok(())
}

fn parse_bool(value: &str) -> CairnResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(CairnError::User(format!(
            "Invalid boolean value: {}. Use true/false",
            value
        ))),
    }
}

fn parse_u64(value: &str) -> CairnResult<u64> {
    value
        .parse()
        .map_err(|_| CairnError::User(format!("Invalid number: {}", value)))
}
