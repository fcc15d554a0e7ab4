//! Config subcommand handlers.

use sonofly_config::ConfigError;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

/// Config as TOML with plaintext passwords masked.
fn format_config_redacted(cfg: &Config) -> Result<String, CliError> {
    let mut masked = cfg.clone();
    for entry in masked.accounts.values_mut() {
        if entry.password.is_some() {
            entry.password = Some(MASK.into());
        }
    }
    let toml_str = toml::to_string_pretty(&masked).map_err(ConfigError::from)?;
    Ok(toml_str)
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            output::print_output(&format_config_redacted(&cfg)?, global.quiet);
            Ok(())
        }

        ConfigCommand::Import { path } => {
            let mut cfg = config::load(global)?;
            if !cfg.accounts.is_empty() {
                eprintln!("Accounts already configured; nothing imported");
                return Ok(());
            }
            let path = path.unwrap_or_else(|| config::legacy_file(global));
            if !sonofly_config::import_legacy_yaml(&mut cfg, &path) {
                return Err(CliError::Validation {
                    field: "path".into(),
                    reason: format!("no usable legacy config at {}", path.display()),
                });
            }
            sonofly_config::save_config_to(&cfg, &config::config_file(global))?;
            eprintln!("✓ Imported legacy account from {}", path.display());
            Ok(())
        }

        ConfigCommand::SetPassword { account } => {
            let cfg = config::load(global)?;
            if !cfg.accounts.contains_key(&account) {
                return Err(CliError::UnknownAccount {
                    name: account,
                    available: cfg.accounts.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }
            let password = rpassword::prompt_password(format!("Password for '{account}': "))?;
            if password.is_empty() {
                return Err(CliError::Validation {
                    field: "password".into(),
                    reason: "must not be empty".into(),
                });
            }
            sonofly_config::store_password(&account, &password)?;
            eprintln!("✓ Password stored in system keyring for account '{account}'");
            Ok(())
        }
    }
}
