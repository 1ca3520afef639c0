//! Config subcommand handlers.

use dialoguer::{Input, Password, Select};

use dartsync_config::{Config, Profile};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of `cfg` with every stored secret masked.
fn redacted(cfg: &Config) -> Config {
    let mut cfg = cfg.clone();
    for profile in cfg.profiles.values_mut() {
        if profile.password.is_some() {
            profile.password = Some(MASK.into());
        }
        if profile.client_secret.is_some() {
            profile.client_secret = Some(MASK.into());
        }
    }
    cfg
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

fn prompt_password(profile_name: &str) -> Result<String, CliError> {
    let password = Password::new()
        .with_prompt(format!("Password for '{profile_name}'"))
        .interact()
        .map_err(prompt_err)?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "password cannot be empty".into(),
        });
    }
    Ok(password)
}

/// Offer to store the password in the system keyring.
///
/// Returns `Some(password)` if the user chose plaintext, `None` if stored
/// in the keyring.
fn prompt_password_storage(password: String, profile_name: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the password?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        dartsync_config::store_password(profile_name, &password)?;
        eprintln!("   ✓ Password stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(password))
    }
}

fn required(field: &str, value: String) -> Result<String, CliError> {
    let value = value.trim().to_owned();
    if value.is_empty() {
        return Err(CliError::Validation {
            field: field.into(),
            reason: "cannot be empty".into(),
        });
    }
    Ok(value)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            println!("{}", dartsync_config::config_path().display());
            Ok(())
        }

        // ── Show ────────────────────────────────────────────────────
        ConfigCommand::Show => {
            let cfg = redacted(&dartsync_config::load_config()?);
            let text = toml::to_string_pretty(&cfg)?;
            let out = output::render_single(global.output, &cfg, |_| text.trim_end().to_owned())?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            let config_path = dartsync_config::config_path();
            eprintln!("dartsync configuration wizard");
            eprintln!("   Config path: {}\n", config_path.display());

            let mut cfg = dartsync_config::load_config_or_default();

            let profile_name: String = Input::new()
                .with_prompt("Profile name")
                .default("default".into())
                .interact_text()
                .map_err(prompt_err)?;
            let profile_name = required("profile", profile_name)?;

            let email: String = Input::new()
                .with_prompt("Autodarts account email")
                .interact_text()
                .map_err(prompt_err)?;
            let email = required("email", email)?;

            let board_id: String = Input::new()
                .with_prompt("Board id")
                .interact_text()
                .map_err(prompt_err)?;
            let board_id = required("board_id", board_id)?;

            let password = prompt_password(&profile_name)?;
            let password = prompt_password_storage(password, &profile_name)?;

            let replaced = cfg
                .profiles
                .insert(
                    profile_name.clone(),
                    Profile {
                        email,
                        password,
                        board_id,
                        ..Profile::default()
                    },
                )
                .is_some();
            if cfg.profiles.len() == 1 {
                cfg.default_profile = Some(profile_name.clone());
            }

            dartsync_config::save_config(&cfg)?;

            let verb = if replaced { "Updated" } else { "Added" };
            eprintln!("\n✓ {verb} profile '{profile_name}' in {}", config_path.display());
            eprintln!("\n  Test it: dartsync status --profile {profile_name}");
            Ok(())
        }

        // ── Set password ────────────────────────────────────────────
        ConfigCommand::SetPassword { profile } => {
            let cfg = dartsync_config::load_config_or_default();
            let name = profile
                .or_else(|| global.profile.clone())
                .or_else(|| cfg.default_profile.clone())
                .unwrap_or_else(|| "default".into());

            let password = prompt_password(&name)?;
            dartsync_config::store_password(&name, &password)?;
            eprintln!("✓ Password for '{name}' stored in system keyring");
            Ok(())
        }
    }
}
