use std::path::Path;

use simplenote_core::config::normalize_base_url;

use crate::cli::ConfigCommands;
use crate::commands::common::ProfileContext;
use crate::config_profiles::{default_config_path, normalize_text_option, CliProfilesConfig};
use crate::error::CliError;

/// Values passed to `config init`; `None` keeps what the profile already has.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub api_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub activate: bool,
}

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_base_url,
            request_timeout_secs,
            no_activate,
        } => {
            let update = ProfileUpdate {
                api_base_url,
                request_timeout_secs,
                activate: !no_activate,
            };
            let path = default_config_path();
            let profile_name =
                run_config_init(&path, profile.as_deref().or(global_profile), update)?;
            println!("Profile '{profile_name}' initialized at {}", path.display());
            println!(
                "Run `simplenote auth login --username <username> --password <password>` to sign in."
            );
            Ok(())
        }
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

/// Merge `update` into the named profile and save the config at `path`.
pub fn run_config_init(
    path: &Path,
    profile_name: Option<&str>,
    update: ProfileUpdate,
) -> Result<String, CliError> {
    let mut config = CliProfilesConfig::load_from_path(path).map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);

    let api_base_url = normalize_text_option(update.api_base_url)
        .map(|url| normalize_base_url(&url))
        .transpose()?;
    if update.request_timeout_secs == Some(0) {
        return Err(CliError::Config(
            "request_timeout_secs must be greater than zero".to_string(),
        ));
    }

    let profile = config.profile_mut_or_default(&profile_name);
    if let Some(value) = api_base_url {
        profile.api_base_url = Some(value);
    }
    if let Some(value) = update.request_timeout_secs {
        profile.request_timeout_secs = Some(value);
    }

    if update.activate {
        config.active_profile = Some(profile_name.clone());
    }

    config.save_to_path(path).map_err(CliError::Config)?;
    tracing::debug!("Saved profile '{}' to {}", profile_name, path.display());
    Ok(profile_name)
}

fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let profile = ProfileContext::load(profile_name)?;
    let signed_in = profile.gateway()?.is_authenticated();

    println!("profile:          {}", profile.name);
    println!("api_base_url:     {}", profile.client_config.api_base_url);
    println!(
        "request_timeout:  {}s",
        profile.client_config.request_timeout_secs
    );
    println!("config_file:      {}", default_config_path().display());
    println!("signed_in:        {}", if signed_in { "yes" } else { "no" });
    Ok(())
}
