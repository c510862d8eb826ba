use simplenote_core::auth::AuthGateway;
use simplenote_core::models::SignupRequest;

use crate::cli::AuthCommands;
use crate::config_profiles::normalize_text_option;
use crate::error::CliError;

pub async fn run_auth(
    command: AuthCommands,
    gateway: &AuthGateway,
    profile_name: &str,
) -> Result<(), CliError> {
    match command {
        AuthCommands::Login { username, password } => {
            gateway.login(username.trim(), &password).await?;
            println!("Signed in profile '{profile_name}' as {}", username.trim());
            Ok(())
        }
        AuthCommands::Status => {
            if gateway.is_authenticated() {
                println!("Profile '{profile_name}' is signed in.");
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Logout => {
            gateway.logout()?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
        AuthCommands::Signup {
            username,
            email,
            password,
            first_name,
            last_name,
        } => {
            let request = SignupRequest {
                username: username.trim().to_string(),
                email: email.trim().to_string(),
                password,
                first_name: normalize_text_option(first_name),
                last_name: normalize_text_option(last_name),
            };
            gateway.signup(&request).await?;
            println!(
                "Registered '{}'. Run `simplenote auth login` to sign in.",
                request.username
            );
            Ok(())
        }
        AuthCommands::Whoami => {
            let profile = gateway.fetch_user_profile().await?;
            println!("{} <{}>", profile.display_name(), profile.email);
            Ok(())
        }
        AuthCommands::ChangePassword {
            old_password,
            new_password,
        } => {
            gateway.change_password(&old_password, &new_password).await?;
            println!("Password changed for profile '{profile_name}'");
            Ok(())
        }
    }
}
