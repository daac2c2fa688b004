//! Subcommand implementations.

use tracing::info;

use calbrief_auth::{AuthResult, AuthSettings, Classification, CredentialManager, ExecutionMode};

pub async fn login(settings: &AuthSettings) -> AuthResult<()> {
    let manager = CredentialManager::from_settings(settings, ExecutionMode::Interactive).await?;

    if manager.status().await? == Classification::Valid {
        println!("Already authorized with Google Calendar.");
        return Ok(());
    }

    println!("Authorizing calbrief with Google Calendar...");
    let token = manager.acquire().await?;

    info!("authorization complete");
    println!();
    println!("Authorization successful.");
    println!("Token valid until {}.", token.expiry().to_rfc3339());
    Ok(())
}

pub async fn status(settings: &AuthSettings) -> AuthResult<()> {
    let manager =
        CredentialManager::from_settings(settings, ExecutionMode::NonInteractive).await?;

    let classification = manager.status().await?;
    println!("store: {}", manager.store_description());
    println!("token: {}", classification);
    if classification.needs_grant() {
        println!();
        println!("Run 'calbrief login' to authorize.");
    }
    Ok(())
}

pub async fn check(settings: &AuthSettings) -> AuthResult<()> {
    let manager =
        CredentialManager::from_settings(settings, ExecutionMode::NonInteractive).await?;
    let token = manager.acquire().await?;
    println!("token valid until {}", token.expiry().to_rfc3339());
    Ok(())
}
