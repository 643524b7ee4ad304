use anyhow::{Context, Result};
use clap::Args;

use scaler_api::ApiClient;

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long, short)]
    pub username: String,

    #[arg(long, short, env = "SCALER_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long, short)]
    pub username: String,

    #[arg(long, short, env = "SCALER_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Print only the token so it can be captured into SCALER_TOKEN
pub async fn login(client: &ApiClient, args: &LoginArgs) -> Result<()> {
    let resp = client
        .login(&args.username, &args.password)
        .await
        .context("login failed")?;
    println!("{}", resp.token);
    Ok(())
}

pub async fn register(client: &ApiClient, args: &RegisterArgs) -> Result<()> {
    let resp = client
        .register(&args.username, &args.password)
        .await
        .context("registration failed")?;
    println!("{} (id {}): {}", resp.username, resp.id, resp.message);
    Ok(())
}
