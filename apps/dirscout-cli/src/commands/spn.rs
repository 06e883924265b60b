//! Spn command - Collect as a service principal with a client secret

use crate::commands::run::{self, RunArgs};
use crate::error::CliResult;
use clap::Args;
use dirscout_aad::ClientSecretCredential;
use secrecy::SecretString;
use std::sync::Arc;

/// Arguments for the spn command
#[derive(Args, Debug)]
pub struct SpnArgs {
    /// Tenant id or domain
    #[arg(long, short = 't')]
    pub tenant: String,

    /// Application (client) id of the service principal
    #[arg(long)]
    pub client_id: String,

    /// Client secret
    #[arg(long, env = "DIRSCOUT_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Execute the spn command
pub async fn execute(args: SpnArgs) -> CliResult<()> {
    let credential = ClientSecretCredential::new(
        args.tenant.clone(),
        args.client_id,
        SecretString::from(args.client_secret),
        args.run.cloud.into(),
    );

    run::execute(Arc::new(credential), args.tenant, args.run).await
}
