//! Azcli command - Collect using the logged-in Azure CLI session

use crate::commands::run::{self, RunArgs};
use crate::error::CliResult;
use clap::Args;
use dirscout_aad::AzureCliCredential;
use std::sync::Arc;

/// Arguments for the azcli command
#[derive(Args, Debug)]
pub struct AzcliArgs {
    /// Tenant to collect (defaults to the CLI's active account)
    #[arg(long, short = 't')]
    pub tenant: Option<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Execute the azcli command
pub async fn execute(args: AzcliArgs) -> CliResult<()> {
    let (credential, tenant_id) = match args.tenant {
        Some(tenant) => (AzureCliCredential::new().with_tenant(tenant.clone()), tenant),
        None => {
            let credential = AzureCliCredential::new();
            let tenant = credential.tenant_id().await?;
            (credential, tenant)
        }
    };

    run::execute(Arc::new(credential), tenant_id, args.run).await
}
