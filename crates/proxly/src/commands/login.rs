//! `proxly login`: check that the active profile can authenticate.

use crate::cli::{GlobalOpts, LoginArgs, OutputFormat};
use crate::error::CliError;
use crate::output::{self, Status};

pub async fn handle(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let otp = super::util::secret_flag("One-time code", args.otp)?;
    let (profile, cluster) = super::connect(global, otp).await?;
    let version = cluster.version().await?;
    let url = cluster.client().base_url().to_string();

    match global.output {
        OutputFormat::Table => output::status(
            global,
            Status::Done,
            &format!(
                "logged in to {url} with profile '{profile}' (Proxmox VE {})",
                version.version
            ),
        ),
        format => {
            let out = output::render_single(format, &version, |v| v.version.clone(), |_| {
                profile.clone()
            })?;
            output::print_output(&out, global.quiet);
        }
    }
    cluster.logout();
    Ok(())
}
