use anyhow::Context;
use clap::Args;

use probegrid_core::TargetResolver;
use probegrid_core::config::DEFAULT_REMOTE_PORT;
use probegrid_kube::KubeResolver;

use super::GroupArgs;
use crate::render;

#[derive(Debug, Args)]
pub struct TargetsArgs {
    #[command(flatten)]
    pub group: GroupArgs,
}

pub async fn run(args: TargetsArgs) -> anyhow::Result<()> {
    let (client, group) = args.group.connect().await?;
    let targets = KubeResolver::new(client)
        .list_targets(&group)
        .await
        .with_context(|| format!("resolving {group}"))?;

    if targets.is_empty() {
        println!("Group {group} has no members");
        return Ok(());
    }
    print!("{}", render::format_targets(&targets, DEFAULT_REMOTE_PORT));
    Ok(())
}
