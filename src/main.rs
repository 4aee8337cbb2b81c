use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use lisns::hlc::Hlc;
use lisns::journal::FileJournal;
use lisns::recovery::recover;
use lisns::{Cli, Commands, EntryKind, FileStatus, HolderId, NameNode, NameNodeConfig};

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> Result<NameNodeConfig> {
    let config = match &cli.config {
        Some(path) => NameNodeConfig::from_file(path)?,
        None => NameNodeConfig::default(),
    };
    let mut config = config.apply_env()?;
    if let Some(dir) = &cli.storage_dir {
        config.storage_dir = dir.clone();
    }
    config.validate()?;
    Ok(config)
}

fn print_status(status: &FileStatus) {
    let kind = match status.kind {
        EntryKind::Directory => 'd',
        EntryKind::File => '-',
    };
    let holder = status
        .lease_holder
        .as_ref()
        .map(|h| format!(" [open by {h}]"))
        .unwrap_or_default();
    println!(
        "{kind} {:>12} {:>8} {}{holder}",
        status.length, status.id, status.path
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbosity);
    let config = load_config(&cli)?;

    if let Commands::Recover = cli.command {
        return recover_twice(&config).await;
    }

    let node = NameNode::open(config.clone())
        .await
        .with_context(|| format!("cannot open {}", config.storage_dir.display()))?;
    let holder = HolderId::new(cli.holder.clone());

    let result = run(&node, &config, &holder, &cli.command).await;
    node.shutdown().await.context("shutdown failed")?;
    result
}

async fn recover_twice(config: &NameNodeConfig) -> Result<()> {
    let mut journal = FileJournal::open(&config.storage_dir).await?;
    let (first, report) = recover(&mut journal)
        .await
        .context("first recovery failed")?;
    let (second, _) = recover(&mut journal)
        .await
        .context("second recovery failed")?;
    if first != second {
        bail!("recovering twice produced different namespaces");
    }
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(
    node: &NameNode,
    config: &NameNodeConfig,
    holder: &HolderId,
    command: &Commands,
) -> Result<()> {
    match command {
        Commands::Mkdir { path } => {
            let id = node.mkdirs(path).await?;
            println!("{path} -> inode {id}");
        }
        Commands::Create { path, overwrite } => {
            let id = node.create(holder, path, *overwrite).await?;
            println!("{path} -> inode {id}, open by {holder}");
        }
        Commands::Sync { path, length } => {
            let id = node.resolve(path)?;
            node.sync(holder, id, *length).await?;
        }
        Commands::Close { path, length } => {
            let id = node.resolve(path)?;
            node.close(holder, id, *length).await?;
        }
        Commands::Rename { src, dst } => node.rename(src, dst).await?,
        Commands::Rm { path } => node.delete(path).await?,
        Commands::List { path } => {
            for status in node.list(path)? {
                print_status(&status);
            }
        }
        Commands::Stat { path } => {
            let status = node.stat(path)?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Leases => {
            let now = Hlc::new().now();
            let timeout = config.lease_timeout();
            for lease in node.all_leases() {
                let path = node.path_of(lease.file).unwrap_or_default();
                let remaining = match lease.time_remaining(now, timeout) {
                    Some(left) => format!("expires in {}s", left.as_secs()),
                    None => "expired".to_string(),
                };
                println!(
                    "{} {} {} (renewed {}, {remaining})",
                    lease.holder, lease.file, path, lease.last_renewed
                );
            }
        }
        Commands::Checkpoint => {
            let txid = node.checkpoint().await?;
            println!("checkpoint at txid {txid}");
        }
        Commands::Recover => bail!("recover runs against a closed storage directory"),
    }
    Ok(())
}
