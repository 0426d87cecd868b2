use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser as _;
use serde::Serialize;

use ctiscan::app::context::Context;
use ctiscan::app::model::NewTarget;
use ctiscan::app::service;
use ctiscan::cli::{Cli, Command, ItemsCommand, TargetsCommand};

#[tokio::main]
async fn main() -> ExitCode {
    match try_main().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn try_main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = ctiscan::config::Config::from_env().context("read configuration")?;
    cli.overrides.apply(&mut config);

    let _guard = ctiscan::logging::init(config.log_dir.as_deref()).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    let ctx = Arc::new(Context::from_config(config).context("build context")?);
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after in-flight requests");
            cancel.cancel();
        }
    });

    match cli.command {
        Command::Targets {
            command: TargetsCommand::Add(args),
        } => {
            let target = service::register_target(
                &ctx,
                NewTarget {
                    name: args.name,
                    url: args.url,
                    description: args.description,
                },
            )
            .await
            .context("targets add")?;
            print_json(&target)?;
        }
        Command::Targets {
            command: TargetsCommand::List,
        } => {
            let targets = service::list_targets(&ctx).await.context("targets list")?;
            print_json(&targets)?;
        }
        Command::Targets {
            command: TargetsCommand::Delete(args),
        } => {
            service::delete_target(&ctx, &args.target_id)
                .await
                .context("targets delete")?;
        }
        Command::Targets {
            command: TargetsCommand::Summary(args),
        } => {
            let summary = service::severity_summary(&ctx, &args.target_id)
                .await
                .context("targets summary")?;
            print_json(&summary)?;
        }
        Command::Fetch(args) => match args.target_id {
            Some(target_id) if !args.all => {
                let target = service::fetch_target(&ctx, &target_id)
                    .await
                    .context("fetch")?;
                print_json(&target)?;
            }
            _ => {
                let report = service::fetch_all_targets(&ctx)
                    .await
                    .context("fetch --all")?;
                print_json(&report)?;
                if !report.failed.is_empty() {
                    return Ok(ExitCode::FAILURE);
                }
            }
        },
        Command::Extract(args) => {
            let report = service::extract(&ctx, &args.target_id)
                .await
                .context("extract")?;
            print_json(&report)?;
        }
        Command::Scan(args) => {
            let report = service::scan(&ctx, &args.target_id)
                .await
                .context("scan")?;
            print_json(&report)?;
            if !report.is_completed() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Items {
            command: ItemsCommand::List(args),
        } => {
            let items = service::list_work_items(&ctx, &args.target_id)
                .await
                .context("items list")?;
            print_json(&items)?;
        }
        Command::Items {
            command: ItemsCommand::Reset(args),
        } => {
            let reset = service::reset_failed(&ctx, &args.target_id)
                .await
                .context("items reset")?;
            print_json(&serde_json::json!({ "reset": reset }))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
