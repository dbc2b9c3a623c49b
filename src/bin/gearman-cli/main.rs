mod args;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info, Level};

use args::{Args, Command};
use gearman_rs::{create_client, create_worker, TaskEvent};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.debug {
        tracing_subscriber::fmt().with_max_level(Level::TRACE).init();
    } else {
        tracing_subscriber::fmt().json().init();
    }

    let result = match args.command {
        Command::Submit { function, workload, background } => {
            run_submit(&args.host, args.port, function, workload, background).await
        }
        Command::Echo { function } => run_echo(&args.host, args.port, function).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(%error, "gearman-cli failed");
            ExitCode::FAILURE
        }
    }
}

async fn run_submit(host: &str, port: u16, function: String, workload: String, background: bool) -> Result<()> {
    let client = create_client(host.to_string(), port).await.context("connecting to job server")?;

    if background {
        let task = client
            .submit_background(function, workload)
            .await
            .context("submitting background job")?;
        info!(handle = task.handle(), "background job accepted");
        return Ok(());
    }

    let mut task = client.submit(function, workload).await.context("submitting job")?;
    info!(handle = task.handle(), "job accepted, awaiting completion");

    while let Some(event) = task.next_event().await {
        match event {
            TaskEvent::Data(data) => info!(bytes = data.len(), "intermediate data"),
            TaskEvent::Warning(data) => info!(text = %String::from_utf8_lossy(&data), "warning"),
            TaskEvent::Status { numerator, denominator } => info!(numerator, denominator, "progress"),
            TaskEvent::Complete(data) => {
                info!(result = %String::from_utf8_lossy(&data), "complete");
                break;
            }
            TaskEvent::Failure => {
                error!("job failed");
                break;
            }
            TaskEvent::Exception(data) => {
                error!(reason = %String::from_utf8_lossy(&data), "job raised an exception");
                break;
            }
        }
    }

    Ok(())
}

async fn run_echo(host: &str, port: u16, function: String) -> Result<()> {
    let worker = create_worker(host.to_string(), port).await.context("connecting to job server")?;

    worker
        .register(function.clone(), move |job| async move {
            let workload = job.workload().clone();
            if let Err(error) = job.complete(workload) {
                error!(%error, "failed to report job completion");
            }
        })
        .await
        .with_context(|| format!("registering function {function}"))?;

    info!(function, "registered, waiting for jobs (ctrl-c to stop)");
    signal::ctrl_c().await.context("waiting for ctrl-c")?;
    worker.disconnect();
    Ok(())
}
