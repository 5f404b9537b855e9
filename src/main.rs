use anyhow::Context;
use clap::Parser;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[macro_use]
extern crate tracing;

mod cli;
mod config;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    // setup colorful backtraces
    color_backtrace::install();

    let mut targets = Targets::new().with_default(LevelFilter::INFO);

    if let Ok(directives) = std::env::var("RUST_LOG") {
        for directive in directives.split(',') {
            if let Some((target, level)) = directive.split_once('=') {
                targets = targets.with_target(
                    target,
                    level.parse::<LevelFilter>().context("invalid log level")?,
                );
            } else {
                targets = targets.with_default(
                    directive
                        .parse::<LevelFilter>()
                        .context("invalid log level")?,
                );
            }
        }
    }

    let (writer, _guard) = tracing_appender::non_blocking(tracing_appender::rolling::hourly(
        "logs",
        "mission-supervisor",
    ));

    let reg = tracing_subscriber::registry();

    #[cfg(tokio_unstable)]
    let reg = reg.with(console_subscriber::spawn());

    reg
        // writer that outputs to console
        .with(tracing_subscriber::fmt::layer().with_filter(targets))
        // writer that outputs to files
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(Targets::new().with_targets(vec![
                    ("mission_supervisor", LevelFilter::DEBUG),
                    ("ms_pixhawk", LevelFilter::DEBUG),
                    ("ms_telemetry", LevelFilter::DEBUG),
                    ("ms_mission", LevelFilter::DEBUG),
                ])),
        )
        .init();

    let main_args = cli::args::MainArgs::parse();

    debug!("reading config from {:?}", &main_args.config);
    let config = crate::config::MissionSupervisorConfig::read_from_path(&main_args.config)
        .context("failed to read config file")?;

    run_tasks(config).await
}

async fn run_tasks(config: crate::config::MissionSupervisorConfig) -> anyhow::Result<()> {
    let cancellation_token = CancellationToken::new();

    ctrlc::set_handler({
        let cancellation_token = cancellation_token.clone();
        move || {
            info!("received interrupt, shutting down");
            cancellation_token.cancel();
        }
    })
    .context("could not set ctrl+c handler")?;

    let mut tasks = Vec::<Box<dyn ms_client::Task>>::new();

    debug!("initializing pixhawk task");
    let pixhawk_task =
        ms_pixhawk::create_task(config.pixhawk).context("failed to initialize pixhawk task")?;
    let pixhawk_evt_rx = pixhawk_task.events();
    let pixhawk_cmd_tx = pixhawk_task.cmd();
    let setpoint_tx = pixhawk_task.setpoints();
    tasks.push(Box::new(pixhawk_task));

    debug!("initializing telemetry task");
    let telem_task =
        ms_telemetry::create_task(pixhawk_evt_rx).context("failed to initialize telemetry task")?;
    let telem_rx = telem_task.telemetry();
    tasks.push(Box::new(telem_task));

    debug!("initializing mission task");
    let mission_task =
        ms_mission::create_task(config.mission, telem_rx, pixhawk_cmd_tx, setpoint_tx)
            .context("failed to initialize mission task")?;
    tasks.push(Box::new(mission_task));

    let mut join_set = JoinSet::new();

    for task in tasks {
        debug!("starting {} task", task.name());
        join_set.spawn(task.run(cancellation_token.clone()));
    }

    while let Some(res) = join_set.join_next().await {
        // if task panicked, then will be Some(Err)
        // if task terminated w/ error, then will be Some(Ok(Err))
        // need to propagate errors in both cases

        match res {
            Err(err) => {
                cancellation_token.cancel();
                return Err(err).context("task failed");
            }
            Ok(Err(err)) => {
                cancellation_token.cancel();
                return Err(err).context("task terminated with error");
            }
            _ => {
                info!("exited task");
            }
        }
    }

    Ok(())
}
