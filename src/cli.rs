use anyhow::{Context, Result};
use clap::Parser;
use devtui::config::{self, DashboardConfig};
use devtui::demo::{self, Heartbeat, BUILD_TAB};
use devtui::{Dashboard, FieldPhase, FieldRef};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "devtui",
    version,
    about = "Demo dashboard for the devtui async field engine"
)]
pub struct Cli {
    /// Path to a JSON config file (defaults to <config dir>/devtui/config.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Dashboard title
    #[arg(long)]
    pub title: Option<String>,

    /// Default per-field timeout (0s runs handlers synchronously)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Run the build tab headless and print its messages (no TUI)
    #[arg(long)]
    pub text: bool,

    /// With --text, print messages as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Log file path (defaults to <data dir>/devtui/devtui.log)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Build a `DashboardConfig` from the config file and CLI overrides.
pub fn build_config(args: &Cli) -> Result<DashboardConfig> {
    let mut cfg = config::load(args.config.as_deref())?;
    if let Some(title) = &args.title {
        cfg.title = title.clone();
    }
    if let Some(timeout) = args.timeout {
        cfg.default_timeout = Duration::from(timeout);
    }
    if let Some(path) = &args.log_file {
        cfg.log_file = Some(path.clone());
    }
    Ok(cfg)
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && !args.text {
        return Err(anyhow::anyhow!("--json can only be used with --text"));
    }

    let cfg = build_config(&args)?;
    devtui::logging::init_tracing(cfg.log_file.as_deref());

    let heartbeat = std::sync::Arc::new(Heartbeat::default());
    let dash = demo::builder(cfg, heartbeat.clone())
        .build()
        .context("build dashboard")?;

    if args.text {
        return run_text(dash, args.json).await;
    }

    #[cfg(feature = "tui")]
    {
        let ticker = spawn_heartbeat(&dash, heartbeat)?;
        let res = devtui::tui::run(dash).await;
        // Dropping a JoinHandle does not cancel the task.
        ticker.abort();
        res
    }
    #[cfg(not(feature = "tui"))]
    {
        // Fallback when built without TUI support.
        let _ = heartbeat;
        run_text(dash, args.json).await
    }
}

/// Keep the build tab's heartbeat line current.
#[cfg(feature = "tui")]
fn spawn_heartbeat(
    dash: &Dashboard,
    heartbeat: std::sync::Arc<Heartbeat>,
) -> Result<tokio::task::JoinHandle<()>> {
    let writer = dash.writer(BUILD_TAB, "heartbeat")?;
    let started = Instant::now();
    Ok(tokio::spawn(async move {
        let mut ticks = tokio::time::interval(Duration::from_secs(1));
        loop {
            ticks.tick().await;
            let up = Duration::from_secs(started.elapsed().as_secs());
            if up.as_secs() > 0 && up.as_secs() % 60 == 0 {
                heartbeat.reset();
            }
            let line = format!("uptime {}", humantime::format_duration(up));
            if writer.send(line).await.is_err() {
                break;
            }
        }
    }))
}

/// Trigger the demo actions and stream their messages to stdout until every
/// field involved is idle again.
async fn run_text(dash: Dashboard, json: bool) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let port = FieldRef::new(0, 0);
    let build = FieldRef::new(BUILD_TAB, 0);
    let deploy = FieldRef::new(BUILD_TAB, 1);

    match dash.trigger(port, "8080") {
        Ok(devtui::Dispatch::Completed(entry)) => {
            let _ = out_tx.send(OutputLine::Stdout(entry.format()));
        }
        Ok(_) => {}
        Err(e) => {
            let _ = out_tx.send(OutputLine::Stderr(format!("Port change rejected: {e}")));
        }
    }
    for at in [build, deploy] {
        if let Err(e) = dash.trigger(at, "") {
            let _ = out_tx.send(OutputLine::Stderr(format!("Trigger failed: {e}")));
        }
    }

    // Entries rewritten in place are printed again; key is the entry's sequence number.
    let mut seen: HashMap<u64, u32> = HashMap::new();
    let deadline = Instant::now() + Duration::from_secs(120);
    loop {
        for entry in dash.contents(BUILD_TAB)? {
            if seen.get(&entry.stamp.seq) == Some(&entry.revisions) {
                continue;
            }
            seen.insert(entry.stamp.seq, entry.revisions);
            let line = if json {
                serde_json::to_string(&entry)?
            } else {
                entry.format()
            };
            let _ = out_tx.send(OutputLine::Stdout(line));
        }

        let idle = [build, deploy]
            .iter()
            .all(|at| matches!(dash.phase(*at), Ok(FieldPhase::Idle)));
        if idle || Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    dash.shutdown().await;
    drop(out_tx);
    let _ = out_handle.await;
    Ok(())
}
