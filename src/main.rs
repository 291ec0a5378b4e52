use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Parser;
use pixelchat::{canvas::CANVAS_SIZE, AppContext, BridgeConfig, BridgeEvent, CanvasGrid, Role};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(
    name = "pixelchat",
    about = "Pixel-art chat — AI assistant driving a canvas over a subprocess bridge",
    version
)]
struct Args {
    /// Wrapper executable that speaks the line-delimited JSON protocol
    #[arg(long, env = "PIXELCHAT_WRAPPER")]
    wrapper: Option<String>,

    /// Argument passed to the wrapper executable (repeatable)
    #[arg(long = "wrapper-arg")]
    wrapper_args: Vec<String>,

    /// Working directory for the wrapper (default: current directory)
    #[arg(long, env = "PIXELCHAT_DIR")]
    dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "PIXELCHAT_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "PIXELCHAT_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Single-shot prompt: send it, stream the reply, then exit
    #[arg(long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(
        args.log.as_deref().unwrap_or("info"),
        args.log_file.as_ref(),
    );

    let config = BridgeConfig::new(
        args.wrapper,
        (!args.wrapper_args.is_empty()).then_some(args.wrapper_args),
        args.dir,
    );
    let app = AppContext::new(config);

    // Print transcript and canvas activity as it happens. User entries are
    // skipped — the user just typed them.
    let mut rx = app.events.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            match event {
                BridgeEvent::EntryAppended(entry) => match entry.role {
                    Role::Assistant => println!("assistant> {}", entry.text),
                    Role::System => eprintln!("[system] {}", entry.text),
                    Role::User => {}
                },
                BridgeEvent::PixelDrawn { x, y, color } => {
                    println!("[canvas] ({x}, {y}) <- {}", color.to_hex());
                }
                BridgeEvent::ConnectionChanged { connected } => {
                    eprintln!(
                        "[system] assistant {}",
                        if connected { "connected" } else { "disconnected" }
                    );
                }
            }
        }
    });

    app.supervisor
        .start()
        .await
        .context("failed to start the assistant wrapper")?;

    if let Some(prompt) = args.prompt {
        run_one_shot(&app, &prompt).await?;
    } else {
        run_repl(&app).await?;
    }

    if app.supervisor.is_running().await {
        app.supervisor.stop().await?;
    }
    printer.abort();
    Ok(())
}

/// Send one prompt, give the streamed reply time to arrive, and exit.
async fn run_one_shot(app: &AppContext, prompt: &str) -> Result<()> {
    app.supervisor.send_query(prompt).await?;
    // No turn-complete signal in the protocol; wait for output to settle.
    let mut last_len = 0;
    for _ in 0..30 {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let len = app.transcript.len().await;
        if len > 1 && len == last_len {
            break;
        }
        last_len = len;
    }
    Ok(())
}

/// Interactive loop: each stdin line is a prompt, `/`-commands aside.
async fn run_repl(app: &AppContext) -> Result<()> {
    println!("Type a prompt, or /canvas, /interrupt, /quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/interrupt" => {
                if let Err(e) = app.supervisor.interrupt().await {
                    eprintln!("error: {e}");
                }
            }
            "/canvas" => print_canvas(&app.canvas).await,
            prompt => {
                if let Err(e) = app.supervisor.send_query(prompt).await {
                    eprintln!("error: {e}");
                }
            }
        }
    }
    Ok(())
}

/// Render the grid with ANSI half-blocks, two rows per terminal line.
async fn print_canvas(canvas: &Arc<CanvasGrid>) {
    let pixels = canvas.snapshot().await;
    for row in (0..CANVAS_SIZE).step_by(2) {
        let mut line = String::with_capacity(CANVAS_SIZE * 24);
        for col in 0..CANVAS_SIZE {
            let top = pixels[row * CANVAS_SIZE + col];
            let bottom = pixels[(row + 1) * CANVAS_SIZE + col];
            line.push_str(&format!(
                "\x1b[38;2;{};{};{}m\x1b[48;2;{};{};{}m\u{2580}",
                top.r, top.g, top.b, bottom.r, bottom.g, bottom.b
            ));
        }
        line.push_str("\x1b[0m");
        println!("{line}");
    }
}

/// Initialize tracing. If `log_file` is set, logs go to both stderr and a
/// daily-rolling file; the returned guard must stay alive for the file
/// writer to flush.
fn init_logging(
    log_level: &str,
    log_file: Option<&PathBuf>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let Some(path) = log_file else {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level))
            .with_writer(std::io::stderr)
            .compact()
            .init();
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let filename = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("pixelchat.log"));

    // Fall back to stderr-only rather than failing on a bad log path.
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!(
            "warn: could not create log directory '{}': {e} — falling back to stderr",
            dir.display()
        );
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(log_level))
            .with_writer(std::io::stderr)
            .compact()
            .init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(non_blocking))
        .init();
    Some(guard)
}
