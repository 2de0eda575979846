use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use portsmith::config::Settings;
use portsmith::context::Context;
use portsmith::executor::{ExecCtx, StdoutSink};
use portsmith::install::{InstallOptions, Installer, RemoveOptions};
use portsmith::ports::{NameVersion, Port, tree};
use portsmith::{Error, Result, fingerprint};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Workspace settings file
    #[arg(long, global = true, default_value = "portsmith.toml")]
    config: PathBuf,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install a port and its dependencies
    Install {
        /// Port as name@version
        port: String,
        /// Build for the host (dev tools) instead of the configured platform
        #[arg(long)]
        dev: bool,
        /// Purge and rebuild the port
        #[arg(long)]
        force: bool,
        /// With --force, rebuild dependencies too
        #[arg(long)]
        recursive: bool,
        /// Push freshly built packages to the configured cache
        #[arg(long)]
        store_cache: bool,
        /// Token authorizing cache writes
        #[arg(long)]
        cache_token: Option<String>,
        /// Parallel build jobs (0 = use CPU count)
        #[arg(long)]
        jobs: Option<usize>,
        /// Only print step titles and failures
        #[arg(long)]
        quiet: bool,
    },
    /// Remove an installed port
    Remove {
        port: String,
        #[arg(long)]
        dev: bool,
        /// Remove dependencies first
        #[arg(long)]
        recursive: bool,
        /// Also delete the package tree
        #[arg(long)]
        purge: bool,
        /// Also delete the build dir and step logs
        #[arg(long)]
        build_cache: bool,
    },
    /// Print the fingerprint hash of a port
    Hash {
        port: String,
        #[arg(long)]
        dev: bool,
        /// Also print the fingerprint document
        #[arg(long)]
        meta: bool,
        /// Print a JSON object instead of plain text
        #[arg(long)]
        json: bool,
    },
    /// Print the resolved dependency tree
    Tree {
        port: String,
        #[arg(long)]
        dev: bool,
    },
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("PORTSMITH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init();
    }
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn on_signal(_: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

// Children run in their own process groups, so a terminal interrupt only reaches us.
fn forward_interrupts(exec: ExecCtx) {
    #[cfg(unix)]
    unsafe {
        libc::signal(libc::SIGINT, on_signal as libc::sighandler_t);
        libc::signal(libc::SIGTERM, on_signal as libc::sighandler_t);
    }
    std::thread::spawn(move || {
        loop {
            if INTERRUPTED.load(Ordering::SeqCst) {
                tracing::warn!("interrupted, stopping running steps");
                exec.request_cancel();
                return;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
    });
}

fn load_context(path: &Path, jobs: Option<usize>, quiet: bool) -> Result<Context> {
    let mut settings = Settings::load(path)?;
    if let Some(jobs) = jobs {
        settings.global.jobs = jobs;
    }
    let sink = if quiet {
        StdoutSink::quiet()
    } else {
        StdoutSink::default()
    };
    let ctx = Context::new(settings, Arc::new(sink))?;
    forward_interrupts(ctx.exec.clone());
    Ok(ctx)
}

fn main() {
    let args = Args::parse();
    init_logging(args.log_json);
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.cmd {
        Command::Install {
            port,
            dev,
            force,
            recursive,
            store_cache,
            cache_token,
            jobs,
            quiet,
        } => {
            let ctx = load_context(&args.config, jobs, quiet)?;
            let opts = InstallOptions {
                force,
                recursive,
                store_cache,
                cache_token,
            };
            cmd_install(&ctx, &NameVersion::parse(&port)?, dev, opts)
        }
        Command::Remove {
            port,
            dev,
            recursive,
            purge,
            build_cache,
        } => {
            let ctx = load_context(&args.config, None, false)?;
            let opts = RemoveOptions {
                recursive,
                purge,
                build_cache,
            };
            portsmith::install::remove(&ctx, &NameVersion::parse(&port)?, dev, opts)
        }
        Command::Hash {
            port,
            dev,
            meta,
            json,
        } => {
            let ctx = load_context(&args.config, None, true)?;
            cmd_hash(&ctx, &NameVersion::parse(&port)?, dev, meta, json)
        }
        Command::Tree { port, dev } => {
            let ctx = load_context(&args.config, None, true)?;
            print!("{}", tree::render(&ctx, &NameVersion::parse(&port)?, dev)?);
            Ok(())
        }
    }
}

fn cmd_install(ctx: &Context, nv: &NameVersion, dev: bool, opts: InstallOptions) -> Result<()> {
    let mut installer = Installer::new(ctx, opts)?;
    let res = installer.install(nv, dev);
    for (i, r) in installer.report().iter().enumerate() {
        let role = if r.dev { " (dev)" } else { "" };
        let via = r
            .required_by
            .as_deref()
            .map(|p| format!("  <- {p}"))
            .unwrap_or_default();
        println!(
            "{:>2}. {:<32} {}{via}",
            i + 1,
            format!("{}{role}", r.port),
            r.outcome
        );
    }
    res.map(|_| ())
}

fn cmd_hash(ctx: &Context, nv: &NameVersion, dev: bool, meta: bool, json: bool) -> Result<()> {
    let port = Port::resolve(ctx, nv, dev)?;
    let fp = fingerprint::generate(ctx, &port)?;
    if json {
        let mut obj = serde_json::json!({
            "port": nv.to_string(),
            "dev": dev,
            "hash": fp.hash,
        });
        if meta {
            obj["meta"] = serde_json::Value::String(fp.document.clone());
        }
        let s = serde_json::to_string_pretty(&obj)
            .map_err(|e| Error::msg(format!("failed to encode JSON: {e}")))?;
        println!("{s}");
        return Ok(());
    }
    if meta {
        print!("{}", fp.document);
    }
    println!("{}", fp.hash);
    Ok(())
}
