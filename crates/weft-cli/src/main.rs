use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;

use weft_core::{StaticPolicy, WeftConfig};
use weft_script::{
    ChardetngSniffer, HtmlFormatter, Interpreter, MarkupFormatter, RhaiInterpreter, ScriptUnit,
};
use weft_server::{HttpServer, RequestDispatcher};

#[derive(Parser)]
#[command(
    name = "weft",
    about = "Weft — hypertext generation script server",
    version,
)]
struct Cli {
    /// Script files to serve, or a single site root directory.
    ///
    /// A directory serves its whole tree: request paths resolve to scripts
    /// by ending probe (.weft, .wefts, .rhai, then the bare name, with an
    /// index-script probe for directories), falling back to static files
    /// and directory listings. A single file answers every request on any
    /// path; several files each answer under their own path.
    #[arg(required = true, value_name = "FILES")]
    files: Vec<PathBuf>,

    /// Never serve non-script files.
    #[arg(short = 'n', long = "no-static-files")]
    no_static_files: bool,

    /// With --no-static-files, still serve files whose content type is
    /// text/html (directory listings included). Has no effect on its own,
    /// as HTML is served by default.
    #[arg(short = 't', long = "serve-html")]
    serve_html: bool,

    /// Host to listen on. Defaults to localhost; use 0.0.0.0 to listen on
    /// all public inbound addresses (for e.g. docker).
    #[arg(short = 'd', long)]
    host: Option<String>,

    /// Port to bind. Defaults to 80 (http standard).
    #[arg(short, long)]
    port: Option<u16>,

    /// Optional weft.toml supplying defaults for host, port, and the
    /// static policy. Explicit flags win.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn build_dispatcher(files: &[PathBuf], policy: StaticPolicy) -> anyhow::Result<RequestDispatcher> {
    let interpreter: Arc<dyn Interpreter> = Arc::new(RhaiInterpreter::new());
    let formatter: Arc<dyn MarkupFormatter> = Arc::new(HtmlFormatter);
    let sniffer = ChardetngSniffer::new();

    if let [only] = files {
        if !only.exists() {
            bail!("file or directory {} does not exist", only.display());
        }
        if only.is_dir() {
            return Ok(RequestDispatcher::hierarchical(
                only.clone(),
                policy,
                interpreter,
                formatter,
                Arc::new(sniffer),
            ));
        }
        let unit = ScriptUnit::new(only.clone(), interpreter, formatter, &sniffer)?;
        return Ok(RequestDispatcher::single(Arc::new(unit)));
    }

    let mut units = Vec::new();
    for file in files {
        if !file.exists() {
            bail!("file {} does not exist", file.display());
        }
        if file.is_dir() {
            bail!("multiple files given, but {} is a directory", file.display());
        }
        units.push(Arc::new(ScriptUnit::new(
            file.clone(),
            interpreter.clone(),
            formatter.clone(),
            &sniffer,
        )?));
    }
    Ok(RequestDispatcher::multi(units))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WeftConfig::from_file(path)?,
        None => WeftConfig::default(),
    };

    let host = cli
        .host
        .clone()
        .or_else(|| config.host().map(str::to_string))
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let port = cli.port.or_else(|| config.port()).unwrap_or(80);
    let policy = if cli.no_static_files || cli.serve_html {
        StaticPolicy::from_flags(cli.no_static_files, cli.serve_html)
    } else {
        config.static_policy().unwrap_or(StaticPolicy::All)
    };
    info!(host = %host, port, policy = policy.label(), "starting");

    let dispatcher = build_dispatcher(&cli.files, policy)?;

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;
    let bound = HttpServer::new(addr, dispatcher).bind().await?;
    println!("Weft server active on {} ...", bound.local_addr());

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    bound.serve(shutdown_rx).await?;
    println!("Closing server.");
    Ok(())
}
