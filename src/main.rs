#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # webgrade
//!
//! Command-line front end for the evaluation engine: grade two directories
//! against each other, grade a stored submission, or serve the HTTP surface.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};
use webgrade::{
    Challenge, CodeBundle, EngineConfig, EvaluationResult, EvaluationService, Evaluator,
    config::{self, RendererKind},
    report,
    repository::FsRepository,
    server,
};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Evaluate a candidate directory against an expected directory
    Evaluate {
        /// Directory with the candidate's index.html/style.css/script.js
        candidate:   PathBuf,
        /// Directory with the reference solution
        expected:    PathBuf,
        /// Optional challenge settings (JSON)
        challenge:   Option<PathBuf>,
        /// Print JSON instead of tables
        json:        bool,
        /// Use the browserless renderer
        static_mode: bool,
    },
    /// Evaluate a stored submission and save its result
    Grade {
        /// Root of the data directory
        data:        PathBuf,
        /// Submission id
        id:          String,
        /// Print JSON instead of tables
        json:        bool,
        /// Use the browserless renderer
        static_mode: bool,
    },
    /// Serve the HTTP surface
    Serve {
        /// Root of the data directory
        data:        PathBuf,
        /// Address to listen on
        addr:        SocketAddr,
        /// Use the browserless renderer
        static_mode: bool,
    },
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses --json
    fn json() -> impl Parser<bool> {
        long("json").help("Print the result as JSON").switch()
    }

    /// parses --static
    fn static_mode() -> impl Parser<bool> {
        long("static")
            .help("Render without a browser (no scripts, blank screenshots)")
            .switch()
    }

    /// parses --data
    fn data() -> impl Parser<PathBuf> {
        long("data")
            .help("Directory holding challenges/ and submissions/")
            .argument::<PathBuf>("DIR")
    }

    let evaluate = {
        let candidate = long("candidate")
            .help("Directory with the candidate's files")
            .argument::<PathBuf>("DIR");
        let expected = long("expected")
            .help("Directory with the reference solution's files")
            .argument::<PathBuf>("DIR");
        let challenge = long("challenge")
            .help("Challenge settings file (JSON)")
            .argument::<PathBuf>("FILE")
            .optional();
        let json = json();
        let static_mode = static_mode();
        construct!(Cmd::Evaluate {
            candidate,
            expected,
            challenge,
            json,
            static_mode
        })
        .to_options()
        .command("evaluate")
        .help("Evaluate a candidate directory against an expected one")
    };

    let grade = {
        let data = data();
        let json = json();
        let static_mode = static_mode();
        let id = positional::<String>("ID").help("Submission id");
        construct!(Cmd::Grade {
            data,
            json,
            static_mode,
            id
        })
        .to_options()
        .command("grade")
        .help("Evaluate a stored submission and save the result")
    };

    let serve = {
        let data = data();
        let addr = long("addr")
            .help("Address to listen on")
            .argument::<SocketAddr>("ADDR")
            .fallback(SocketAddr::from(([127, 0, 0, 1], 8080)));
        let static_mode = static_mode();
        construct!(Cmd::Serve {
            data,
            addr,
            static_mode
        })
        .to_options()
        .command("serve")
        .help("Serve POST /evaluate and GET /health")
    };

    construct!([evaluate, grade, serve])
        .to_options()
        .descr("Grades HTML/CSS/JS submissions against a reference solution")
        .run()
}

/// Log level from `WEBGRADE_LOG`, defaulting to info.
fn log_level() -> Level {
    std::env::var("WEBGRADE_LOG")
        .ok()
        .and_then(|level| level.trim().parse::<Level>().ok())
        .unwrap_or(Level::INFO)
}

/// Reads the environment configuration and applies CLI overrides.
fn engine_config(static_mode: bool) -> Result<EngineConfig> {
    let mut cfg = (*config::ensure_initialized()?).clone();
    if static_mode {
        cfg = cfg.with_renderer(RendererKind::Static);
    }
    config::install(cfg.clone());
    Ok(cfg)
}

/// Builds a service over a data directory.
fn fs_service(data: PathBuf, cfg: EngineConfig) -> EvaluationService {
    let repository = Arc::new(FsRepository::new(data));
    EvaluationService::new(Evaluator::from_config(cfg), repository.clone(), repository)
}

/// Prints a result as JSON or tables.
fn print_result(result: &EvaluationResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        println!("{}", report::render_summary(result));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);
    let filter_layer = LevelFilter::from_level(log_level());
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    match options() {
        Cmd::Evaluate {
            candidate,
            expected,
            challenge,
            json,
            static_mode,
        } => {
            let cfg = engine_config(static_mode)?;
            let candidate = CodeBundle::from_dir(&candidate)?;
            let expected = CodeBundle::from_dir(&expected)?;
            let mut challenge: Challenge = match challenge {
                Some(path) => {
                    let raw = std::fs::read_to_string(&path)
                        .with_context(|| format!("Could not read {}", path.display()))?;
                    serde_json::from_str(&raw)
                        .with_context(|| format!("{} is not a valid challenge", path.display()))?
                }
                None => Challenge::default(),
            };
            challenge.expected = expected;

            let result = Evaluator::from_config(cfg)
                .evaluate(&candidate, &challenge)
                .await?;
            print_result(&result, json)?;
        }
        Cmd::Grade {
            data,
            id,
            json,
            static_mode,
        } => {
            let cfg = engine_config(static_mode)?;
            let result = fs_service(data, cfg).evaluate(&id).await?;
            print_result(&result, json)?;
        }
        Cmd::Serve {
            data,
            addr,
            static_mode,
        } => {
            let cfg = engine_config(static_mode)?;
            server::serve(fs_service(data, cfg), addr).await?;
        }
    };

    Ok(())
}
