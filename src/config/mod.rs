//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

mod cli;

pub use cli::{CliArgs, Command, CompileArgs, EngineOverrides, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "latexd";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_ENGINE_PROGRAM: &str = "pdflatex";
const DEFAULT_ENGINE_PASSES: u32 = 1;
const DEFAULT_ENGINE_TIMEOUT_SECS: u64 = 90;
const DEFAULT_ENGINE_MAX_CONCURRENT_JOBS: u32 = 4;
const DEFAULT_ENGINE_CHUNK_BUFFER: u32 = 16;
const DEFAULT_HTTP_MAX_REQUEST_BYTES: u64 = 10 * 1024 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub engine: EngineSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

/// Read-only parameters handed to every compilation job.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub program: PathBuf,
    pub texinputs: Option<String>,
    /// Always one: the source reaches the engine as a single forward-only stream.
    pub passes: NonZeroU32,
    pub timeout: Duration,
    pub max_concurrent_jobs: NonZeroU32,
    pub chunk_buffer: NonZeroU32,
}

impl EngineSettings {
    /// Engine identity reported by the status endpoint.
    pub fn engine_name(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_ENGINE_PROGRAM),
            texinputs: None,
            passes: NonZeroU32::MIN,
            timeout: Duration::from_secs(DEFAULT_ENGINE_TIMEOUT_SECS),
            max_concurrent_jobs: NonZeroU32::new(DEFAULT_ENGINE_MAX_CONCURRENT_JOBS)
                .unwrap_or(NonZeroU32::MIN),
            chunk_buffer: NonZeroU32::new(DEFAULT_ENGINE_CHUNK_BUFFER).unwrap_or(NonZeroU32::MIN),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("LATEXD").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Compile(args)) => raw.apply_compile_overrides(args),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    engine: RawEngineSettings,
    http: RawHttpSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.http_max_request_bytes {
            self.http.max_request_bytes = Some(limit);
        }

        self.apply_engine_overrides(&overrides.engine);
    }

    fn apply_compile_overrides(&mut self, args: &CompileArgs) {
        if let Some(level) = args.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        self.apply_engine_overrides(&args.engine);
    }

    fn apply_engine_overrides(&mut self, overrides: &EngineOverrides) {
        if let Some(program) = overrides.program.as_ref() {
            self.engine.program = Some(program.clone());
        }
        if let Some(texinputs) = overrides.texinputs.as_ref() {
            self.engine.texinputs = Some(texinputs.clone());
        }
        if let Some(seconds) = overrides.timeout_seconds {
            self.engine.timeout_seconds = Some(seconds);
        }
        if let Some(count) = overrides.max_concurrent_jobs {
            self.engine.max_concurrent_jobs = Some(count);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            engine,
            http,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let engine = build_engine_settings(engine)?;
        let http = build_http_settings(http)?;

        Ok(Self {
            server,
            logging,
            engine,
            http,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_engine_settings(engine: RawEngineSettings) -> Result<EngineSettings, LoadError> {
    let program = engine
        .program
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ENGINE_PROGRAM));
    if program.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "engine.program",
            "path must not be empty",
        ));
    }

    let texinputs = engine.texinputs.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let passes = engine.passes.unwrap_or(DEFAULT_ENGINE_PASSES);
    if passes != 1 {
        return Err(LoadError::invalid(
            "engine.passes",
            "only a single pass is supported; the source is streamed to the engine once",
        ));
    }

    let timeout_secs = engine
        .timeout_seconds
        .unwrap_or(DEFAULT_ENGINE_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "engine.timeout_seconds",
            "must be greater than zero",
        ));
    }

    let max_concurrent_jobs = non_zero_u32(
        engine
            .max_concurrent_jobs
            .unwrap_or(DEFAULT_ENGINE_MAX_CONCURRENT_JOBS)
            .into(),
        "engine.max_concurrent_jobs",
    )?;
    let chunk_buffer = non_zero_u32(
        engine
            .chunk_buffer
            .unwrap_or(DEFAULT_ENGINE_CHUNK_BUFFER)
            .into(),
        "engine.chunk_buffer",
    )?;

    Ok(EngineSettings {
        program,
        texinputs,
        passes: NonZeroU32::MIN,
        timeout: Duration::from_secs(timeout_secs),
        max_concurrent_jobs,
        chunk_buffer,
    })
}

fn build_http_settings(http: RawHttpSettings) -> Result<HttpSettings, LoadError> {
    let value = http
        .max_request_bytes
        .unwrap_or(DEFAULT_HTTP_MAX_REQUEST_BYTES);
    let max_request_bytes = NonZeroU64::new(value).ok_or_else(|| {
        LoadError::invalid("http.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(value).map_err(|_| {
        LoadError::invalid(
            "http.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(HttpSettings { max_request_bytes })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawEngineSettings {
    program: Option<PathBuf>,
    texinputs: Option<String>,
    passes: Option<u32>,
    timeout_seconds: Option<u64>,
    max_concurrent_jobs: Option<u32>,
    chunk_buffer: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawHttpSettings {
    max_request_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
