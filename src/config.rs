use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};
use std::{env, fmt, path::PathBuf, time::Duration};

use crate::services::scheduler::Schedule;

/// What the ingest endpoint does after a successful upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PostUploadAction {
    /// Respond straight away.
    None,
    /// Mirror the new object locally before responding.
    Mirror,
    /// Queue a full sweep in the background.
    Sweep,
}

/// Credentials and endpoint of the remote media store.
#[derive(Clone)]
pub struct RemoteConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    /// Applied to every remote call, body transfer included.
    pub timeout: Duration,
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Local mirror layout.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Directory the full and daily trees are written under.
    pub base_dir: PathBuf,
    /// Top-level key segment all objects of interest live under.
    pub root: String,
    pub schedule: Schedule,
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub timestamp_suffix: bool,
    pub post_upload: PostUploadAction,
    pub remote: RemoteConfig,
    pub mirror: MirrorConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Zone image ingest endpoint and local mirror sweeper")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Directory the local mirror is written to (overrides MIRROR_BASE_DIR)
    #[arg(long, global = true)]
    pub base_dir: Option<PathBuf>,

    /// Root key prefix of mirrored objects (overrides MIRROR_ROOT)
    #[arg(long, global = true)]
    pub root: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Serve `POST /upload`
    Serve {
        /// Host to bind to (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (overrides PORT)
        #[arg(long)]
        port: Option<u16>,

        /// Directory for in-flight uploads (overrides UPLOAD_DIR)
        #[arg(long)]
        upload_dir: Option<PathBuf>,

        /// Action after a successful upload (overrides POST_UPLOAD_ACTION)
        #[arg(long, value_enum)]
        post_upload: Option<PostUploadAction>,
    },
    /// Mirror remote objects into the local tree
    Mirror {
        /// Run a single sweep and exit
        #[arg(long)]
        once: bool,

        /// Sweep every N seconds instead of at the top of each hour (overrides MIRROR_INTERVAL_SECS)
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        let args = Args::parse();
        Self::from_sources(args, |name| env::var(name))
    }

    /// Merge parsed CLI args over values looked up by `var` (CLI wins).
    pub fn from_sources<F>(args: Args, var: F) -> Result<(Self, Command)>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let lookup = |name: &str| -> Result<Option<String>> {
            match var(name) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };
        let required = |name: &str| -> Result<String> {
            lookup(name)?
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", name))
        };
        let parsed = |name: &str| -> Result<Option<u64>> {
            lookup(name)?
                .map(|value| {
                    value
                        .parse::<u64>()
                        .with_context(|| format!("parsing {} value `{}`", name, value))
                })
                .transpose()
        };

        let (cli_host, cli_port, cli_upload_dir, cli_post_upload) = match &args.command {
            Command::Serve {
                host,
                port,
                upload_dir,
                post_upload,
            } => (host.clone(), *port, upload_dir.clone(), *post_upload),
            Command::Mirror { .. } => (None, None, None, None),
        };
        let cli_interval = match &args.command {
            Command::Mirror { interval_secs, .. } => *interval_secs,
            Command::Serve { .. } => None,
        };

        // --- Environment fallback ---
        let env_port = match lookup("PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 3000,
        };
        let env_post_upload = match lookup("POST_UPLOAD_ACTION")? {
            Some(value) => PostUploadAction::from_str(&value, true)
                .map_err(|err| anyhow!("parsing POST_UPLOAD_ACTION value `{}`: {}", value, err))?,
            None => PostUploadAction::None,
        };
        let timestamp_suffix = match lookup("UPLOAD_TIMESTAMP_SUFFIX")? {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("parsing UPLOAD_TIMESTAMP_SUFFIX value `{}`", value))?,
            None => true,
        };
        let interval = cli_interval.or(parsed("MIRROR_INTERVAL_SECS")?);
        let schedule = match interval {
            Some(0) => anyhow::bail!("mirror interval must be at least one second"),
            Some(secs) => Schedule::Every(Duration::from_secs(secs)),
            None => Schedule::HourlyAtTopOfHour,
        };

        let remote = RemoteConfig {
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: required("CLOUDINARY_API_SECRET")?,
            api_base: lookup("CLOUDINARY_API_BASE")?
                .unwrap_or_else(|| "https://api.cloudinary.com".into()),
            timeout: Duration::from_secs(parsed("REMOTE_TIMEOUT_SECS")?.unwrap_or(60)),
        };

        // --- Merge ---
        let cfg = Self {
            host: cli_host
                .or(lookup("HOST")?)
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: cli_port.unwrap_or(env_port),
            upload_dir: cli_upload_dir
                .or(lookup("UPLOAD_DIR")?.map(PathBuf::from))
                .unwrap_or_else(|| PathBuf::from("temp_uploads")),
            max_upload_bytes: parsed("MAX_UPLOAD_BYTES")?
                .map(|v| v as usize)
                .unwrap_or(25 * 1024 * 1024),
            timestamp_suffix,
            post_upload: cli_post_upload.unwrap_or(env_post_upload),
            remote,
            mirror: MirrorConfig {
                base_dir: args
                    .base_dir
                    .or(lookup("MIRROR_BASE_DIR")?.map(PathBuf::from))
                    .unwrap_or_else(|| PathBuf::from("Zones")),
                root: args
                    .root
                    .or(lookup("MIRROR_ROOT")?)
                    .unwrap_or_else(|| "Zones".into()),
                schedule,
            },
        };

        Ok((cfg, args.command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("expected a boolean, got `{}`", other)),
    }
}
