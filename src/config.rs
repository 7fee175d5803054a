use crate::{
    services::{
        namespace_service::{DEFAULT_PRESIGN_TTL_SECS, MAX_PRESIGN_TTL_SECS},
        pager::{MAX_WALK_PAGE_SIZE, WalkOptions},
    },
    store::s3::S3Settings,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

/// Which object store implementation backs the namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    S3,
    Memory,
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "s3" => Ok(Backend::S3),
            "memory" => Ok(Backend::Memory),
            other => bail!("unknown backend `{}` (expected `s3` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: Backend,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub path_style: bool,
    pub presign_ttl_secs: u64,
    pub walk_page_size: usize,
    pub walk_pause_ms: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Folder-style file manager API over an S3 bucket")]
pub struct Args {
    /// Host to bind to (overrides S3FM_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides S3FM_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides S3FM_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// Bucket to browse (overrides S3FM_BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// AWS region (overrides S3FM_REGION)
    #[arg(long)]
    pub region: Option<String>,

    /// Custom S3-compatible endpoint URL (overrides S3FM_ENDPOINT)
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Use path-style bucket addressing (overrides S3FM_PATH_STYLE)
    #[arg(long)]
    pub path_style: bool,

    /// Default lifetime of presigned URLs in seconds (overrides S3FM_PRESIGN_TTL)
    #[arg(long)]
    pub presign_ttl: Option<u64>,

    /// Keys fetched per page when walking a whole folder (overrides S3FM_WALK_PAGE_SIZE)
    #[arg(long)]
    pub walk_page_size: Option<usize>,

    /// Pause between folder walk pages in milliseconds (overrides S3FM_WALK_PAUSE_MS)
    #[arg(long)]
    pub walk_pause_ms: Option<u64>,
}

/// Read and parse `name`, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map_err(|err| anyhow::anyhow!("{}", err))
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    pub fn from_args(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("S3FM_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("S3FM_PORT", 8080u16)?;
        let env_backend = env_or("S3FM_BACKEND", Backend::S3)?;
        let env_bucket = env::var("S3FM_BUCKET").ok().filter(|b| !b.trim().is_empty());
        let env_region = env::var("S3FM_REGION").unwrap_or_else(|_| "us-east-1".into());
        let env_endpoint = env::var("S3FM_ENDPOINT").ok().filter(|e| !e.is_empty());
        let env_ttl = env_or("S3FM_PRESIGN_TTL", DEFAULT_PRESIGN_TTL_SECS)?;
        let env_page_size = env_or("S3FM_WALK_PAGE_SIZE", MAX_WALK_PAGE_SIZE)?;
        let env_pause = env_or("S3FM_WALK_PAUSE_MS", 0u64)?;

        // --- Merge ---
        let backend = args.backend.unwrap_or(env_backend);
        let bucket = match (args.bucket.or(env_bucket), backend) {
            (Some(bucket), _) => bucket,
            (None, Backend::Memory) => "local".to_string(),
            (None, Backend::S3) => bail!("a bucket is required (--bucket or S3FM_BUCKET)"),
        };

        let presign_ttl_secs = args.presign_ttl.unwrap_or(env_ttl);
        if presign_ttl_secs == 0 || presign_ttl_secs > MAX_PRESIGN_TTL_SECS {
            bail!(
                "presign ttl must be between 1 and {} seconds, got {}",
                MAX_PRESIGN_TTL_SECS,
                presign_ttl_secs
            );
        }

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            backend,
            bucket,
            region: args.region.unwrap_or(env_region),
            endpoint: args.endpoint.or(env_endpoint),
            path_style: args.path_style || env_flag("S3FM_PATH_STYLE"),
            presign_ttl_secs,
            walk_page_size: args
                .walk_page_size
                .unwrap_or(env_page_size)
                .clamp(1, MAX_WALK_PAGE_SIZE),
            walk_pause_ms: args.walk_pause_ms.unwrap_or(env_pause),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            region: self.region.clone(),
            endpoint: self.endpoint.clone(),
            force_path_style: self.path_style,
        }
    }

    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            page_size: self.walk_page_size,
            pause: (self.walk_pause_ms > 0).then(|| Duration::from_millis(self.walk_pause_ms)),
            max_pages: None,
        }
    }

    pub fn presign_ttl(&self) -> Duration {
        Duration::from_secs(self.presign_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_backend_gets_default_bucket() {
        let cfg = AppConfig::from_args(Args {
            backend: Some(Backend::Memory),
            walk_page_size: Some(5000),
            walk_pause_ms: Some(20),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(cfg.bucket, "local");
        assert_eq!(cfg.walk_page_size, MAX_WALK_PAGE_SIZE);
        assert_eq!(cfg.walk_options().pause, Some(Duration::from_millis(20)));
    }

    #[test]
    fn cli_values_override_defaults() {
        let cfg = AppConfig::from_args(Args {
            host: Some("127.0.0.1".into()),
            port: Some(9000),
            backend: Some(Backend::S3),
            bucket: Some("media".into()),
            endpoint: Some("http://localhost:9000".into()),
            path_style: true,
            presign_ttl: Some(60),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(cfg.addr(), "127.0.0.1:9000");
        assert_eq!(cfg.bucket, "media");
        let s3 = cfg.s3_settings();
        assert!(s3.force_path_style);
        assert_eq!(s3.endpoint.as_deref(), Some("http://localhost:9000"));
        assert_eq!(cfg.presign_ttl(), Duration::from_secs(60));
    }

    #[test]
    fn rejects_out_of_range_presign_ttl() {
        let err = AppConfig::from_args(Args {
            backend: Some(Backend::Memory),
            presign_ttl: Some(MAX_PRESIGN_TTL_SECS + 1),
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.to_string().contains("presign ttl"));
    }

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("MEMORY".parse::<Backend>().unwrap(), Backend::Memory);
        assert!("gcs".parse::<Backend>().is_err());
    }
}
