//! Environment-driven configuration, assembled once at startup and shared
//! read-only for the life of the process.

use anyhow::{Context, Result};
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub base_url: String,
    pub bind_addr: String,
    pub s3: S3Config,
    pub max_upload_bytes: u64,
    pub max_videos_per_month: u32,
    pub max_video_duration_seconds: u32,
    pub transcription_enabled: bool,
    pub allowed_frame_ancestors: String,
    pub smtp: Option<SmtpConfig>,
}

#[derive(Clone, Debug)]
pub struct S3Config {
    pub internal_endpoint: String,
    pub public_endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

fn env_var(name: &str) -> Result<String> {
    env::var(name).with_context(|| format!("{name} env var required"))
}

fn env_var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let database_url = env_var("DATABASE_URL")?;
        let jwt_secret = env_var("JWT_SECRET")?;
        let base_url = env_var("BASE_URL")?;

        let s3 = S3Config {
            internal_endpoint: env_var("S3_ENDPOINT")?,
            public_endpoint: env_var_or("S3_PUBLIC_ENDPOINT", &env_var("S3_ENDPOINT")?),
            bucket: env_var("S3_BUCKET")?,
            access_key: env_var("S3_ACCESS_KEY")?,
            secret_key: env_var("S3_SECRET_KEY")?,
            region: env_var_or("S3_REGION", "auto"),
        };

        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env_parse_or("SMTP_PORT", 587u16),
                username: env_var_or("SMTP_USERNAME", ""),
                password: env_var_or("SMTP_PASSWORD", ""),
                from: env_var_or("SMTP_FROM", "no-reply@sendrec.local"),
            }),
            Err(_) => None,
        };

        Ok(Self {
            bind_addr: env_var_or("BIND_ADDR", "0.0.0.0:8080"),
            max_upload_bytes: env_parse_or("MAX_UPLOAD_BYTES", 500 * 1024 * 1024u64),
            max_videos_per_month: env_parse_or("MAX_VIDEOS_PER_MONTH", 0u32),
            max_video_duration_seconds: env_parse_or("MAX_VIDEO_DURATION_SECONDS", 0u32),
            transcription_enabled: env_parse_or("TRANSCRIPTION_ENABLED", true),
            allowed_frame_ancestors: env_var_or("ALLOWED_FRAME_ANCESTORS", "'none'"),
            database_url,
            jwt_secret,
            base_url,
            s3,
            smtp,
        })
    }

    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}
