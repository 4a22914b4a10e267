use std::env;
use std::net::SocketAddr;

use anyhow::Context;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub max_connections: u32,
    pub smtp: SmtpConfig,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let bind_addr = match env::var("BIND_ADDR") {
            Ok(raw) => raw
                .parse()
                .context("BIND_ADDR is not a valid socket address")?,
            Err(_) => SocketAddr::from(([127, 0, 0, 1], 3000)),
        };
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let max_connections = match env::var("PG_MAX_CONNECTIONS") {
            Ok(raw) => raw.parse().context("PG_MAX_CONNECTIONS is not a number")?,
            Err(_) => 5,
        };
        let smtp = SmtpConfig {
            host: env::var("SMTP_HOST").context("SMTP_HOST must be set")?,
            username: env::var("SMTP_USERNAME").context("SMTP_USERNAME must be set")?,
            password: env::var("SMTP_PASSWORD").context("SMTP_PASSWORD must be set")?,
            from: env::var("SMTP_FROM").context("SMTP_FROM must be set")?,
        };
        Ok(Config {
            bind_addr,
            database_url,
            max_connections,
            smtp,
        })
    }
}
