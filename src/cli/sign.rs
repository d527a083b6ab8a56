//! Sign command implementation

use crate::config::Config;
use crate::delivery::{signature_header, verify_signature, SIGNATURE_HEADER};
use anyhow::Context;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// File holding the exact request body
    pub body: PathBuf,

    /// Shared secret (defaults to webhook.secret / WEBHOOK_SECRET)
    #[arg(long)]
    pub secret: Option<String>,

    /// Check this header value instead of printing a new one
    #[arg(long)]
    pub verify: Option<String>,
}

impl SignArgs {
    pub fn execute(&self, config: &Config) -> anyhow::Result<()> {
        println!("{}", self.render(config)?);
        Ok(())
    }

    fn render(&self, config: &Config) -> anyhow::Result<String> {
        let secret = self
            .secret
            .as_ref()
            .or(config.webhook.secret.as_ref())
            .filter(|s| !s.is_empty())
            .context("no secret: pass --secret or set WEBHOOK_SECRET")?;
        let body = std::fs::read(&self.body)
            .with_context(|| format!("failed to read {}", self.body.display()))?;

        match &self.verify {
            Some(header) => {
                verify_signature(secret.as_bytes(), &body, header)?;
                Ok(format!("signature valid ({} bytes)", body.len()))
            }
            None => Ok(format!(
                "{SIGNATURE_HEADER}: {}",
                signature_header(secret.as_bytes(), &body)?
            )),
        }
    }
}
