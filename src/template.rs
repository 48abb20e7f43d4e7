//! Unsigned transaction templates.
//!
//! Templates are opaque strings produced by an external builder from a base
//! (fresh or an existing template) and a list of input/output directives.

use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;

use crate::{
    config::BuilderConfig,
    error::{ExchangeError, Result},
    model::{Amount, Utxo},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxDirective {
    /// Spend a coin; the amount is only given when creating a template.
    Input {
        txid: String,
        vout: u32,
        amount: Option<Amount>,
    },
    /// Pay `amount` of `asset_id` to `address`.
    OutAddr {
        amount: Amount,
        address: String,
        asset_id: String,
    },
    /// Explicit fee output.
    OutFee { amount: Amount, asset_id: String },
}

impl TxDirective {
    pub fn input(utxo: &Utxo) -> Self {
        TxDirective::Input {
            txid: utxo.txid.clone(),
            vout: utxo.vout,
            amount: None,
        }
    }

    pub fn input_with_amount(utxo: &Utxo) -> Self {
        TxDirective::Input {
            txid: utxo.txid.clone(),
            vout: utxo.vout,
            amount: Some(utxo.amount),
        }
    }

    pub fn out_addr(amount: Amount, address: impl Into<String>, asset_id: impl Into<String>) -> Self {
        TxDirective::OutAddr {
            amount,
            address: address.into(),
            asset_id: asset_id.into(),
        }
    }

    pub fn out_fee(amount: Amount, asset_id: impl Into<String>) -> Self {
        TxDirective::OutFee {
            amount,
            asset_id: asset_id.into(),
        }
    }
}

impl fmt::Display for TxDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxDirective::Input {
                txid,
                vout,
                amount: Some(amount),
            } => write!(f, "in={}:{}:{}", txid, vout, amount),
            TxDirective::Input {
                txid,
                vout,
                amount: None,
            } => write!(f, "in={}:{}", txid, vout),
            TxDirective::OutAddr {
                amount,
                address,
                asset_id,
            } => write!(f, "outaddr={}:{}:{}", amount, address, asset_id),
            TxDirective::OutFee { amount, asset_id } => write!(f, "outscript={}::{}", amount, asset_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateBase {
    Create,
    Extend(String),
}

impl TemplateBase {
    fn as_arg(&self) -> &str {
        match self {
            TemplateBase::Create => "-create",
            TemplateBase::Extend(template) => template,
        }
    }
}

#[async_trait]
pub trait TemplateBuilder: Send + Sync {
    async fn build(&self, base: TemplateBase, directives: &[TxDirective]) -> Result<String>;
}

/// Runs the configured command-line builder once per template.
#[derive(Debug, Clone)]
pub struct CommandTemplateBuilder {
    path: String,
    option: String,
}

impl CommandTemplateBuilder {
    pub fn new(config: &BuilderConfig) -> Self {
        Self {
            path: config.path.clone(),
            option: config.option.clone(),
        }
    }

    fn args(&self, base: &TemplateBase, directives: &[TxDirective]) -> Vec<String> {
        let mut args = Vec::with_capacity(directives.len() + 2);
        if !self.option.is_empty() {
            args.push(self.option.clone());
        }
        args.push(base.as_arg().to_string());
        args.extend(directives.iter().map(ToString::to_string));
        args
    }
}

#[async_trait]
impl TemplateBuilder for CommandTemplateBuilder {
    async fn build(&self, base: TemplateBase, directives: &[TxDirective]) -> Result<String> {
        let args = self.args(&base, directives);
        tracing::debug!(builder = %self.path, ?args, "building template");

        let output = Command::new(&self.path)
            .args(&args)
            .output()
            .await
            .map_err(|e| ExchangeError::TemplateBuilder(format!("{}: {}", self.path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::error!(status = %output.status, ?args, stderr = %stderr.trim_end(), "template builder failed");
            return Err(ExchangeError::TemplateBuilder(format!(
                "{} exited with {}",
                self.path, output.status
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|e| ExchangeError::TemplateBuilder(e.to_string()))?;
        Ok(stdout.trim_end_matches('\n').to_string())
    }
}
