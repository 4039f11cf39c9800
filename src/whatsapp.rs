use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::AppConfig,
    models::Protocolo,
    utils::time::{format_br_date, local_date},
};

pub const NOT_APPLICABLE: &str = "Não se aplica";

/// Body posted to the WhatsApp gateway for one protocolo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhatsAppMessage {
    pub inscricao: String,
    pub processo: String,
    pub assunto: String,
    pub analise: String,
    pub nome: String,
    pub cpf: String,
    pub whatsapp: String,
    pub data: String,
}

impl WhatsAppMessage {
    pub fn from_protocolo(protocolo: &Protocolo) -> Self {
        Self {
            inscricao: or_not_applicable(&protocolo.num_inscricao),
            processo: protocolo.processo.clone(),
            assunto: protocolo.assunto.clone(),
            analise: or_not_applicable(&protocolo.anos_analise),
            nome: protocolo.nome.clone(),
            cpf: protocolo.cpf.replace(['.', '-'], ""),
            whatsapp: protocolo.telefone.replace('-', ""),
            data: format_br_date(local_date(protocolo.created_at)),
        }
    }
}

fn or_not_applicable(value: &str) -> String {
    if value.trim().is_empty() {
        NOT_APPLICABLE.to_string()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("whatsapp gateway is not configured")]
    NotConfigured,
    #[error("whatsapp gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("whatsapp gateway answered with status {status}")]
    Rejected { status: StatusCode, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn send(&self, message: &WhatsAppMessage) -> Result<(), NotifyError>;
}

pub struct WhatsAppGateway {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl WhatsAppGateway {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build whatsapp http client")?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl Notifier for WhatsAppGateway {
    async fn send(&self, message: &WhatsAppMessage) -> Result<(), NotifyError> {
        let mut request = self
            .client
            .post(&self.url)
            .header(header::ACCEPT, "application/json")
            .json(message);

        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected { status, body });
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(processo = %message.processo, %status, %body, "whatsapp gateway accepted message");
        Ok(())
    }
}

/// Stands in for the gateway when no URL is configured.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(&self, message: &WhatsAppMessage) -> Result<(), NotifyError> {
        tracing::warn!(processo = %message.processo, "whatsapp gateway not configured; skipping");
        Err(NotifyError::NotConfigured)
    }
}

pub fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    match &config.whatsapp_api_url {
        Some(url) => Ok(Arc::new(WhatsAppGateway::new(
            url.clone(),
            config.whatsapp_api_key.clone(),
            Duration::from_secs(config.whatsapp_timeout_seconds.max(1)),
        )?)),
        None => Ok(Arc::new(DisabledNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn protocolo() -> Protocolo {
        let created_at = NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        Protocolo {
            id: 7,
            num_inscricao: String::new(),
            num_processo: 12,
            processo: "6/12/24".into(),
            assunto: "ISENÇÃO DE IPTU".into(),
            anos_analise: "2022, 2023".into(),
            nome: "MARIA DA SILVA".into(),
            cpf: "123.456.789-00".into(),
            cnpj: String::new(),
            telefone: "5521-987654321".into(),
            enviar_whatsapp: true,
            whatsapp_enviado: false,
            creator_id: 1,
            editor_id: None,
            created_at,
            updated_at: created_at,
            deleted_at: None,
        }
    }

    #[test]
    fn message_strips_document_punctuation() {
        let message = WhatsAppMessage::from_protocolo(&protocolo());
        assert_eq!(message.cpf, "12345678900");
        assert_eq!(message.whatsapp, "5521987654321");
        assert_eq!(message.processo, "6/12/24");
        assert_eq!(message.analise, "2022, 2023");
        assert_eq!(message.data, "10/06/2024");
    }

    #[test]
    fn empty_fields_become_not_applicable() {
        let mut record = protocolo();
        record.anos_analise = "  ".into();
        let message = WhatsAppMessage::from_protocolo(&record);
        assert_eq!(message.inscricao, NOT_APPLICABLE);
        assert_eq!(message.analise, NOT_APPLICABLE);
    }

    #[test]
    fn serializes_expected_keys() {
        let value = serde_json::to_value(WhatsAppMessage::from_protocolo(&protocolo())).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            ["analise", "assunto", "cpf", "data", "inscricao", "nome", "processo", "whatsapp"]
        );
    }
}
