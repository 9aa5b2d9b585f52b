use std::collections::HashMap;
use std::{env, fs};

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;

use crate::config::services::{GenericSourceValue, ProviderConfig};
use crate::utils::constants::{DEFAULT_EXPIRES_IN_SECS, DEFAULT_GRANT_TYPE};

/// Everything needed to ask the token endpoint for a token. Built once per provider.
#[derive(Debug, Clone)]
pub struct TokenRequestSpec {
    pub token_url: String,
    pub grant_type: String,
    pub scope: Option<String>,
    pub audience: Option<String>,
    pub headers: HashMap<String, GenericSourceValue>,
    pub credentials: Option<ClientCredentials>,
    /// lifetime assumed when the response has no `expires_in`
    pub default_expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: GenericSourceValue,
    pub client_secret: GenericSourceValue,
}

impl TokenRequestSpec {
    pub fn new(token_url: impl Into<String>) -> Self {
        Self {
            token_url: token_url.into(),
            grant_type: DEFAULT_GRANT_TYPE.to_owned(),
            scope: None,
            audience: None,
            headers: HashMap::new(),
            credentials: None,
            default_expires_in: DEFAULT_EXPIRES_IN_SECS,
        }
    }

    pub fn from_config(cfg: &ProviderConfig) -> Self {
        let credentials = match (&cfg.client_id, &cfg.client_secret) {
            (Some(client_id), Some(client_secret)) => Some(ClientCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
            }),
            _ => None,
        };

        Self {
            token_url: cfg.token_url.clone(),
            grant_type: cfg.grant_type.clone().unwrap_or_else(|| DEFAULT_GRANT_TYPE.to_owned()),
            scope: cfg.scope.clone(),
            audience: cfg.audience.clone(),
            headers: cfg.headers.clone().unwrap_or_default(),
            credentials,
            default_expires_in: cfg.default_expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: GenericSourceValue) -> Self {
        self.headers.insert(name.into(), value);
        self
    }

    /// Path of the token endpoint, used to keep bearer tokens off token requests.
    pub fn token_path(&self) -> Option<String> {
        Url::parse(&self.token_url).ok().map(|url| url.path().to_owned())
    }

    pub fn form_params(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("grant_type", self.grant_type.clone())];
        if let Some(scope) = &self.scope {
            form.push(("scope", scope.clone()));
        }
        if let Some(audience) = &self.audience {
            form.push(("audience", audience.clone()));
        }
        form
    }

    /// Resolves every configured header, plus basic auth from the client credentials.
    pub fn resolve_headers(&self) -> Result<Vec<(String, String)>> {
        let mut headers = Vec::with_capacity(self.headers.len() + 1);
        if let Some(credentials) = &self.credentials {
            let client_id = prepare_generic_source_value(&credentials.client_id)?;
            let client_secret = prepare_generic_source_value(&credentials.client_secret)?;
            let encoded = STANDARD.encode(format!("{}:{}", client_id, client_secret));
            headers.push((http::header::AUTHORIZATION.to_string(), format!("Basic {}", encoded)));
        }
        for (name, value) in &self.headers {
            let value = prepare_generic_source_value(value).map_err(|e| anyhow!("header '{}': {}", name, e))?;
            headers.push((name.to_owned(), value));
        }
        Ok(headers)
    }
}

pub fn prepare_generic_source_value(value: &GenericSourceValue) -> Result<String> {
    match value {
        GenericSourceValue::Literal { value } => Ok(value.to_owned()),
        GenericSourceValue::FromEnv { from_env } => {
            env::var(from_env).map_err(|err| anyhow!("env '{}': {}", from_env, err))
        }
        GenericSourceValue::FromFile { path } => fs::read_to_string(path)
            .map_err(|err| anyhow!("file '{}': {}", path, err))
            .map(|res| res.trim().to_string()),
    }
}
