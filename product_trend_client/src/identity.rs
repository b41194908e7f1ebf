//! Провайдер идентификации: регистрация, вход и выдача ID токена.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::AppConfig;
use crate::errors::{ClientError, Result};

/// Пользователь, подтверждённый провайдером.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub id_token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocialProvider {
    Google,
}

impl SocialProvider {
    pub fn provider_id(&self) -> &'static str {
        match self {
            SocialProvider::Google => "google.com",
        }
    }
}

/// Внешний провайдер. Ошибки возвращаются как `ClientError::Auth` с текстом провайдера.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Вход через внешний аккаунт по его токену.
    async fn sign_in_with_provider(
        &self,
        provider: SocialProvider,
        credential: &str,
    ) -> Result<Identity>;

    async fn id_token(&self, identity: &Identity) -> Result<String>;

    async fn sign_out(&self) -> Result<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountResponse {
    id_token: String,
    #[serde(default)]
    email: String,
    local_id: String,
    display_name: Option<String>,
}

/// REST провайдер в формате identity toolkit (`accounts:signInWithPassword` и т.д.).
#[derive(Clone)]
pub struct RestIdentityProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestIdentityProvider {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ClientError::Unknown(format!("Не удалось создать HTTP клиент: {}", e)))?;

        Ok(RestIdentityProvider {
            client,
            base_url: config.identity_url.trim_end_matches('/').to_string(),
            api_key: config.identity_api_key.clone(),
        })
    }

    async fn call(&self, method: &str, payload: Value) -> Result<Identity> {
        if self.api_key.is_empty() {
            return Err(ClientError::Validation(
                "IDENTITY_API_KEY не задан".to_string(),
            ));
        }

        let url = format!("{}/accounts:{}", self.base_url, method);
        tracing::debug!("Запрос к провайдеру идентификации: {}", url);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let body: Value = response.json().await.unwrap_or(Value::Null);
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Authentication failed")
                .to_string();
            return Err(ClientError::Auth(message));
        }

        let account: AccountResponse = response.json().await?;
        Ok(Identity {
            uid: account.local_id,
            email: account.email,
            display_name: account.display_name,
            id_token: account.id_token,
        })
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        self.call(
            "signUp",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.call(
            "signInWithPassword",
            json!({ "email": email, "password": password, "returnSecureToken": true }),
        )
        .await
    }

    async fn sign_in_with_provider(
        &self,
        provider: SocialProvider,
        credential: &str,
    ) -> Result<Identity> {
        let post_body = format!(
            "id_token={}&providerId={}",
            urlencoding::encode(credential),
            provider.provider_id()
        );
        self.call(
            "signInWithIdp",
            json!({
                "postBody": post_body,
                "requestUri": "http://localhost",
                "returnSecureToken": true,
                "returnIdpCredential": true
            }),
        )
        .await
    }

    async fn id_token(&self, identity: &Identity) -> Result<String> {
        Ok(identity.id_token.clone())
    }

    async fn sign_out(&self) -> Result<()> {
        // REST токены не отзываются на стороне провайдера
        Ok(())
    }
}
