use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;

use crate::errors::{ClientError, Result};
use crate::holders::TokenStore;
use crate::identity::{Identity, IdentityProvider, SocialProvider};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Сессия пользователя поверх внешнего провайдера идентификации.
///
/// Создаётся явно через `init`, передаётся компонентам, которым она нужна,
/// и закрывается через `teardown`. Сессия не истекает сама: время с момента
/// входа используется только для отображения.
pub struct Session {
    provider: Arc<dyn IdentityProvider>,
    tokens: Arc<dyn TokenStore>,
    state: SessionState,
    identity: Option<Identity>,
    login_time: Option<DateTime<Utc>>,
}

enum Credentials<'a> {
    SignUp { email: &'a str, password: &'a str },
    SignIn { email: &'a str, password: &'a str },
    Social { provider: SocialProvider, credential: &'a str },
}

impl Session {
    pub fn init(provider: Arc<dyn IdentityProvider>, tokens: Arc<dyn TokenStore>) -> Self {
        Session {
            provider,
            tokens,
            state: SessionState::Anonymous,
            identity: None,
            login_time: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn login_time(&self) -> Option<DateTime<Utc>> {
        self.login_time
    }

    pub async fn sign_up(&mut self, email: &str, password: &str) -> Result<&Identity> {
        validate_credentials(email, password)?;
        self.authenticate(Credentials::SignUp { email, password }).await
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<&Identity> {
        validate_credentials(email, password)?;
        self.authenticate(Credentials::SignIn { email, password }).await
    }

    pub async fn sign_in_with_provider(
        &mut self,
        provider: SocialProvider,
        credential: &str,
    ) -> Result<&Identity> {
        if credential.trim().is_empty() {
            return Err(ClientError::Validation(
                "Provider credential is required".to_string(),
            ));
        }
        self.authenticate(Credentials::Social { provider, credential }).await
    }

    async fn authenticate(&mut self, credentials: Credentials<'_>) -> Result<&Identity> {
        match self.state {
            SessionState::Authenticated => {
                return Err(ClientError::Validation(
                    "Sign out before signing in again".to_string(),
                ));
            }
            // прошлая попытка была прервана до ответа провайдера
            SessionState::Authenticating => {
                tracing::warn!("Предыдущий вход не завершён, начинаем заново");
            }
            SessionState::Anonymous => {}
        }

        self.state = SessionState::Authenticating;
        let provider = self.provider.clone();
        let result = match credentials {
            Credentials::SignUp { email, password } => provider.sign_up(email, password).await,
            Credentials::SignIn { email, password } => provider.sign_in(email, password).await,
            Credentials::Social { provider: social, credential } => {
                provider.sign_in_with_provider(social, credential).await
            }
        };

        let identity = match result {
            Ok(identity) => identity,
            Err(e) => {
                self.state = SessionState::Anonymous;
                tracing::warn!("Вход не выполнен: {}", e);
                return Err(e);
            }
        };

        // Без токена пользователь остаётся в системе, но запросы к API будут без авторизации
        match provider.id_token(&identity).await {
            Ok(token) => {
                if let Err(e) = self.tokens.save(&token) {
                    tracing::error!("Не удалось сохранить токен: {}", e);
                }
            }
            Err(e) => tracing::error!("Не удалось получить ID токен: {}", e),
        }

        tracing::info!("Пользователь {} вошёл в систему", identity.email);
        self.login_time = Some(Utc::now());
        self.state = SessionState::Authenticated;
        Ok(self.identity.insert(identity))
    }

    /// Выход: сбрасывает время входа и удаляет сохранённый токен.
    pub async fn teardown(&mut self) -> Result<()> {
        if let Err(e) = self.provider.sign_out().await {
            tracing::warn!("Провайдер вернул ошибку при выходе: {}", e);
        }
        self.tokens.clear()?;
        if let Some(identity) = self.identity.take() {
            tracing::info!("Пользователь {} вышел из системы", identity.email);
        }
        self.login_time = None;
        self.state = SessionState::Anonymous;
        Ok(())
    }

    /// Миллисекунды с момента входа, 0 без активной сессии.
    pub fn elapsed_session_time(&self) -> u64 {
        self.elapsed_at(Utc::now())
    }

    pub fn elapsed_at(&self, now: DateTime<Utc>) -> u64 {
        match (self.state, self.login_time) {
            (SessionState::Authenticated, Some(login)) => {
                (now - login).num_milliseconds().max(0) as u64
            }
            _ => 0,
        }
    }
}

/// "2h 5m" для отображения длительности сессии.
pub fn format_elapsed(ms: u64) -> String {
    let hours = ms / (1000 * 60 * 60);
    let minutes = (ms % (1000 * 60 * 60)) / (1000 * 60);
    format!("{}h {}m", hours, minutes)
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    let email_regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$")?;
    if !email_regex.is_match(email.trim()) {
        return Err(ClientError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
