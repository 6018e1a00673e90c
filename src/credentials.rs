//! Credential lookup
//!
//! Clients never read the environment themselves; they are handed a
//! Credential resolved from a logical name ("dbt", "fivetran").

use std::collections::HashMap;
use std::fmt;

use crate::error::{JobError, Result};

/// Resolved secret for one API
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    Token(String),
    Basic { user: String, secret: String },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Token(_) => f.write_str("Token(***)"),
            Credential::Basic { user, .. } => write!(f, "Basic({}, ***)", user),
        }
    }
}

impl Credential {
    pub fn into_token(self) -> Result<String> {
        match self {
            Credential::Token(token) => Ok(token),
            Credential::Basic { .. } => Err(JobError::CredentialsUnavailable(
                "expected a token, found a key/secret pair".to_string(),
            )),
        }
    }

    pub fn into_basic(self) -> Result<(String, String)> {
        match self {
            Credential::Basic { user, secret } => Ok((user, secret)),
            Credential::Token(_) => Err(JobError::CredentialsUnavailable(
                "expected a key/secret pair, found a token".to_string(),
            )),
        }
    }
}

/// Synchronous lookup of a credential by logical name
pub trait CredentialSource: Send + Sync {
    fn lookup(&self, name: &str) -> Result<Credential>;
}

/// Where a logical name's secret lives in the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvBinding {
    Token { var: String },
    Basic { user_var: String, secret_var: String },
}

type EnvReader = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads credentials from environment variables
pub struct EnvCredentialSource {
    bindings: HashMap<String, EnvBinding>,
    read: EnvReader,
}

impl EnvCredentialSource {
    /// No bindings; add them with `bind`.
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            read: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// Standard bindings: `dbt` → DBT_TOKEN, `fivetran` → FIVETRAN_API_KEY / FIVETRAN_API_SECRET.
    pub fn standard() -> Self {
        Self::new()
            .bind("dbt", EnvBinding::Token { var: "DBT_TOKEN".to_string() })
            .bind(
                "fivetran",
                EnvBinding::Basic {
                    user_var: "FIVETRAN_API_KEY".to_string(),
                    secret_var: "FIVETRAN_API_SECRET".to_string(),
                },
            )
    }

    pub fn bind(mut self, name: impl Into<String>, binding: EnvBinding) -> Self {
        self.bindings.insert(name.into(), binding);
        self
    }

    /// Replace the environment reader.
    pub fn with_reader<F>(mut self, read: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.read = Box::new(read);
        self
    }

    fn var(&self, key: &str) -> Result<String> {
        (self.read)(key)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| JobError::CredentialsUnavailable(format!("environment variable {} not set", key)))
    }
}

impl Default for EnvCredentialSource {
    fn default() -> Self {
        Self::standard()
    }
}

impl CredentialSource for EnvCredentialSource {
    fn lookup(&self, name: &str) -> Result<Credential> {
        let binding = self
            .bindings
            .get(name)
            .ok_or_else(|| JobError::CredentialsUnavailable(format!("no credential binding for {}", name)))?;

        match binding {
            EnvBinding::Token { var } => Ok(Credential::Token(self.var(var)?)),
            EnvBinding::Basic { user_var, secret_var } => Ok(Credential::Basic {
                user: self.var(user_var)?,
                secret: self.var(secret_var)?,
            }),
        }
    }
}
