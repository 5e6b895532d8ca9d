//! Secrets-reference resolver (§4.2).
//!
//! Accepts a string and returns a secret or fails with a descriptive error.
//! Never accepts plaintext secrets as configuration (§9 "Secrets coupling"):
//! a bare value with no recognized prefix is still returned, but a warning
//! is emitted so misconfiguration is visible in logs.

mod error;

pub use error::{Result, SecretError};

use tracing::warn;

/// A parsed secret reference, one of the six URI-style forms in §4.2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef {
    Env { name: String },
    File { path: String },
    OnePassword { vault: String, item: String, field: String },
    AwsSecretsManager {
        region: Option<String>,
        id: String,
        json_key: Option<String>,
    },
    Vault { path: String, field: Option<String> },
    Sops { path: String, json_path: Option<String> },
    Bare(String),
}

impl SecretRef {
    /// Parse a reference string. Never fails: an unrecognized prefix (or no
    /// prefix at all) becomes [`SecretRef::Bare`].
    #[must_use]
    pub fn parse(reference: &str) -> Self {
        if let Some(name) = reference.strip_prefix("env:") {
            return Self::Env { name: name.to_string() };
        }
        if let Some(path) = reference.strip_prefix("file:") {
            return Self::File { path: path.to_string() };
        }
        if let Some(rest) = reference.strip_prefix("op://") {
            let parts: Vec<&str> = rest.splitn(3, '/').collect();
            if let [vault, item, field] = parts[..] {
                return Self::OnePassword {
                    vault: vault.to_string(),
                    item: item.to_string(),
                    field: field.to_string(),
                };
            }
        }
        if let Some(rest) = reference.strip_prefix("aws-sm://") {
            let (id_part, json_key) = match rest.split_once('#') {
                Some((id, key)) => (id, Some(key.to_string())),
                None => (rest, None),
            };
            let (region, id) = match id_part.rsplit_once('/') {
                Some((region, id)) => (Some(region.to_string()), id.to_string()),
                None => (None, id_part.to_string()),
            };
            return Self::AwsSecretsManager { region, id, json_key };
        }
        if let Some(rest) = reference.strip_prefix("vault://") {
            let (path, field) = match rest.split_once('#') {
                Some((p, f)) => (p.to_string(), Some(f.to_string())),
                None => (rest.to_string(), None),
            };
            return Self::Vault { path, field };
        }
        if let Some(rest) = reference.strip_prefix("sops://") {
            let (path, json_path) = match rest.split_once('#') {
                Some((p, k)) => (p.to_string(), Some(k.to_string())),
                None => (rest.to_string(), None),
            };
            return Self::Sops { path, json_path };
        }
        Self::Bare(reference.to_string())
    }

    /// Resolve this reference to a secret string. The resolved value is
    /// never logged.
    pub async fn resolve(&self) -> Result<String> {
        match self {
            Self::Env { name } => {
                std::env::var(name).map_err(|_| SecretError::EnvNotSet(name.clone()))
            }
            Self::File { path } => std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|source| SecretError::FileRead {
                    path: path.clone(),
                    source,
                }),
            Self::OnePassword { vault, item, field } => {
                resolve_one_password(vault, item, field).await
            }
            Self::AwsSecretsManager { region, id, json_key } => {
                resolve_aws_secrets_manager(region.as_deref(), id, json_key.as_deref()).await
            }
            Self::Vault { path, field } => resolve_vault(path, field.as_deref()).await,
            Self::Sops { path, json_path } => resolve_sops(path, json_path.as_deref()).await,
            Self::Bare(value) => {
                warn!("secret reference has no recognized prefix; treating as plaintext");
                Ok(value.clone())
            }
        }
    }
}

/// Convenience wrapper: parse and resolve in one call.
pub async fn resolve(reference: &str) -> Result<String> {
    SecretRef::parse(reference).resolve().await
}

async fn resolve_one_password(vault: &str, item: &str, field: &str) -> Result<String> {
    let reference = format!("op://{vault}/{item}/{field}");
    let output = tokio::process::Command::new("op")
        .args(["read", &reference])
        .output()
        .await
        .map_err(|e| SecretError::OnePassword(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SecretError::OnePassword(stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

#[cfg(feature = "aws-sm")]
async fn resolve_aws_secrets_manager(
    region: Option<&str>,
    id: &str,
    json_key: Option<&str>,
) -> Result<String> {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_sdk_secretsmanager::config::Region::new(region.to_string()));
    }
    let config = loader.load().await;
    let client = aws_sdk_secretsmanager::Client::new(&config);

    let response = client
        .get_secret_value()
        .secret_id(id)
        .send()
        .await
        .map_err(|e| SecretError::AwsSecretsManager(e.to_string()))?;

    let raw = response
        .secret_string()
        .ok_or_else(|| SecretError::AwsSecretsManager("secret has no string value".to_string()))?;

    extract_json_key(raw, json_key, "aws-sm")
}

#[cfg(not(feature = "aws-sm"))]
#[allow(clippy::unused_async)]
async fn resolve_aws_secrets_manager(
    _region: Option<&str>,
    _id: &str,
    _json_key: Option<&str>,
) -> Result<String> {
    Err(SecretError::BackendDisabled { backend: "aws-sm" })
}

#[cfg(feature = "vault")]
async fn resolve_vault(path: &str, field: Option<&str>) -> Result<String> {
    let addr = std::env::var("VAULT_ADDR")
        .map_err(|_| SecretError::Vault("VAULT_ADDR is not set".to_string()))?;
    let token = std::env::var("VAULT_TOKEN")
        .map_err(|_| SecretError::Vault("VAULT_TOKEN is not set".to_string()))?;

    let url = format!("{}/v1/secret/data/{}", addr.trim_end_matches('/'), path);
    let client = reqwest::Client::new();
    let response = client
        .get(&url)
        .header("X-Vault-Token", token)
        .send()
        .await
        .map_err(|e| SecretError::Vault(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SecretError::Vault(format!("HTTP {}", response.status())));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| SecretError::Vault(e.to_string()))?;

    let data = body
        .pointer("/data/data")
        .ok_or_else(|| SecretError::Vault("missing data.data in KV v2 response".to_string()))?;

    extract_json_key(&data.to_string(), field, "vault")
}

#[cfg(not(feature = "vault"))]
#[allow(clippy::unused_async)]
async fn resolve_vault(_path: &str, _field: Option<&str>) -> Result<String> {
    Err(SecretError::BackendDisabled { backend: "vault" })
}

async fn resolve_sops(path: &str, json_path: Option<&str>) -> Result<String> {
    let output = tokio::process::Command::new("sops")
        .args(["-d", path])
        .output()
        .await
        .map_err(|e| SecretError::Sops(e.to_string()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SecretError::Sops(stderr.trim().to_string()));
    }

    let raw = String::from_utf8_lossy(&output.stdout).to_string();
    extract_json_key(&raw, json_path, "sops")
}

/// Extract a dotted JSON key (e.g. `a.b.c`) from a JSON payload, or return
/// the raw payload trimmed if no key was requested.
fn extract_json_key(raw: &str, key: Option<&str>, backend: &'static str) -> Result<String> {
    let Some(key) = key else {
        return Ok(raw.trim().to_string());
    };

    let value: serde_json::Value = serde_json::from_str(raw)
        .map_err(|e| SecretError::MissingJsonField { backend, field: e.to_string() })?;

    let mut current = &value;
    for segment in key.split('.') {
        current = current
            .get(segment)
            .ok_or_else(|| SecretError::MissingJsonField { backend, field: key.to_string() })?;
    }

    match current {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_reference() {
        assert_eq!(
            SecretRef::parse("env:API_KEY"),
            SecretRef::Env { name: "API_KEY".to_string() }
        );
    }

    #[test]
    fn parses_file_reference() {
        assert_eq!(
            SecretRef::parse("file:/etc/secret"),
            SecretRef::File { path: "/etc/secret".to_string() }
        );
    }

    #[test]
    fn parses_one_password_reference() {
        assert_eq!(
            SecretRef::parse("op://Prod/greynoise/api_key"),
            SecretRef::OnePassword {
                vault: "Prod".to_string(),
                item: "greynoise".to_string(),
                field: "api_key".to_string(),
            }
        );
    }

    #[test]
    fn parses_aws_sm_reference_with_region_and_key() {
        assert_eq!(
            SecretRef::parse("aws-sm://us-east-1/cascade/greynoise#api_key"),
            SecretRef::AwsSecretsManager {
                region: Some("us-east-1".to_string()),
                id: "cascade/greynoise".to_string(),
                json_key: Some("api_key".to_string()),
            }
        );
    }

    #[test]
    fn parses_aws_sm_reference_without_region() {
        assert_eq!(
            SecretRef::parse("aws-sm://cascade-greynoise"),
            SecretRef::AwsSecretsManager {
                region: None,
                id: "cascade-greynoise".to_string(),
                json_key: None,
            }
        );
    }

    #[test]
    fn parses_vault_reference() {
        assert_eq!(
            SecretRef::parse("vault://secret/cascade#api_key"),
            SecretRef::Vault {
                path: "secret/cascade".to_string(),
                field: Some("api_key".to_string()),
            }
        );
    }

    #[test]
    fn parses_sops_reference() {
        assert_eq!(
            SecretRef::parse("sops://secrets.enc.json#greynoise.api_key"),
            SecretRef::Sops {
                path: "secrets.enc.json".to_string(),
                json_path: Some("greynoise.api_key".to_string()),
            }
        );
    }

    #[test]
    fn bare_value_passes_through() {
        assert_eq!(
            SecretRef::parse("plaintext-value"),
            SecretRef::Bare("plaintext-value".to_string())
        );
    }

    #[tokio::test]
    async fn resolves_env_var() {
        std::env::set_var("CASCADE_TEST_SECRET", "hunter2");
        let value = resolve("env:CASCADE_TEST_SECRET").await.unwrap();
        assert_eq!(value, "hunter2");
        std::env::remove_var("CASCADE_TEST_SECRET");
    }

    #[tokio::test]
    async fn missing_env_var_errors() {
        std::env::remove_var("CASCADE_TEST_MISSING");
        let err = resolve("env:CASCADE_TEST_MISSING").await.unwrap_err();
        assert!(matches!(err, SecretError::EnvNotSet(_)));
    }

    #[tokio::test]
    async fn resolves_file_contents_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.txt");
        std::fs::write(&path, "s3cr3t\n").unwrap();
        let value = resolve(&format!("file:{}", path.display())).await.unwrap();
        assert_eq!(value, "s3cr3t");
    }

    #[tokio::test]
    async fn bare_value_resolves_as_is() {
        let value = resolve("not-a-reference").await.unwrap();
        assert_eq!(value, "not-a-reference");
    }
}
