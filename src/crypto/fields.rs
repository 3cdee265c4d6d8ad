//! Declarative field-level object encryption.
//!
//! [`EncryptionEngine::encrypt_object`] walks a nested JSON structure and
//! encrypts only the fields matching a rule, recursing into nested objects
//! and arrays. Each encrypted field gains a sibling `<name>_encrypted: true`
//! flag; unmatched fields pass through unchanged.
//!
//! A per-field encryption failure follows the configured
//! [`FieldFailurePolicy`]: `Degrade` stores that field in cleartext and logs
//! a warning (the rest of the object is still encrypted), `Abort` fails the
//! whole operation.

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::config::FieldFailurePolicy;
use crate::crypto::engine::{EncryptedEnvelope, EncryptionEngine};
use crate::errors::{Error, Result};

/// Suffix of the sibling flag marking an encrypted field.
const ENCRYPTED_FLAG_SUFFIX: &str = "_encrypted";

/// A single field-encryption rule: an exact field name or a `*`-suffixed
/// prefix pattern, with an optional per-rule key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldRule {
    /// Field name ("password") or prefix pattern ("api_*").
    pub field: String,

    /// Key to encrypt matching fields under; the engine default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,
}

impl FieldRule {
    pub fn new(field: impl Into<String>) -> Self {
        Self { field: field.into(), key_id: None }
    }

    pub fn with_key(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    /// Whether this rule matches a field name.
    pub fn matches(&self, name: &str) -> bool {
        match self.field.strip_suffix('*') {
            Some(prefix) => name.starts_with(prefix),
            None => self.field == name,
        }
    }
}

fn matching_rule<'a>(rules: &'a [FieldRule], name: &str) -> Option<&'a FieldRule> {
    rules.iter().find(|rule| rule.matches(name))
}

impl EncryptionEngine {
    /// Selectively encrypt fields of a JSON structure according to `rules`.
    pub async fn encrypt_object(
        &self,
        value: &serde_json::Value,
        rules: &[FieldRule],
    ) -> Result<serde_json::Value> {
        self.encrypt_value(value, rules).await
    }

    fn encrypt_value<'a>(
        &'a self,
        value: &'a serde_json::Value,
        rules: &'a [FieldRule],
    ) -> BoxFuture<'a, Result<serde_json::Value>> {
        async move {
            match value {
                serde_json::Value::Object(map) => {
                    let mut out = serde_json::Map::new();
                    for (name, field_value) in map {
                        // Flags from a previous pass are regenerated, not
                        // copied.
                        if name.ends_with(ENCRYPTED_FLAG_SUFFIX) {
                            continue;
                        }
                        match matching_rule(rules, name) {
                            Some(rule) => {
                                match self.encrypt_field_value(field_value, rule).await {
                                    Ok(envelope) => {
                                        out.insert(
                                            name.clone(),
                                            serde_json::to_value(envelope)?,
                                        );
                                        out.insert(
                                            format!("{}{}", name, ENCRYPTED_FLAG_SUFFIX),
                                            serde_json::Value::Bool(true),
                                        );
                                    }
                                    Err(e) => match self.config().on_field_failure {
                                        FieldFailurePolicy::Degrade => {
                                            tracing::warn!(
                                                field = %name,
                                                error = %e,
                                                "Field encryption failed, storing cleartext"
                                            );
                                            out.insert(name.clone(), field_value.clone());
                                            out.insert(
                                                format!("{}{}", name, ENCRYPTED_FLAG_SUFFIX),
                                                serde_json::Value::Bool(false),
                                            );
                                        }
                                        FieldFailurePolicy::Abort => {
                                            return Err(Error::internal(format!(
                                                "Field '{}' failed to encrypt: {}",
                                                name, e
                                            )));
                                        }
                                    },
                                }
                            }
                            None => {
                                out.insert(
                                    name.clone(),
                                    self.encrypt_value(field_value, rules).await?,
                                );
                            }
                        }
                    }
                    Ok(serde_json::Value::Object(out))
                }
                serde_json::Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.encrypt_value(item, rules).await?);
                    }
                    Ok(serde_json::Value::Array(out))
                }
                scalar => Ok(scalar.clone()),
            }
        }
        .boxed()
    }

    async fn encrypt_field_value(
        &self,
        value: &serde_json::Value,
        rule: &FieldRule,
    ) -> Result<EncryptedEnvelope> {
        let plaintext = serde_json::to_vec(value)?;
        self.encrypt(&plaintext, rule.key_id.as_deref(), None).await
    }

    /// Reverse of [`EncryptionEngine::encrypt_object`]: decrypt every field
    /// carrying a truthy sibling flag, drop the flags, and recurse.
    pub async fn decrypt_object(
        &self,
        value: &serde_json::Value,
        rules: &[FieldRule],
    ) -> Result<serde_json::Value> {
        self.decrypt_value(value, rules).await
    }

    fn decrypt_value<'a>(
        &'a self,
        value: &'a serde_json::Value,
        rules: &'a [FieldRule],
    ) -> BoxFuture<'a, Result<serde_json::Value>> {
        async move {
            match value {
                serde_json::Value::Object(map) => {
                    let mut out = serde_json::Map::new();
                    for (name, field_value) in map {
                        if name.ends_with(ENCRYPTED_FLAG_SUFFIX) {
                            continue;
                        }
                        let flag = map
                            .get(&format!("{}{}", name, ENCRYPTED_FLAG_SUFFIX))
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        if flag && EncryptedEnvelope::is_envelope(field_value) {
                            let envelope: EncryptedEnvelope =
                                serde_json::from_value(field_value.clone())?;
                            let plaintext = self.decrypt(&envelope, None).await?;
                            out.insert(name.clone(), serde_json::from_slice(&plaintext)?);
                        } else {
                            out.insert(
                                name.clone(),
                                self.decrypt_value(field_value, rules).await?,
                            );
                        }
                    }
                    Ok(serde_json::Value::Object(out))
                }
                serde_json::Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(self.decrypt_value(item, rules).await?);
                    }
                    Ok(serde_json::Value::Array(out))
                }
                scalar => Ok(scalar.clone()),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptionConfig;
    use crate::crypto::provider::LocalKeyProvider;
    use crate::events::EventBus;
    use std::sync::Arc;

    async fn engine_with(config: EncryptionConfig) -> Arc<EncryptionEngine> {
        EncryptionEngine::initialize(Arc::new(LocalKeyProvider::new()), config, EventBus::new())
            .await
            .unwrap()
    }

    async fn engine() -> Arc<EncryptionEngine> {
        engine_with(EncryptionConfig::default()).await
    }

    #[test]
    fn rule_matching_exact_and_pattern() {
        let exact = FieldRule::new("password");
        assert!(exact.matches("password"));
        assert!(!exact.matches("password_hash"));

        let pattern = FieldRule::new("api_*");
        assert!(pattern.matches("api_key"));
        assert!(pattern.matches("api_secret"));
        assert!(!pattern.matches("key_api"));
    }

    #[tokio::test]
    async fn selectivity_unmatched_fields_pass_through() {
        let engine = engine().await;
        let input = serde_json::json!({ "username": "a", "password": "b" });

        let out = engine.encrypt_object(&input, &[FieldRule::new("password")]).await.unwrap();

        assert_eq!(out["username"], "a");
        assert_eq!(out["password_encrypted"], true);
        assert_ne!(out["password"], "b");
        assert!(EncryptedEnvelope::is_envelope(&out["password"]));
    }

    #[tokio::test]
    async fn object_round_trip_restores_plaintext() {
        let engine = engine().await;
        let input = serde_json::json!({
            "username": "a",
            "password": "b",
            "profile": { "api_key": "k", "display": "visible" },
            "tokens": [ { "secret": "t1" }, { "secret": "t2" } ]
        });
        let rules =
            vec![FieldRule::new("password"), FieldRule::new("api_*"), FieldRule::new("secret")];

        let encrypted = engine.encrypt_object(&input, &rules).await.unwrap();
        assert_eq!(encrypted["profile"]["display"], "visible");
        assert_eq!(encrypted["profile"]["api_key_encrypted"], true);
        assert_eq!(encrypted["tokens"][0]["secret_encrypted"], true);

        let decrypted = engine.decrypt_object(&encrypted, &rules).await.unwrap();
        assert_eq!(decrypted, input);
    }

    #[tokio::test]
    async fn non_string_values_round_trip() {
        let engine = engine().await;
        let input = serde_json::json!({ "secret": { "nested": [1, 2, 3] }, "plain": 7 });
        let rules = vec![FieldRule::new("secret")];

        let encrypted = engine.encrypt_object(&input, &rules).await.unwrap();
        assert_eq!(encrypted["plain"], 7);

        let decrypted = engine.decrypt_object(&encrypted, &rules).await.unwrap();
        assert_eq!(decrypted["secret"]["nested"], serde_json::json!([1, 2, 3]));
    }

    #[tokio::test]
    async fn per_rule_key_is_honored() {
        let engine = engine().await;
        let input = serde_json::json!({ "card": "4111" });
        let rules = vec![FieldRule::new("card").with_key("pci")];

        let encrypted = engine.encrypt_object(&input, &rules).await.unwrap();
        let envelope: EncryptedEnvelope =
            serde_json::from_value(encrypted["card"].clone()).unwrap();
        assert_eq!(envelope.key_id, "pci");
    }

    /// Provider that refuses one key id, for exercising failure policies.
    struct RejectingProvider {
        inner: LocalKeyProvider,
        rejected: String,
    }

    #[async_trait::async_trait]
    impl crate::crypto::provider::KeyProvider for RejectingProvider {
        async fn current_key(&self, key_id: &str) -> crate::errors::Result<crate::crypto::provider::KeyHandle> {
            if key_id == self.rejected {
                return Err(crate::errors::Error::backend("key unavailable"));
            }
            self.inner.current_key(key_id).await
        }

        async fn key_version(
            &self,
            key_id: &str,
            version: u32,
        ) -> crate::errors::Result<crate::crypto::provider::KeyHandle> {
            self.inner.key_version(key_id, version).await
        }

        async fn rotate(&self, key_id: &str) -> crate::errors::Result<u32> {
            self.inner.rotate(key_id).await
        }

        async fn purge(&self) {
            self.inner.purge().await;
        }
    }

    async fn engine_rejecting(key: &str, config: EncryptionConfig) -> Arc<EncryptionEngine> {
        let provider =
            RejectingProvider { inner: LocalKeyProvider::new(), rejected: key.to_string() };
        EncryptionEngine::initialize(Arc::new(provider), config, EventBus::new()).await.unwrap()
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn degrade_policy_keeps_cleartext_on_failure() {
        let engine = engine_rejecting("pci", EncryptionConfig::default()).await;
        let input = serde_json::json!({ "card": "4111", "password": "b" });
        let rules = vec![FieldRule::new("card").with_key("pci"), FieldRule::new("password")];

        let out = engine.encrypt_object(&input, &rules).await.unwrap();

        // The failing field degrades to cleartext with a false flag; the
        // rest of the object still encrypts, and the degrade is logged.
        assert_eq!(out["card"], "4111");
        assert_eq!(out["card_encrypted"], false);
        assert_eq!(out["password_encrypted"], true);
        assert!(logs_contain("Field encryption failed"));
    }

    #[tokio::test]
    async fn abort_policy_fails_whole_object() {
        let mut config = EncryptionConfig::default();
        config.on_field_failure = crate::config::FieldFailurePolicy::Abort;
        let engine = engine_rejecting("pci", config).await;

        let input = serde_json::json!({ "card": "4111" });
        let rules = vec![FieldRule::new("card").with_key("pci")];
        assert!(engine.encrypt_object(&input, &rules).await.is_err());
    }

    #[tokio::test]
    async fn stale_flags_are_not_copied() {
        let engine = engine().await;
        // Input already carries a flag from some earlier pass.
        let input = serde_json::json!({ "password": "b", "password_encrypted": false });
        let out = engine.encrypt_object(&input, &[FieldRule::new("password")]).await.unwrap();
        assert_eq!(out["password_encrypted"], true);
    }
}
