use serde_json::Value;

use crate::{Result, client::OpenclawClient};

/// One model known to the runtime.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub key: String,
    pub provider_key: String,
}

/// Auth posture for one provider, from `models.status.json`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAuth {
    pub provider: String,
    pub authenticated: bool,
    pub oauth: bool,
}

/// Typed wrapper over the runtime's model commands. Output shapes are
/// tolerant; unknown entries are skipped, never fatal.
pub struct ModelCatalog<'a> {
    client: &'a OpenclawClient,
}

impl<'a> ModelCatalog<'a> {
    pub fn new(client: &'a OpenclawClient) -> Self {
        Self { client }
    }

    /// `bin models.list.all.json` -> `{models:[{key}]}`.
    pub async fn list(&self) -> Result<Vec<ModelInfo>> {
        let raw = self.client.models_list().await?;
        Ok(parse_model_list(&raw))
    }

    /// `bin models.status.json` -> per-provider auth/oauth flags.
    pub async fn status(&self) -> Result<Vec<ProviderAuth>> {
        let raw = self.client.models_status().await?;
        Ok(parse_model_status(&raw))
    }
}

pub fn parse_model_list(raw: &Value) -> Vec<ModelInfo> {
    raw.get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|entry| {
                    let key = entry
                        .get("key")
                        .and_then(Value::as_str)
                        .map(str::trim)
                        .filter(|k| !k.is_empty())?;
                    Some(ModelInfo {
                        key: key.to_string(),
                        provider_key: clawctl_types::provider_key(key),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

pub fn parse_model_status(raw: &Value) -> Vec<ProviderAuth> {
    let auth = raw.get("auth").and_then(Value::as_object);
    let oauth = raw.get("oauth").and_then(Value::as_object);

    let mut providers: Vec<&String> = auth
        .iter()
        .flat_map(|m| m.keys())
        .chain(oauth.iter().flat_map(|m| m.keys()))
        .collect();
    providers.sort();
    providers.dedup();

    let truthy = |map: Option<&serde_json::Map<String, Value>>, key: &str| {
        map.and_then(|m| m.get(key)).is_some_and(|v| match v {
            Value::Bool(b) => *b,
            Value::Object(o) => o
                .get("ok")
                .or_else(|| o.get("authenticated"))
                .and_then(Value::as_bool)
                .unwrap_or(true),
            Value::String(s) => !s.is_empty(),
            _ => false,
        })
    };

    providers
        .into_iter()
        .map(|provider| ProviderAuth {
            provider: provider.clone(),
            authenticated: truthy(auth, provider),
            oauth: truthy(oauth, provider),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_model_list() {
        let raw = json!({"models": [
            {"key": "anthropic/claude-sonnet-4"},
            {"key": "  "},
            {"name": "no-key"},
            {"key": "gpt-4o"},
        ]});

        let models = parse_model_list(&raw);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].key, "anthropic/claude-sonnet-4");
        assert_eq!(models[0].provider_key, "anthropic");
        assert_eq!(models[1].provider_key, "openai");
    }

    #[test]
    fn test_parse_model_list_tolerates_shape_drift() {
        assert!(parse_model_list(&json!({})).is_empty());
        assert!(parse_model_list(&json!({"models": "nope"})).is_empty());
    }

    #[test]
    fn test_parse_model_status() {
        let raw = json!({
            "auth": {"anthropic": true, "openai": false},
            "oauth": {"anthropic": {"ok": true}, "google": true},
        });

        let status = parse_model_status(&raw);
        let get = |p: &str| status.iter().find(|s| s.provider == p).unwrap();

        assert_eq!(status.len(), 3);
        assert!(get("anthropic").authenticated);
        assert!(get("anthropic").oauth);
        assert!(!get("openai").authenticated);
        assert!(get("google").oauth);
        assert!(!get("google").authenticated);
    }
}
