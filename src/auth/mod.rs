//! Request authentication.
//!
//! Each variant injects headers into an outgoing request. Variants missing
//! their credentials are no-ops, as is an unrecognized `type`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::http::request::{Headers, merge_headers, set_header};

const AUTHORIZATION: &str = "Authorization";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Auth {
    Bearer {
        #[serde(default)]
        token: String,
    },
    #[serde(rename = "apikey")]
    ApiKey {
        #[serde(default)]
        key: String,
        #[serde(default)]
        value: String,
    },
    Basic {
        #[serde(default)]
        username: String,
        #[serde(default)]
        password: String,
    },
    Custom {
        #[serde(default)]
        headers: Headers,
    },
    #[serde(other)]
    Unknown,
}

impl Auth {
    pub fn bearer(token: impl Into<String>) -> Self {
        Auth::Bearer {
            token: token.into(),
        }
    }

    pub fn api_key(key: impl Into<String>, value: impl Into<String>) -> Self {
        Auth::ApiKey {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Auth::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Writes this credential into `headers`, overwriting existing values
    /// with the same name.
    pub fn apply(&self, headers: &mut Headers) {
        match self {
            Auth::Bearer { token } => {
                if !token.is_empty() {
                    set_header(headers, AUTHORIZATION, format!("Bearer {token}"));
                }
            }
            Auth::ApiKey { key, value } => {
                if !key.is_empty() && !value.is_empty() {
                    set_header(headers, key.clone(), value.clone());
                }
            }
            Auth::Basic { username, password } => {
                if !username.is_empty() && !password.is_empty() {
                    let credentials = STANDARD.encode(format!("{username}:{password}"));
                    set_header(headers, AUTHORIZATION, format!("Basic {credentials}"));
                }
            }
            Auth::Custom { headers: extra } => {
                merge_headers(headers, extra);
            }
            Auth::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn applied(auth: &Auth) -> Headers {
        let mut headers = Headers::new();
        auth.apply(&mut headers);
        headers
    }

    #[test]
    fn bearer_sets_authorization() {
        let headers = applied(&Auth::bearer("abc"));
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer abc");
    }

    #[test]
    fn bearer_without_token_is_noop() {
        assert!(applied(&Auth::bearer("")).is_empty());
    }

    #[test]
    fn api_key_uses_caller_header_name() {
        let headers = applied(&Auth::api_key("X-Api-Key", "secret"));
        assert_eq!(headers.get("X-Api-Key").unwrap(), "secret");
    }

    #[test]
    fn basic_encodes_credentials() {
        let headers = applied(&Auth::basic("user", "pass"));
        assert_eq!(headers.get("Authorization").unwrap(), "Basic dXNlcjpwYXNz");
    }

    #[test]
    fn custom_merges_headers() {
        let mut extra = Headers::new();
        extra.insert("X-One".into(), "1".into());
        extra.insert("X-Two".into(), "2".into());
        let headers = applied(&Auth::Custom { headers: extra });
        assert_eq!(headers.len(), 2);
        assert_eq!(headers.get("X-Two").unwrap(), "2");
    }

    #[test]
    fn credentials_replace_caller_header_of_any_case() {
        let mut headers = Headers::new();
        headers.insert("authorization".into(), "Bearer stale".into());
        Auth::bearer("fresh").apply(&mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer fresh");

        let mut headers = Headers::new();
        headers.insert("x-api-key".into(), "old".into());
        Auth::api_key("X-Api-Key", "new").apply(&mut headers);
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("X-Api-Key").unwrap(), "new");
    }

    #[test]
    fn unrecognized_type_deserializes_to_unknown() {
        let auth: Auth = serde_json::from_value(json!({"type": "oauth2", "scope": "x"})).unwrap();
        assert_eq!(auth, Auth::Unknown);
        assert!(applied(&auth).is_empty());
    }

    #[test]
    fn deserializes_apikey_tag() {
        let auth: Auth =
            serde_json::from_value(json!({"type": "apikey", "key": "k", "value": "v"})).unwrap();
        assert_eq!(auth, Auth::api_key("k", "v"));
    }
}
