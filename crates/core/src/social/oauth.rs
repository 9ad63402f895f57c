//! OAuth 1.0a request signing (HMAC-SHA1), as required by the v1.1 REST API.

use base64::Engine;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha1::Sha1;

#[derive(Debug, Clone)]
pub struct Credentials {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub access_token: String,
    pub access_secret: String,
}

impl Credentials {
    /// `Authorization` header value for a request with the given query/form `params`.
    pub fn authorization_header(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
    ) -> anyhow::Result<String> {
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();
        let timestamp = chrono::Utc::now().timestamp().to_string();
        self.authorization_header_with(method, url, params, &nonce, &timestamp)
    }

    pub fn authorization_header_with(
        &self,
        method: &str,
        url: &str,
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: &str,
    ) -> anyhow::Result<String> {
        let oauth = [
            ("oauth_consumer_key", self.consumer_key.as_str()),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp),
            ("oauth_token", self.access_token.as_str()),
            ("oauth_version", "1.0"),
        ];

        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.extend_from_slice(&oauth);
        let base = signature_base_string(method, url, &all);
        let signature = sign(&base, &self.consumer_secret, &self.access_secret)?;

        let mut fields: Vec<String> = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, encode(v)))
            .collect();
        fields.push(format!("oauth_signature=\"{}\"", encode(&signature)));
        fields.sort();
        Ok(format!("OAuth {}", fields.join(", ")))
    }
}

pub fn encode(s: &str) -> String {
    urlencoding::encode(s).into_owned()
}

/// `METHOD&url&params`, each percent-encoded, params sorted by encoded key then value.
pub fn signature_base_string(method: &str, url: &str, params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (encode(k), encode(v)))
        .collect();
    encoded.sort();
    let joined = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        encode(url),
        encode(&joined)
    )
}

pub fn sign(base: &str, consumer_secret: &str, token_secret: &str) -> anyhow::Result<String> {
    let key = format!("{}&{}", encode(consumer_secret), encode(token_secret));
    let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
        .map_err(|err| anyhow::anyhow!("invalid OAuth signing key: {err}"))?;
    mac.update(base.as_bytes());
    Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials {
            consumer_key: "ck".to_string(),
            consumer_secret: "cs".to_string(),
            access_token: "at".to_string(),
            access_secret: "as".to_string(),
        }
    }

    #[test]
    fn base_string_sorts_and_encodes() {
        let base = signature_base_string(
            "post",
            "https://api.twitter.com/1.1/statuses/update.json",
            &[("status", "Hello Ladies + Gentlemen!"), ("include_entities", "true")],
        );
        assert_eq!(
            base,
            "POST&https%3A%2F%2Fapi.twitter.com%2F1.1%2Fstatuses%2Fupdate.json&\
             include_entities%3Dtrue%26status%3DHello%2520Ladies%2520%252B%2520Gentlemen%2521"
        );
    }

    #[test]
    fn signature_is_deterministic_base64() {
        let a = sign("base", "cs", "ts").unwrap();
        let b = sign("base", "cs", "ts").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, sign("base", "cs", "other").unwrap());
        // 20-byte SHA1 digest -> 28 base64 chars.
        assert_eq!(a.len(), 28);
    }

    #[test]
    fn header_carries_all_oauth_fields() {
        let header = creds().authorization_header_with(
            "GET",
            "https://api.twitter.com/1.1/statuses/user_timeline.json",
            &[("screen_name", "someone")],
            "abc",
            "1700000000",
        )
        .unwrap();
        assert!(header.starts_with("OAuth "));
        for field in [
            "oauth_consumer_key=\"ck\"",
            "oauth_nonce=\"abc\"",
            "oauth_signature_method=\"HMAC-SHA1\"",
            "oauth_timestamp=\"1700000000\"",
            "oauth_token=\"at\"",
            "oauth_version=\"1.0\"",
            "oauth_signature=\"",
        ] {
            assert!(header.contains(field), "missing {field} in {header}");
        }
    }
}
