//! Automation URL codec.
//!
//! A digest can be handed to an external scheduler (Make.com, Zapier, a cron
//! job calling a webhook) as a single self-contained URL:
//!
//! ```text
//! <origin>/api/generate-digest?secret=<secret>&data=<base64(JSON(digest))>
//! ```
//!
//! [`encode_automation_url`] builds that URL. [`decode_automation_url`] is the
//! receiving side's half of the contract: it authenticates the secret and
//! reconstructs the digest, rejecting anything malformed as a whole.
//!
//! Encoding is deterministic: the same digest and secret always produce the
//! same bytes.

use crate::models::{DigestConfig, ValidationError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

/// Path of the generation endpoint on the automation origin.
pub const AUTOMATION_PATH: &str = "/api/generate-digest";
/// Origin used when none is configured.
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

const SECRET_PARAM: &str = "secret";
const DATA_PARAM: &str = "data";

const MISSING_CONFIG: &str = "Please select a digest to automate.";
const MISSING_SECRET: &str = "Please set a Webhook Secret in the 'Automation Setup' section first.";

/// Why an automation URL could not be built or accepted.
///
/// [`CodecError::user_message`] is what gets shown in place of the URL.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{}", MISSING_CONFIG)]
    MissingConfig,

    #[error("{}", MISSING_SECRET)]
    MissingSecret,

    #[error("Invalid automation origin '{0}'")]
    InvalidOrigin(String),

    #[error("Failed to serialize digest: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Invalid automation URL: {0}")]
    InvalidUrl(#[source] url::ParseError),

    #[error("Unexpected automation path '{0}'")]
    WrongPath(String),

    #[error("Automation is disabled: no webhook secret configured")]
    AutomationDisabled,

    #[error("Missing '{0}' query parameter")]
    MissingParameter(&'static str),

    #[error("Webhook secret does not match")]
    SecretMismatch,

    #[error("Digest data is not valid base64: {0}")]
    InvalidBase64(#[source] base64::DecodeError),

    #[error("Digest data is not a valid digest: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Digest data failed validation: {0}")]
    InvalidDigest(#[from] ValidationError),
}

impl CodecError {
    /// Inline explanation for the user.
    pub fn user_message(&self) -> String {
        match self {
            CodecError::MissingConfig => MISSING_CONFIG.to_string(),
            CodecError::MissingSecret => MISSING_SECRET.to_string(),
            CodecError::InvalidOrigin(_) => format!("{self}. Check the 'origin' setting."),
            CodecError::Serialize(_) => "The automation URL could not be built.".to_string(),
            _ => "This automation request was rejected.".to_string(),
        }
    }
}

/// Build the automation URL for `config`, authorized by `secret`.
///
/// Returns [`CodecError::MissingConfig`] or [`CodecError::MissingSecret`]
/// instead of a URL when either input is absent.
#[instrument(level = "debug", skip(config, secret), fields(id = config.map(|c| c.id.as_str())))]
pub fn encode_automation_url(
    origin: &str,
    config: Option<&DigestConfig>,
    secret: &str,
) -> Result<Url, CodecError> {
    let config = config.ok_or(CodecError::MissingConfig)?;
    if secret.is_empty() {
        return Err(CodecError::MissingSecret);
    }

    let mut url = Url::parse(origin).map_err(|_| CodecError::InvalidOrigin(origin.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(CodecError::InvalidOrigin(origin.to_string()));
    }

    let json = serde_json::to_vec(config).map_err(CodecError::Serialize)?;
    let data = STANDARD.encode(json);

    url.set_path(AUTOMATION_PATH);
    url.set_fragment(None);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair(SECRET_PARAM, secret)
        .append_pair(DATA_PARAM, &data);

    debug!(bytes = url.as_str().len(), "Built automation URL");
    Ok(url)
}

/// Authenticate an automation request and recover its digest.
///
/// `expected_secret` is the secret stored on the receiving side. An empty
/// expected secret means automation is switched off and every request is
/// refused.
#[instrument(level = "debug", skip_all)]
pub fn decode_automation_url(url: &str, expected_secret: &str) -> Result<DigestConfig, CodecError> {
    let url = Url::parse(url).map_err(CodecError::InvalidUrl)?;
    if url.path() != AUTOMATION_PATH {
        return Err(CodecError::WrongPath(url.path().to_string()));
    }
    if expected_secret.is_empty() {
        return Err(CodecError::AutomationDisabled);
    }

    let param = |name: &'static str| {
        url.query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
            .ok_or(CodecError::MissingParameter(name))
    };

    let secret = param(SECRET_PARAM)?;
    if !secrets_match(&secret, expected_secret) {
        warn!("Rejected automation request with wrong secret");
        return Err(CodecError::SecretMismatch);
    }

    let data = param(DATA_PARAM)?;
    let json = STANDARD.decode(data.as_bytes()).map_err(CodecError::InvalidBase64)?;
    let config: DigestConfig = serde_json::from_slice(&json).map_err(CodecError::InvalidJson)?;
    Ok(config.revalidated()?)
}

/// Compare without short-circuiting on the first differing byte.
fn secrets_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DigestDraft, DigestId, Schedule};

    fn tech_briefing() -> DigestConfig {
        DigestDraft {
            name: "Tech Briefing".to_string(),
            topics: vec!["Technology".to_string(), "Science".to_string()],
            story_count: 3,
            schedule: Schedule::Daily,
        }
        .build(DigestId::from("digest_1746540000000"))
        .unwrap()
    }

    fn data_param(url: &Url) -> String {
        url.query_pairs()
            .find(|(k, _)| k == "data")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    #[test]
    fn test_scenario_data_param_decodes_to_config() {
        let config = tech_briefing();
        let url = encode_automation_url(DEFAULT_ORIGIN, Some(&config), "s3cr3t").unwrap();

        assert_eq!(url.path(), AUTOMATION_PATH);
        let secret = url.query_pairs().find(|(k, _)| k == "secret").unwrap().1;
        assert_eq!(secret, "s3cr3t");

        let json = STANDARD.decode(data_param(&url)).unwrap();
        let decoded: DigestConfig = serde_json::from_slice(&json).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_missing_secret_or_config_is_codec_error() {
        let config = tech_briefing();
        assert!(matches!(
            encode_automation_url(DEFAULT_ORIGIN, Some(&config), ""),
            Err(CodecError::MissingSecret)
        ));
        assert!(matches!(
            encode_automation_url(DEFAULT_ORIGIN, None, "s3cr3t"),
            Err(CodecError::MissingConfig)
        ));
        let message = CodecError::MissingSecret.to_string();
        assert!(message.contains("Webhook Secret"));
    }

    #[test]
    fn test_user_message_explains_encode_failures() {
        assert_eq!(
            CodecError::MissingSecret.user_message(),
            "Please set a Webhook Secret in the 'Automation Setup' section first."
        );
        assert_eq!(
            CodecError::MissingConfig.user_message(),
            "Please select a digest to automate."
        );
        let bad_origin = encode_automation_url("not a url", Some(&tech_briefing()), "s3cr3t").unwrap_err();
        assert!(bad_origin.user_message().contains("'origin' setting"));
        assert_eq!(
            CodecError::SecretMismatch.user_message(),
            "This automation request was rejected."
        );
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let config = tech_briefing();
        let a = encode_automation_url(DEFAULT_ORIGIN, Some(&config), "s3cr3t").unwrap();
        let b = encode_automation_url(DEFAULT_ORIGIN, Some(&config), "s3cr3t").unwrap();
        assert_eq!(a.as_str(), b.as_str());
    }

    #[test]
    fn test_origin_path_and_query_are_replaced() {
        let config = tech_briefing();
        let url = encode_automation_url(
            "https://digest.example.com/app/page?tab=1#top",
            Some(&config),
            "s3cr3t",
        )
        .unwrap();
        assert!(url
            .as_str()
            .starts_with("https://digest.example.com/api/generate-digest?secret=s3cr3t&data="));
        assert_eq!(url.fragment(), None);
        assert_eq!(url.query_pairs().count(), 2);
    }

    #[test]
    fn test_invalid_origin() {
        let config = tech_briefing();
        assert!(matches!(
            encode_automation_url("not a url", Some(&config), "s3cr3t"),
            Err(CodecError::InvalidOrigin(_))
        ));
        assert!(matches!(
            encode_automation_url("mailto:someone@example.com", Some(&config), "s3cr3t"),
            Err(CodecError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn test_round_trip_with_special_characters() {
        let mut draft = DigestDraft::from(tech_briefing());
        draft.name = "Café & Crème: 日本のニュース?".to_string();
        draft.topics = vec!["A&B".to_string(), "x=y+z".to_string()];
        let config = draft.build(DigestId::from("digest_7")).unwrap();
        let secret = "p@ss word/+=&";

        let url = encode_automation_url(DEFAULT_ORIGIN, Some(&config), secret).unwrap();
        let decoded = decode_automation_url(url.as_str(), secret).unwrap();
        assert_eq!(decoded, config);
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        let config = tech_briefing();
        let url = encode_automation_url(DEFAULT_ORIGIN, Some(&config), "s3cr3t").unwrap();
        assert!(matches!(
            decode_automation_url(url.as_str(), "other"),
            Err(CodecError::SecretMismatch)
        ));
        assert!(matches!(
            decode_automation_url(url.as_str(), ""),
            Err(CodecError::AutomationDisabled)
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_requests() {
        let base = "http://localhost:3000/api/generate-digest";
        assert!(matches!(
            decode_automation_url("http://localhost:3000/other?secret=s&data=e30=", "s"),
            Err(CodecError::WrongPath(_))
        ));
        assert!(matches!(
            decode_automation_url(&format!("{base}?data=e30="), "s"),
            Err(CodecError::MissingParameter("secret"))
        ));
        assert!(matches!(
            decode_automation_url(&format!("{base}?secret=s"), "s"),
            Err(CodecError::MissingParameter("data"))
        ));
        assert!(matches!(
            decode_automation_url(&format!("{base}?secret=s&data=%%%"), "s"),
            Err(CodecError::InvalidBase64(_))
        ));
        // "{}" in base64
        assert!(matches!(
            decode_automation_url(&format!("{base}?secret=s&data=e30%3D"), "s"),
            Err(CodecError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_automation_url("::::", "s"),
            Err(CodecError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_decode_revalidates_payload() {
        let json = r#"{"id":"digest_1","name":"  ","topics":[],"storyCount":3,"schedule":"daily"}"#;
        let mut url = Url::parse(DEFAULT_ORIGIN).unwrap();
        url.set_path(AUTOMATION_PATH);
        url.query_pairs_mut()
            .append_pair("secret", "s")
            .append_pair("data", &STANDARD.encode(json));
        assert!(matches!(
            decode_automation_url(url.as_str(), "s"),
            Err(CodecError::InvalidDigest(ValidationError::EmptyName))
        ));
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("abc", "abc"));
        assert!(!secrets_match("abc", "abd"));
        assert!(!secrets_match("abc", "abcd"));
    }
}
