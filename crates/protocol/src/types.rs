use serde::{Deserialize, Serialize};

/// Signed user credentials attached to every control-plane call.
///
/// The signature is only valid for a few minutes, so embedders refresh it
/// periodically and hand the new value to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCredentials {
    #[serde(rename = "userid")]
    pub user_id: String,
    pub ptime: i64,
    pub sign: String,
    pub hash: String,
}

/// Object-storage coordinates and temporary credentials issued by the
/// control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageGrant {
    /// Storage host, without scheme.
    pub domain: String,
    pub bucket_name: String,
    pub access_id: String,
    pub access_key: String,
    /// Session token paired with the temporary key.
    pub token: String,
}

/// Callback the storage backend invokes once an object is complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCallback {
    #[serde(rename = "callbackUrl")]
    pub url: String,
    #[serde(rename = "callbackBody")]
    pub body: String,
    #[serde(rename = "callbackHost", default, skip_serializing_if = "String::is_empty")]
    pub host: String,
}

impl UploadCallback {
    /// Parses the JSON-encoded callback descriptor embedded in an initiate
    /// response. `"null"` and the empty string yield `None`.
    pub fn parse(raw: &str) -> Result<Option<Self>, serde_json::Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_credentials_field_names() {
        let creds = UserCredentials {
            user_id: "u1".into(),
            ptime: 1_700_000_000_000,
            sign: "abc".into(),
            hash: "def".into(),
        };
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["userid"], "u1");
        assert_eq!(json["ptime"], 1_700_000_000_000i64);
    }

    #[test]
    fn storage_grant_camel_case() {
        let json = r#"{
            "domain": "oss.example.com",
            "bucketName": "videos",
            "accessId": "AK",
            "accessKey": "SK",
            "token": "STS"
        }"#;
        let grant: StorageGrant = serde_json::from_str(json).unwrap();
        assert_eq!(grant.bucket_name, "videos");
        assert_eq!(grant.access_id, "AK");
        assert_eq!(grant.token, "STS");
    }

    #[test]
    fn callback_parse_descriptor() {
        let raw = r#"{"callbackUrl":"https://cb.example.com/notify","callbackBody":"vid=${x:vid}","callbackHost":"cb.example.com"}"#;
        let cb = UploadCallback::parse(raw).unwrap().unwrap();
        assert_eq!(cb.url, "https://cb.example.com/notify");
        assert_eq!(cb.body, "vid=${x:vid}");
        assert_eq!(cb.host, "cb.example.com");
    }

    #[test]
    fn callback_parse_null_and_empty() {
        assert!(UploadCallback::parse("null").unwrap().is_none());
        assert!(UploadCallback::parse("").unwrap().is_none());
        assert!(UploadCallback::parse("  ").unwrap().is_none());
    }

    #[test]
    fn callback_parse_malformed() {
        assert!(UploadCallback::parse("{not json").is_err());
    }
}
