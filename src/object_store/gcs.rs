use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;

use super::{ObjectStore, ObjectStoreError};

/// Google Cloud Storage object store backend.
pub struct GcsStore {
    bucket: String,
    client: Client,
    access_token: tokio::sync::RwLock<String>,
    credentials_file: Option<String>,
    /// Service-account identity for signing download URLs. Absent when
    /// running on metadata-server credentials; resolve_url then falls back
    /// to the public media URL.
    signer: Option<UrlSigner>,
}

struct UrlSigner {
    client_email: String,
    private_key_der: Vec<u8>,
}

#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ListResponse {
    #[serde(default)]
    items: Vec<ListItem>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct ListItem {
    name: String,
}

/// How long signed download URLs stay valid
const SIGNED_URL_TTL_SECS: i64 = 3600;

impl GcsStore {
    pub async fn new(bucket: &str, credentials_file: Option<&str>) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        let signer = match credentials_file {
            Some(path) => {
                let key_json = tokio::fs::read_to_string(path).await?;
                let key: ServiceAccountKey = serde_json::from_str(&key_json)?;
                Some(UrlSigner {
                    client_email: key.client_email,
                    private_key_der: pem_to_der(&key.private_key)?,
                })
            }
            None => None,
        };

        let store = Self {
            bucket: bucket.to_string(),
            client,
            access_token: tokio::sync::RwLock::new(String::new()),
            credentials_file: credentials_file.map(|s| s.to_string()),
            signer,
        };

        store.refresh_token().await?;
        Ok(store)
    }

    async fn refresh_token(&self) -> Result<(), anyhow::Error> {
        let token = if let Some(ref creds_path) = self.credentials_file {
            self.token_from_service_account(creds_path).await?
        } else {
            self.token_from_metadata_server().await?
        };

        let mut lock = self.access_token.write().await;
        *lock = token;
        Ok(())
    }

    async fn token_from_service_account(&self, path: &str) -> Result<String, anyhow::Error> {
        let key_json = tokio::fs::read_to_string(path).await?;
        let key: ServiceAccountKey = serde_json::from_str(&key_json)?;

        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": key.client_email,
            "scope": "https://www.googleapis.com/auth/devstorage.read_write",
            "aud": key.token_uri,
            "iat": now,
            "exp": now + 3600,
        });

        // Build JWT (header.claims.signature)
        let header = base64_url_encode(&serde_json::to_vec(&serde_json::json!({
            "alg": "RS256",
            "typ": "JWT"
        }))?);
        let payload = base64_url_encode(&serde_json::to_vec(&claims)?);
        let unsigned = format!("{header}.{payload}");

        let der = pem_to_der(&key.private_key)?;
        let signature = sign_rs256(unsigned.as_bytes(), &der)?;
        let jwt = format!("{unsigned}.{}", base64_url_encode(&signature));

        let resp: TokenResponse = self
            .client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt),
            ])
            .send()
            .await?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    async fn token_from_metadata_server(&self) -> Result<String, anyhow::Error> {
        let resp: TokenResponse = self
            .client
            .get("http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token")
            .header("Metadata-Flavor", "Google")
            .send()
            .await?
            .json()
            .await?;

        Ok(resp.access_token)
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "https://storage.googleapis.com/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.bucket,
            percent_encode(key)
        )
    }

    fn list_url(&self, prefix: &str, page_token: Option<&str>) -> String {
        let mut url = format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o?prefix={}",
            self.bucket,
            percent_encode(prefix)
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&percent_encode(token));
        }
        url
    }

    fn delete_url(&self, key: &str) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
            self.bucket,
            percent_encode(key)
        )
    }

    fn metadata_url(&self, key: &str) -> String {
        format!(
            "https://storage.googleapis.com/storage/v1/b/{}/o/{}",
            self.bucket,
            percent_encode(key)
        )
    }

    /// V2 signed URL: GET on the object, valid for SIGNED_URL_TTL_SECS
    fn signed_url(&self, signer: &UrlSigner, key: &str) -> Result<String, ObjectStoreError> {
        let expires = chrono::Utc::now().timestamp() + SIGNED_URL_TTL_SECS;
        let resource = format!("/{}/{}", self.bucket, key);
        let string_to_sign = format!("GET\n\n\n{expires}\n{resource}");

        let signature = sign_rs256(string_to_sign.as_bytes(), &signer.private_key_der).map_err(
            |e| ObjectStoreError::Resolution {
                key: key.to_string(),
                reason: e.to_string(),
            },
        )?;
        let signature_b64 = {
            use base64::Engine;
            base64::engine::general_purpose::STANDARD.encode(signature)
        };

        Ok(format!(
            "https://storage.googleapis.com{resource}?GoogleAccessId={}&Expires={expires}&Signature={}",
            percent_encode(&signer.client_email),
            percent_encode(&signature_b64)
        ))
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    async fn put(&self, key: &str, data: Bytes) -> Result<(), ObjectStoreError> {
        let token = self.access_token.read().await.clone();

        let resp = self
            .client
            .post(self.upload_url(key))
            .bearer_auth(&token)
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS upload failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let token = self.access_token.read().await.clone();

        let mut keys = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let resp = self
                .client
                .get(self.list_url(prefix, page_token.as_deref()))
                .bearer_auth(&token)
                .send()
                .await
                .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;

            if !resp.status().is_success() {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                return Err(ObjectStoreError::Unavailable(format!(
                    "GCS list failed ({status}): {body}"
                )));
            }

            let page: ListResponse = resp
                .json()
                .await
                .map_err(|e| ObjectStoreError::Unavailable(e.to_string()))?;

            keys.extend(page.items.into_iter().map(|item| item.name));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(keys)
    }

    async fn resolve_url(&self, key: &str) -> Result<String, ObjectStoreError> {
        match self.signer {
            Some(ref signer) => self.signed_url(signer, key),
            // No signing identity; the object must be publicly readable
            None => Ok(format!(
                "https://storage.googleapis.com/{}/{}",
                self.bucket,
                percent_encode(key)
            )),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let token = self.access_token.read().await.clone();

        let resp = self
            .client
            .delete(self.delete_url(key))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ObjectStoreError::Backend(format!(
                "GCS delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, ObjectStoreError> {
        let token = self.access_token.read().await.clone();

        let resp = self
            .client
            .get(self.metadata_url(key))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        Ok(resp.status().is_success())
    }
}

fn base64_url_encode(data: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(data)
}

/// Minimal percent-encoding for path segments and query values
fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Strip PEM armor and decode the base64 body
fn pem_to_der(private_key_pem: &str) -> Result<Vec<u8>, anyhow::Error> {
    let der_b64: String = private_key_pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    Ok(base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        &der_b64,
    )?)
}

fn sign_rs256(data: &[u8], private_key_der: &[u8]) -> Result<Vec<u8>, anyhow::Error> {
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(private_key_der)
        .map_err(|e| anyhow::anyhow!("Failed to parse RSA key: {e}"))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            data,
            &mut signature,
        )
        .map_err(|e| anyhow::anyhow!("Failed to sign: {e}"))?;

    Ok(signature)
}

#[cfg(test)]
mod tests {
    use super::percent_encode;

    #[test]
    fn encodes_reserved_characters_in_object_keys() {
        // Keys carry '/' separators and may contain spaces; both must be
        // escaped wherever a key lands in a query or path segment.
        assert_eq!(
            percent_encode("Completion/grade report.pdf"),
            "Completion%2Fgrade%20report.pdf"
        );
        assert_eq!(percent_encode("plain-name_1.pdf~"), "plain-name_1.pdf~");
    }
}
