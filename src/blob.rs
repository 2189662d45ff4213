use std::time::Duration;

use camino::Utf8Path;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use sha2::{Digest, Sha256};

use crate::error::DownloaderError;
use crate::fs_util::write_new_file;

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

type HmacSha256 = Hmac<Sha256>;

pub trait BlobStore: Send + Sync {
    fn fetch(&self, bucket: &str, key: &str, destination: &Utf8Path) -> Result<(), DownloaderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    /// Standard AWS variables; `None` means anonymous requests.
    pub fn from_env() -> Option<Self> {
        let access_key_id = non_empty_env("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty_env("AWS_SECRET_ACCESS_KEY")?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty_env("AWS_SESSION_TOKEN"),
        })
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Clone)]
pub struct S3Settings {
    pub endpoint: String,
    pub region: String,
    pub timeout: Duration,
    pub credentials: Option<Credentials>,
}

#[derive(Clone)]
pub struct S3HttpClient {
    client: Client,
    endpoint: reqwest::Url,
    region: String,
    credentials: Option<Credentials>,
}

impl S3HttpClient {
    pub fn new(settings: S3Settings) -> Result<Self, DownloaderError> {
        let endpoint = reqwest::Url::parse(&settings.endpoint)
            .map_err(|err| DownloaderError::InvalidEndpoint(format!("{}: {err}", settings.endpoint)))?;
        if endpoint.host_str().is_none() {
            return Err(DownloaderError::InvalidEndpoint(settings.endpoint));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("s3sql/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| DownloaderError::BlobHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| DownloaderError::BlobHttp(err.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            region: settings.region,
            credentials: settings.credentials,
        })
    }

    pub fn object_path(&self, bucket: &str, key: &str) -> String {
        let base = self.endpoint.path().trim_end_matches('/');
        format!("{base}/{}/{}", uri_encode(bucket, true), uri_encode(key, false))
    }

    fn host_header(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        }
    }

    fn build_request(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<reqwest::blocking::RequestBuilder, DownloaderError> {
        let path = self.object_path(bucket, key);
        let host = self.host_header();
        let url = reqwest::Url::parse(&format!("{}://{host}{path}", self.endpoint.scheme()))
            .map_err(|err| DownloaderError::BlobHttp(err.to_string()))?;
        // URL parsing collapses `.`/`..` segments, even percent-encoded ones.
        if url.path() != path {
            return Err(DownloaderError::UnaddressableKey {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        let mut request = self
            .client
            .get(url)
            .header("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256);

        if let Some(credentials) = &self.credentials {
            let signing = SigningRequest {
                method: "GET",
                canonical_uri: &path,
                host: &host,
                extra_headers: &[],
                payload_sha256: EMPTY_PAYLOAD_SHA256,
                timestamp: Utc::now(),
                region: &self.region,
                service: "s3",
            };
            let signed = sign_v4(&signing, credentials);
            request = request
                .header("x-amz-date", signed.amz_date)
                .header(reqwest::header::AUTHORIZATION, signed.authorization);
            if let Some(token) = &credentials.session_token {
                request = request.header("x-amz-security-token", token);
            }
        }
        Ok(request)
    }
}

impl BlobStore for S3HttpClient {
    fn fetch(&self, bucket: &str, key: &str, destination: &Utf8Path) -> Result<(), DownloaderError> {
        let mut response = self
            .build_request(bucket, key)?
            .send()
            .map_err(|err| DownloaderError::BlobHttp(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = error_message(&body).unwrap_or_else(|| status.to_string());
            return Err(match status.as_u16() {
                404 => DownloaderError::BlobNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                },
                403 => DownloaderError::BlobAccessDenied {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    message,
                },
                code => DownloaderError::BlobStatus {
                    status: code,
                    message,
                },
            });
        }

        write_new_file(&mut response, destination)?;
        Ok(())
    }
}

fn error_message(body: &str) -> Option<String> {
    let start = body.find("<Message>")? + "<Message>".len();
    let end = body[start..].find("</Message>")? + start;
    let message = body[start..end].trim();
    (!message.is_empty()).then(|| message.to_string())
}

/// RFC 3986 encoding as SigV4 wants it; `/` survives in object keys.
pub fn uri_encode(value: &str, encode_slash: bool) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if !encode_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

#[derive(Debug, Clone)]
pub struct SigningRequest<'a> {
    pub method: &'a str,
    pub canonical_uri: &'a str,
    pub host: &'a str,
    /// Lowercase names, already trimmed values.
    pub extra_headers: &'a [(&'a str, &'a str)],
    pub payload_sha256: &'a str,
    pub timestamp: DateTime<Utc>,
    pub region: &'a str,
    pub service: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub amz_date: String,
    pub authorization: String,
    pub signature: String,
}

pub fn sign_v4(request: &SigningRequest<'_>, credentials: &Credentials) -> SignedHeaders {
    let amz_date = request.timestamp.format("%Y%m%dT%H%M%SZ").to_string();
    let date = request.timestamp.format("%Y%m%d").to_string();

    let mut headers: Vec<(&str, &str)> = vec![
        ("host", request.host),
        ("x-amz-content-sha256", request.payload_sha256),
        ("x-amz-date", amz_date.as_str()),
    ];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.as_str()));
    }
    headers.extend_from_slice(request.extra_headers);
    headers.sort_by(|a, b| a.0.cmp(b.0));

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        request.method,
        request.canonical_uri,
        canonical_headers,
        signed_headers,
        request.payload_sha256
    );

    let scope = format!("{date}/{}/{}/aws4_request", request.region, request.service);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
        hex(&Sha256::digest(canonical_request.as_bytes()))
    );

    let secret = format!("AWS4{}", credentials.secret_access_key);
    let date_key = hmac_sha256(secret.as_bytes(), date.as_bytes());
    let region_key = hmac_sha256(&date_key, request.region.as_bytes());
    let service_key = hmac_sha256(&region_key, request.service.as_bytes());
    let signing_key = hmac_sha256(&service_key, b"aws4_request");
    let signature = hex(&hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={signed_headers}, Signature={signature}",
        credentials.access_key_id
    );

    SignedHeaders {
        amz_date,
        authorization,
        signature,
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
