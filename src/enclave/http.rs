// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP+JSON client for the enclave endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use url::Url;

use super::types::{
    DeriveAddressResponse, DeriveKeyResponse, DeriveRequest, GenerateSeedRequest,
    GenerateSeedResponse, ValidateSeedRequest, ValidateSeedResponse,
};
use super::{
    CallContext, DerivationPath, DerivedAddress, DerivedKey, EnclaveClient, EnclaveError,
    EnclaveErrorKind, EnclaveInfo, EnclaveOperation, GeneratedSeed, SeedInput, SeedStrength,
    SeedValidation,
};
use crate::config::CustodyConfig;
use crate::models::{Curve, EncryptedSeed};

/// Longest response body kept in a status error.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpEnclaveClient {
    base_url: Url,
    http: Client,
}

impl HttpEnclaveClient {
    /// Build a client with a per-request timeout.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, EnclaveError> {
        let http = Client::builder().timeout(timeout).build().map_err(|e| {
            EnclaveError::new(
                EnclaveOperation::Health,
                EnclaveErrorKind::Transport(format!("failed to build HTTP client: {e}")),
            )
        })?;
        Ok(Self { base_url, http })
    }

    pub fn from_config(config: &CustodyConfig) -> Result<Self, EnclaveError> {
        Self::new(config.enclave_url.clone(), config.enclave_timeout)
    }

    fn url(&self, operation: EnclaveOperation) -> String {
        format!(
            "{}{}",
            self.base_url.as_str().trim_end_matches('/'),
            operation.endpoint()
        )
    }

    async fn post_json<Req, Resp>(
        &self,
        ctx: &CallContext,
        operation: EnclaveOperation,
        path: Option<&DerivationPath>,
        body: &Req,
    ) -> Result<Resp, EnclaveError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let request = self.http.post(self.url(operation)).json(body);
        self.exchange(ctx, operation, path, request).await
    }

    async fn get_json<Resp>(
        &self,
        ctx: &CallContext,
        operation: EnclaveOperation,
    ) -> Result<Resp, EnclaveError>
    where
        Resp: DeserializeOwned,
    {
        let request = self.http.get(self.url(operation));
        self.exchange(ctx, operation, None, request).await
    }

    /// Send one request and decode the JSON body, logging failures with the
    /// operation name and derivation path.
    async fn exchange<Resp>(
        &self,
        ctx: &CallContext,
        operation: EnclaveOperation,
        path: Option<&DerivationPath>,
        request: reqwest::RequestBuilder,
    ) -> Result<Resp, EnclaveError>
    where
        Resp: DeserializeOwned,
    {
        tracing::debug!(operation = %operation, path = ?path.map(|p| p.as_str()), "enclave request");

        let result = ctx
            .run(operation, path, async {
                let bytes = send(operation, path, request).await?;
                serde_json::from_slice::<Resp>(&bytes).map_err(|e| {
                    tag(
                        EnclaveError::new(operation, EnclaveErrorKind::Decode(e.to_string())),
                        path,
                    )
                })
            })
            .await;

        result.inspect_err(log_failure)
    }
}

/// Log a failed enclave call with its operation and derivation path.
fn log_failure(e: &EnclaveError) {
    tracing::warn!(
        operation = %e.operation,
        path = ?e.path,
        retryable = e.is_retryable(),
        error = %e.kind,
        "enclave call failed"
    );
}

fn tag(err: EnclaveError, path: Option<&DerivationPath>) -> EnclaveError {
    match path {
        Some(p) => err.with_path(p.as_str()),
        None => err,
    }
}

fn transport_error(
    operation: EnclaveOperation,
    path: Option<&DerivationPath>,
    e: reqwest::Error,
) -> EnclaveError {
    let kind = if e.is_timeout() {
        EnclaveErrorKind::Timeout
    } else {
        EnclaveErrorKind::Transport(e.to_string())
    };
    tag(EnclaveError::new(operation, kind), path)
}

/// Send a request and return the body of a 2xx response.
async fn send(
    operation: EnclaveOperation,
    path: Option<&DerivationPath>,
    request: reqwest::RequestBuilder,
) -> Result<Vec<u8>, EnclaveError> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(operation, path, e))?;

    let status = response.status();
    if !status.is_success() {
        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        return Err(tag(
            EnclaveError::new(
                operation,
                EnclaveErrorKind::Status {
                    status: status.as_u16(),
                    body,
                },
            ),
            path,
        ));
    }

    response
        .bytes()
        .await
        .map(|b| b.to_vec())
        .map_err(|e| transport_error(operation, path, e))
}

/// Reject an echoed field that is present but differs from what was asked.
fn check_echo(
    operation: EnclaveOperation,
    path: &DerivationPath,
    field: &str,
    expected: &str,
    echoed: &str,
) -> Result<(), EnclaveError> {
    if !echoed.is_empty() && !echoed.eq_ignore_ascii_case(expected) {
        return Err(EnclaveError::new(
            operation,
            EnclaveErrorKind::Inconsistent(format!(
                "{field} echoed as {echoed:?}, requested {expected:?}"
            )),
        )
        .with_path(path.as_str()));
    }
    Ok(())
}

fn require_non_empty(
    operation: EnclaveOperation,
    path: Option<&DerivationPath>,
    field: &str,
    value: &str,
) -> Result<(), EnclaveError> {
    if value.trim().is_empty() {
        return Err(tag(
            EnclaveError::new(
                operation,
                EnclaveErrorKind::Decode(format!("missing {field} in response")),
            ),
            path,
        ));
    }
    Ok(())
}

/// Checks on a decoded `/generate-seed` body.
fn seed_from_response(
    strength: SeedStrength,
    resp: GenerateSeedResponse,
) -> Result<GeneratedSeed, EnclaveError> {
    let op = EnclaveOperation::GenerateSeed;
    let encrypted_seed = EncryptedSeed::new(resp.seed_phrase);
    if !encrypted_seed.is_well_formed() {
        return Err(EnclaveError::new(
            op,
            EnclaveErrorKind::Decode("seed_phrase is not a hex-encoded blob".into()),
        ));
    }
    if resp.strength != strength.bits() || resp.word_count != strength.word_count() {
        return Err(EnclaveError::new(
            op,
            EnclaveErrorKind::Inconsistent(format!(
                "requested {} bits ({} words), got {} bits ({} words)",
                strength.bits(),
                strength.word_count(),
                resp.strength,
                resp.word_count
            )),
        ));
    }

    Ok(GeneratedSeed {
        encrypted_seed,
        entropy_digest: resp.entropy,
        strength_bits: resp.strength,
        word_count: resp.word_count,
    })
}

fn key_from_response(
    path: &DerivationPath,
    curve: Curve,
    resp: DeriveKeyResponse,
) -> Result<DerivedKey, EnclaveError> {
    let op = EnclaveOperation::DeriveKey;
    require_non_empty(op, Some(path), "public_key", &resp.public_key)?;
    require_non_empty(op, Some(path), "address", &resp.address)?;
    check_echo(op, path, "path", path.as_str(), &resp.path)?;
    check_echo(op, path, "curve", curve.wire_name(), &resp.curve)?;

    Ok(DerivedKey {
        encrypted_private_key: Some(resp.private_key).filter(|k| !k.is_empty()),
        public_key: resp.public_key,
        address: resp.address,
    })
}

fn address_from_response(
    path: &DerivationPath,
    curve: Curve,
    resp: DeriveAddressResponse,
) -> Result<DerivedAddress, EnclaveError> {
    let op = EnclaveOperation::DeriveAddress;
    require_non_empty(op, Some(path), "address", &resp.address)?;
    check_echo(op, path, "path", path.as_str(), &resp.path)?;
    check_echo(op, path, "curve", curve.wire_name(), &resp.curve)?;

    Ok(DerivedAddress {
        address: resp.address,
    })
}

#[async_trait]
impl EnclaveClient for HttpEnclaveClient {
    async fn generate_seed(
        &self,
        ctx: &CallContext,
        strength: SeedStrength,
        passphrase: Option<&str>,
    ) -> Result<GeneratedSeed, EnclaveError> {
        let op = EnclaveOperation::GenerateSeed;
        let body = GenerateSeedRequest {
            strength: strength.bits(),
            passphrase,
        };
        let resp: GenerateSeedResponse = self.post_json(ctx, op, None, &body).await?;
        seed_from_response(strength, resp).inspect_err(log_failure)
    }

    async fn validate_seed(
        &self,
        ctx: &CallContext,
        input: &SeedInput,
        encrypted_reference: Option<&EncryptedSeed>,
    ) -> Result<SeedValidation, EnclaveError> {
        let op = EnclaveOperation::ValidateSeed;
        let seed_phrase = input
            .wire_value()
            .map_err(|reason| EnclaveError::new(op, EnclaveErrorKind::InvalidInput(reason)))?;

        let resp: ValidateSeedResponse = self
            .post_json(ctx, op, None, &ValidateSeedRequest { seed_phrase })
            .await?;

        let entropy_match = match (input, encrypted_reference) {
            (SeedInput::EncryptedSeedBlob(blob), Some(reference)) => {
                Some(blob.as_str().eq_ignore_ascii_case(reference.as_str()))
            }
            _ => None,
        };

        Ok(SeedValidation {
            is_valid: resp.valid,
            word_count: resp.word_count,
            entropy_match,
        })
    }

    async fn derive_key(
        &self,
        ctx: &CallContext,
        seed: &EncryptedSeed,
        path: &DerivationPath,
        curve: Curve,
    ) -> Result<DerivedKey, EnclaveError> {
        let op = EnclaveOperation::DeriveKey;
        let body = DeriveRequest {
            seed_phrase: seed.as_str(),
            path: path.as_str(),
            curve: curve.wire_name(),
        };
        let resp: DeriveKeyResponse = self.post_json(ctx, op, Some(path), &body).await?;
        key_from_response(path, curve, resp).inspect_err(log_failure)
    }

    async fn derive_address(
        &self,
        ctx: &CallContext,
        seed: &EncryptedSeed,
        path: &DerivationPath,
        curve: Curve,
    ) -> Result<DerivedAddress, EnclaveError> {
        let op = EnclaveOperation::DeriveAddress;
        let body = DeriveRequest {
            seed_phrase: seed.as_str(),
            path: path.as_str(),
            curve: curve.wire_name(),
        };
        let resp: DeriveAddressResponse = self.post_json(ctx, op, Some(path), &body).await?;
        address_from_response(path, curve, resp).inspect_err(log_failure)
    }

    async fn health(&self, ctx: &CallContext) -> Result<(), EnclaveError> {
        let op = EnclaveOperation::Health;
        let request = self.http.get(self.url(op));
        ctx.run(op, None, async { send(op, None, request).await.map(|_| ()) })
            .await
            .inspect_err(log_failure)
    }

    async fn info(&self, ctx: &CallContext) -> Result<EnclaveInfo, EnclaveError> {
        self.get_json(ctx, EnclaveOperation::Info).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::json;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> HttpEnclaveClient {
        HttpEnclaveClient::new(server.uri().parse().unwrap(), Duration::from_secs(5)).unwrap()
    }

    fn seed() -> EncryptedSeed {
        EncryptedSeed::new("a1b2c3d4")
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    /// JSON log capture for the current thread (`#[tokio::test]` runs on one).
    fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        (buffer, tracing::subscriber::set_default(subscriber))
    }

    #[tokio::test]
    async fn generate_seed_sends_strength_and_decodes_blob() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-seed"))
            .and(body_json(json!({ "strength": 256 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seed_phrase": "deadbeef",
                "entropy": "e3b0c442",
                "strength": 256,
                "word_count": 24
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let strength = SeedStrength::from_bits(256).unwrap();
        let seed = client
            .generate_seed(&CallContext::default(), strength, None)
            .await
            .unwrap();

        assert_eq!(seed.encrypted_seed.as_str(), "deadbeef");
        assert_eq!(seed.entropy_digest, "e3b0c442");
        assert_eq!(seed.word_count, 24);
    }

    #[tokio::test]
    async fn generate_seed_forwards_passphrase() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-seed"))
            .and(body_json(json!({ "strength": 128, "passphrase": "hunter2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seed_phrase": "00ff",
                "entropy": "",
                "strength": 128,
                "word_count": 12
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let strength = SeedStrength::from_mnemonic_length(12).unwrap();
        let seed = client
            .generate_seed(&CallContext::default(), strength, Some("hunter2"))
            .await
            .unwrap();
        assert_eq!(seed.strength_bits, 128);
    }

    #[tokio::test]
    async fn generate_seed_rejects_mismatched_word_count() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/generate-seed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "seed_phrase": "00ff",
                "entropy": "x",
                "strength": 128,
                "word_count": 24
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let (logs, _guard) = capture_logs();
        let err = client
            .generate_seed(
                &CallContext::default(),
                SeedStrength::from_bits(128).unwrap(),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err.kind, EnclaveErrorKind::Inconsistent(_)));
        assert!(!err.is_retryable());

        let logs = logs.contents();
        assert!(logs.contains("enclave call failed"), "{logs}");
        assert!(logs.contains("generate-seed"), "{logs}");
    }

    #[tokio::test]
    async fn derive_address_posts_wire_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/derive-address"))
            .and(body_json(json!({
                "seed_phrase": "a1b2c3d4",
                "path": "m/44'/501'/0'/0/0",
                "curve": "ed25519"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": "So1anaAddr",
                "path": "m/44'/501'/0'/0/0",
                "curve": "ed25519"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let path = DerivationPath::bip44(Curve::Ed25519, 0);
        let derived = client
            .derive_address(&CallContext::default(), &seed(), &path, Curve::Ed25519)
            .await
            .unwrap();
        assert_eq!(derived.address, "So1anaAddr");
    }

    #[tokio::test]
    async fn derive_key_returns_public_material() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/derive-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "private_key": "enc-pk",
                "public_key": "02abcdef",
                "address": "0xabc",
                "path": "m/44'/60'/0'/0/4",
                "curve": "secp256k1"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let path = DerivationPath::bip44(Curve::Secp256k1, 4);
        let key = client
            .derive_key(&CallContext::default(), &seed(), &path, Curve::Secp256k1)
            .await
            .unwrap();
        assert_eq!(key.public_key, "02abcdef");
        assert_eq!(key.encrypted_private_key.as_deref(), Some("enc-pk"));
        assert!(!format!("{key:?}").contains("enc-pk"));
    }

    #[tokio::test]
    async fn echoed_path_mismatch_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/derive-address"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "address": "0xabc",
                "path": "m/44'/60'/0'/0/9",
                "curve": "secp256k1"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let path = DerivationPath::bip44(Curve::Secp256k1, 0);
        let (logs, _guard) = capture_logs();
        let err = client
            .derive_address(&CallContext::default(), &seed(), &path, Curve::Secp256k1)
            .await
            .unwrap_err();
        assert!(matches!(err.kind, EnclaveErrorKind::Inconsistent(_)));
        assert_eq!(err.path.as_deref(), Some("m/44'/60'/0'/0/0"));

        let logs = logs.contents();
        assert!(logs.contains("enclave call failed"), "{logs}");
        assert!(logs.contains("derive-address"), "{logs}");
        assert!(logs.contains("m/44'/60'/0'/0/0"), "{logs}");
    }

    #[tokio::test]
    async fn non_success_status_carries_operation_and_path() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/derive-address"))
            .respond_with(ResponseTemplate::new(500).set_body_string("enclave sealed"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let path = DerivationPath::bip44(Curve::Secp256k1, 1);
        let err = client
            .derive_address(&CallContext::default(), &seed(), &path, Curve::Secp256k1)
            .await
            .unwrap_err();

        assert_eq!(err.operation, EnclaveOperation::DeriveAddress);
        assert_eq!(err.path.as_deref(), Some("m/44'/60'/0'/0/1"));
        assert_eq!(
            err.kind,
            EnclaveErrorKind::Status {
                status: 500,
                body: "enclave sealed".into()
            }
        );
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/derive-address"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let path = DerivationPath::bip44(Curve::Secp256k1, 0);
        let err = client
            .derive_address(&CallContext::default(), &seed(), &path, Curve::Secp256k1)
            .await
            .unwrap_err();
        assert!(matches!(err.kind, EnclaveErrorKind::Decode(_)));
    }

    #[tokio::test]
    async fn slow_enclave_hits_caller_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "version": "1" }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let ctx = CallContext::default().with_timeout(Duration::from_millis(100));
        let err = client.info(&ctx).await.unwrap_err();
        assert_eq!(err.kind, EnclaveErrorKind::Timeout);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn cancelled_token_skips_the_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let token = CancellationToken::new();
        token.cancel();
        let err = client.health(&CallContext::new(token)).await.unwrap_err();
        assert_eq!(err.kind, EnclaveErrorKind::Cancelled);
    }

    #[tokio::test]
    async fn validate_seed_normalizes_mnemonic_and_reports_match() {
        let server = MockServer::start().await;
        let phrase = ["legal"; 12].join(" ");
        Mock::given(method("POST"))
            .and(path("/validate-seed"))
            .and(body_json(json!({ "seed_phrase": phrase })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "valid": true, "word_count": 12 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/validate-seed"))
            .and(body_json(json!({ "seed_phrase": "a1b2c3d4" })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "valid": true, "word_count": 24 })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let ctx = CallContext::default();

        let mnemonic = SeedInput::PlaintextMnemonic(["LEGAL"; 12].join("  "));
        let result = client.validate_seed(&ctx, &mnemonic, Some(&seed())).await.unwrap();
        assert!(result.is_valid);
        assert_eq!(result.entropy_match, None);

        let blob = SeedInput::EncryptedSeedBlob(seed());
        let result = client.validate_seed(&ctx, &blob, Some(&seed())).await.unwrap();
        assert_eq!(result.word_count, 24);
        assert_eq!(result.entropy_match, Some(true));
    }

    #[tokio::test]
    async fn validate_seed_rejects_bad_input_before_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/validate-seed"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let input = SeedInput::PlaintextMnemonic("too short".into());
        let err = client
            .validate_seed(&CallContext::default(), &input, None)
            .await
            .unwrap_err();
        assert!(matches!(err.kind, EnclaveErrorKind::InvalidInput(_)));
    }

    #[tokio::test]
    async fn health_and_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": "1.4.0",
                "enclave_id": "enc-7",
                "capabilities": ["generate-seed", "derive-key"],
                "healthy": true
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let ctx = CallContext::default();
        client.health(&ctx).await.unwrap();

        let info = client.info(&ctx).await.unwrap();
        assert_eq!(info.enclave_id, "enc-7");
        assert_eq!(info.capabilities.len(), 2);
        assert!(info.healthy);
    }

    #[tokio::test]
    async fn unreachable_enclave_is_retryable() {
        // Port 9 (discard) on localhost is expected to refuse connections.
        let client = HttpEnclaveClient::new(
            "http://127.0.0.1:9".parse().unwrap(),
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.health(&CallContext::default()).await.unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {err}");
    }
}
