// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Custody Service
//!
//! Entry point for callers. Wires the store, the enclave client and the clock
//! into the individual services once, and runs every state-changing
//! operation through the same pipeline:
//!
//! ```text
//! authorize -> begin activity (PENDING) -> [quorum check] -> execute -> COMPLETED | FAILED
//! ```
//!
//! Reads are authorized through the same decision table but not recorded.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use super::clock::{Clock, SystemClock};
use super::ledger::ActivityLedger;
use super::organizations::OrganizationService;
use super::private_keys::PrivateKeyService;
use super::wallets::WalletOrchestrator;
use crate::auth::{ApprovalEvidence, QuorumAuthorizer};
use crate::config::CustodyConfig;
use crate::enclave::{CallContext, EnclaveClient, EnclaveInfo, HttpEnclaveClient, SeedInput, SeedValidation};
use crate::error::{CustodyError, CustodyResult};
use crate::models::{
    validate_identifier, Activity, ActivityType, CreatePrivateKeyRequest, CreateWalletRequest,
    CreatedWallet, NewOrganization, Organization, Page, PageRequest, PrivateKey, Wallet,
};
use crate::storage::CustodyDatabase;

/// Who is asking, which approvals they bring, and the enclave call context.
#[derive(Debug, Clone, Default)]
pub struct OperationContext {
    pub created_by: String,
    pub approvals: ApprovalEvidence,
    pub call: CallContext,
}

impl OperationContext {
    pub fn new(created_by: impl Into<String>) -> Self {
        Self {
            created_by: created_by.into(),
            ..Default::default()
        }
    }

    pub fn with_approvals(mut self, approvals: ApprovalEvidence) -> Self {
        self.approvals = approvals;
        self
    }

    pub fn with_call(mut self, call: CallContext) -> Self {
        self.call = call;
        self
    }
}

/// Value of a recorded operation plus its finished activity.
#[derive(Debug, Clone)]
pub struct Recorded<T> {
    pub activity: Activity,
    pub value: T,
}

/// Compact, secret-free summary stored as an activity's result.
trait ActivityResult {
    fn activity_result(&self) -> Value;
}

impl ActivityResult for Organization {
    fn activity_result(&self) -> Value {
        json!({
            "organization_id": self.id,
            "quorum_members": self.root_quorum.member_ids.len(),
            "threshold": self.root_quorum.threshold,
        })
    }
}

impl ActivityResult for CreatedWallet {
    fn activity_result(&self) -> Value {
        json!({
            "wallet_id": self.wallet.id,
            "addresses": self.derived_addresses,
        })
    }
}

impl ActivityResult for Wallet {
    fn activity_result(&self) -> Value {
        json!({
            "wallet_id": self.id,
            "accounts_deleted": self.accounts.len(),
        })
    }
}

impl ActivityResult for PrivateKey {
    fn activity_result(&self) -> Value {
        json!({
            "private_key_id": self.id,
            "derivation_path": self.derivation_path,
            "public_key": self.public_key,
        })
    }
}

pub struct CustodyService {
    organizations: OrganizationService,
    wallets: WalletOrchestrator,
    private_keys: PrivateKeyService,
    ledger: ActivityLedger,
    authorizer: QuorumAuthorizer,
    enclave: Arc<dyn EnclaveClient>,
}

impl CustodyService {
    pub fn new(
        db: Arc<CustodyDatabase>,
        enclave: Arc<dyn EnclaveClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            organizations: OrganizationService::new(db.clone(), clock.clone()),
            wallets: WalletOrchestrator::new(db.clone(), enclave.clone(), clock.clone()),
            private_keys: PrivateKeyService::new(db.clone(), enclave.clone(), clock.clone()),
            ledger: ActivityLedger::new(db, clock),
            authorizer: QuorumAuthorizer::new(),
            enclave,
        }
    }

    /// Open the database under `DATA_DIR` and connect to `ENCLAVE_URL`.
    pub fn from_config(config: &CustodyConfig) -> CustodyResult<Self> {
        let db = CustodyDatabase::open(&config.database_path())?;
        let enclave = HttpEnclaveClient::from_config(config)?;
        Ok(Self::new(
            Arc::new(db),
            Arc::new(enclave),
            Arc::new(SystemClock),
        ))
    }

    /// Run a state-changing operation under an activity.
    async fn record<T, F, Fut>(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        activity_type: ActivityType,
        parameters: Value,
        operation: F,
    ) -> CustodyResult<Recorded<T>>
    where
        T: ActivityResult,
        F: FnOnce() -> Fut,
        Fut: Future<Output = CustodyResult<T>>,
    {
        validate_identifier("organization id", org_id)?;
        let decision = self.authorizer.authorize(&activity_type, &parameters);
        let pending = self
            .ledger
            .begin(org_id, activity_type, parameters, &ctx.created_by)?;

        let outcome = if decision.is_satisfied_by(&ctx.approvals) {
            operation().await
        } else {
            tracing::info!(
                activity_id = %pending.id,
                missing = ?decision.missing(&ctx.approvals),
                reason = %decision.reason,
                "Quorum approval missing"
            );
            Err(CustodyError::QuorumRequired {
                required: decision.required_approvals,
            })
        };

        match outcome {
            Ok(value) => {
                let activity = match self.ledger.complete(&pending.id, value.activity_result()) {
                    Ok(activity) => activity,
                    Err(e) => {
                        // the operation itself committed; report it anyway
                        tracing::error!(activity_id = %pending.id, error = %e, "Failed to complete activity");
                        pending
                    }
                };
                Ok(Recorded { activity, value })
            }
            Err(err) => {
                if let Err(e) = self.ledger.fail(&pending.id, &err) {
                    tracing::error!(activity_id = %pending.id, error = %e, "Failed to record activity failure");
                }
                Err(err)
            }
        }
    }

    /// Authorize a read. Reads are never recorded.
    fn authorize_read(
        &self,
        ctx: &OperationContext,
        activity_type: ActivityType,
        parameters: Value,
    ) -> CustodyResult<()> {
        let decision = self.authorizer.authorize(&activity_type, &parameters);
        if decision.is_satisfied_by(&ctx.approvals) {
            Ok(())
        } else {
            Err(CustodyError::QuorumRequired {
                required: decision.required_approvals,
            })
        }
    }

    // =========================================================================
    // Organizations
    // =========================================================================

    pub async fn create_organization(
        &self,
        ctx: &OperationContext,
        request: NewOrganization,
    ) -> CustodyResult<Recorded<Organization>> {
        let org_id = OrganizationService::resolve_id(&request)?;
        let parameters = json!({
            "organization_id": org_id,
            "name": request.name,
            "member_ids": request.member_ids,
            "threshold": request.threshold,
        });
        self.record(ctx, &org_id, ActivityType::CreateOrganization, parameters, || async {
            self.organizations.create_organization(&org_id, &request)
        })
        .await
    }

    pub fn get_organization(&self, ctx: &OperationContext, org_id: &str) -> CustodyResult<Organization> {
        self.authorize_read(ctx, ActivityType::GetOrganization, json!({ "organization_id": org_id }))?;
        self.organizations.get_organization(org_id)
    }

    pub fn list_quorum_members(&self, ctx: &OperationContext, org_id: &str) -> CustodyResult<Vec<String>> {
        self.authorize_read(ctx, ActivityType::GetOrganization, json!({ "organization_id": org_id }))?;
        self.organizations.list_quorum_members(org_id)
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    pub async fn create_wallet(
        &self,
        ctx: &OperationContext,
        request: CreateWalletRequest,
    ) -> CustodyResult<Recorded<CreatedWallet>> {
        let parameters = serde_json::to_value(&request).map_err(|e| {
            CustodyError::validation(format!("unserializable wallet request: {e}"))
        })?;
        let org_id = request.organization_id.trim().to_string();
        self.record(ctx, &org_id, ActivityType::CreateWallet, parameters, || {
            self.wallets.create_wallet(&ctx.call, &request)
        })
        .await
    }

    pub fn get_wallet(&self, ctx: &OperationContext, org_id: &str, wallet_id: &str) -> CustodyResult<Wallet> {
        self.authorize_read(
            ctx,
            ActivityType::GetWallet,
            json!({ "organization_id": org_id, "wallet_id": wallet_id }),
        )?;
        self.wallets.get_wallet(org_id, wallet_id)
    }

    pub fn list_wallets(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        page: &PageRequest,
    ) -> CustodyResult<Page<Wallet>> {
        self.authorize_read(ctx, ActivityType::ListWallets, json!({ "organization_id": org_id }))?;
        self.wallets.list_wallets(org_id, page)
    }

    pub async fn delete_wallet(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        wallet_id: &str,
        force_without_export: bool,
    ) -> CustodyResult<Recorded<Wallet>> {
        let parameters = json!({
            "organization_id": org_id,
            "wallet_id": wallet_id,
            "force_without_export": force_without_export,
        });
        self.record(ctx, org_id, ActivityType::DeleteWallet, parameters, || async {
            self.wallets
                .delete_wallet(org_id, wallet_id, force_without_export)
        })
        .await
    }

    /// Validate seed material, optionally against a wallet's encrypted seed.
    pub async fn validate_seed(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        input: &SeedInput,
        reference_wallet_id: Option<&str>,
    ) -> CustodyResult<SeedValidation> {
        // the seed material itself never enters the decision parameters
        self.authorize_read(
            ctx,
            ActivityType::ValidateSeed,
            json!({ "organization_id": org_id, "wallet_id": reference_wallet_id }),
        )?;
        self.wallets
            .validate_seed(&ctx.call, org_id, input, reference_wallet_id)
            .await
    }

    // =========================================================================
    // Private keys
    // =========================================================================

    pub async fn create_private_key(
        &self,
        ctx: &OperationContext,
        request: CreatePrivateKeyRequest,
    ) -> CustodyResult<Recorded<PrivateKey>> {
        // `import_material` is never serialized
        let mut parameters = serde_json::to_value(&request).map_err(|e| {
            CustodyError::validation(format!("unserializable private key request: {e}"))
        })?;
        if request.import_material.is_some() {
            parameters["import_material_supplied"] = Value::Bool(true);
        }
        let org_id = request.organization_id.trim().to_string();
        self.record(ctx, &org_id, ActivityType::CreatePrivateKey, parameters, || {
            self.private_keys.create_private_key(&ctx.call, &request)
        })
        .await
    }

    pub fn get_private_key(&self, ctx: &OperationContext, org_id: &str, key_id: &str) -> CustodyResult<PrivateKey> {
        self.authorize_read(
            ctx,
            ActivityType::GetPrivateKey,
            json!({ "organization_id": org_id, "private_key_id": key_id }),
        )?;
        self.private_keys.get_private_key(org_id, key_id)
    }

    pub fn list_private_keys(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        page: &PageRequest,
    ) -> CustodyResult<Page<PrivateKey>> {
        self.authorize_read(ctx, ActivityType::ListPrivateKeys, json!({ "organization_id": org_id }))?;
        self.private_keys.list_private_keys(org_id, page)
    }

    pub async fn delete_private_key(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        key_id: &str,
    ) -> CustodyResult<Recorded<PrivateKey>> {
        let parameters = json!({ "organization_id": org_id, "private_key_id": key_id });
        self.record(ctx, org_id, ActivityType::DeletePrivateKey, parameters, || async {
            self.private_keys.delete_private_key(org_id, key_id)
        })
        .await
    }

    // =========================================================================
    // Activities & enclave
    // =========================================================================

    pub fn get_activity(&self, ctx: &OperationContext, org_id: &str, activity_id: &str) -> CustodyResult<Activity> {
        self.authorize_read(
            ctx,
            ActivityType::GetActivity,
            json!({ "organization_id": org_id, "activity_id": activity_id }),
        )?;
        self.ledger.get_activity(org_id, activity_id)
    }

    pub fn list_activities(
        &self,
        ctx: &OperationContext,
        org_id: &str,
        page: &PageRequest,
    ) -> CustodyResult<Page<Activity>> {
        self.authorize_read(ctx, ActivityType::ListActivities, json!({ "organization_id": org_id }))?;
        self.ledger.list_activities(org_id, page)
    }

    /// Check enclave health, then fetch its capabilities.
    pub async fn probe_enclave(&self, call: &CallContext) -> CustodyResult<EnclaveInfo> {
        self.enclave.health(call).await?;
        Ok(self.enclave.info(call).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApprovalRole;
    use crate::enclave::mock::MockEnclave;
    use crate::enclave::{EnclaveErrorKind, EnclaveOperation};
    use crate::models::{AccountSpec, ActivityStatus};

    struct Fixture {
        service: Arc<CustodyService>,
        enclave: Arc<MockEnclave>,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(enclave: MockEnclave) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(CustodyDatabase::open(&dir.path().join("test.redb")).unwrap());
        let enclave = Arc::new(enclave);
        let service = CustodyService::new(db, enclave.clone(), Arc::new(SystemClock));
        Fixture {
            service: Arc::new(service),
            enclave,
            _dir: dir,
        }
    }

    fn approved(user: &str) -> OperationContext {
        OperationContext::new(user).with_approvals(ApprovalEvidence::from_roles([
            ApprovalRole::Admin,
            ApprovalRole::SecurityOfficer,
        ]))
    }

    async fn create_org(svc: &CustodyService, id: &str) -> Organization {
        svc.create_organization(
            &OperationContext::new("root"),
            NewOrganization {
                id: Some(id.into()),
                name: format!("{id} org"),
                member_ids: vec!["alice".into(), "bob".into()],
                threshold: 2,
            },
        )
        .await
        .unwrap()
        .value
    }

    fn wallet_request(org: &str, name: &str) -> CreateWalletRequest {
        CreateWalletRequest {
            organization_id: org.into(),
            name: name.into(),
            accounts: vec![AccountSpec::new("SECP256K1")],
            mnemonic_length: 12,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn create_wallet_end_to_end_is_recorded() {
        let fx = fixture_with(MockEnclave::new().with_address("m/44'/60'/0'/0/0", "addr-0"));
        create_org(&fx.service, "O1").await;

        let recorded = fx
            .service
            .create_wallet(&approved("alice"), wallet_request("O1", "W1"))
            .await
            .unwrap();
        assert_eq!(recorded.value.derived_addresses, vec!["addr-0"]);
        assert_eq!(
            recorded.value.wallet.accounts[0].derivation_path.as_str(),
            "m/44'/60'/0'/0/0"
        );

        let activity = &recorded.activity;
        assert_eq!(activity.status, ActivityStatus::Completed);
        assert_eq!(activity.activity_type, ActivityType::CreateWallet);
        assert_eq!(activity.created_by, "alice");
        let result = activity.result.as_ref().unwrap();
        assert_eq!(result["addresses"], json!(["addr-0"]));
        assert!(!result.to_string().contains("seed-A"));
    }

    #[tokio::test]
    async fn missing_quorum_fails_activity_without_enclave_call() {
        let fx = fixture_with(MockEnclave::new());
        create_org(&fx.service, "O1").await;
        let ctx = OperationContext::new("mallory")
            .with_approvals(ApprovalEvidence::from_roles([ApprovalRole::Admin]));

        let err = fx
            .service
            .create_wallet(&ctx, wallet_request("O1", "W1"))
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::QuorumRequired { .. }));
        assert_eq!(fx.enclave.total_calls(), 0);

        let activities = fx
            .service
            .list_activities(&ctx, "O1", &PageRequest::default())
            .unwrap();
        let last = activities.items.last().unwrap();
        assert_eq!(last.activity_type, ActivityType::CreateWallet);
        assert_eq!(last.status, ActivityStatus::Failed);
        assert_eq!(last.result.as_ref().unwrap()["error_code"], "quorum_required");
    }

    #[tokio::test]
    async fn failures_are_recorded_with_error_class() {
        let fx = fixture_with(MockEnclave::new());
        create_org(&fx.service, "O1").await;
        fx.enclave
            .fail_operation(EnclaveOperation::GenerateSeed, EnclaveErrorKind::Timeout);

        let err = fx
            .service
            .create_wallet(&approved("alice"), wallet_request("O1", "W1"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let mut bad = wallet_request("O1", "W2");
        bad.mnemonic_length = 13;
        let err = fx.service.create_wallet(&approved("alice"), bad).await.unwrap_err();
        assert!(matches!(err, CustodyError::Validation(_)));

        let activities = fx
            .service
            .list_activities(&approved("alice"), "O1", &PageRequest::default())
            .unwrap();
        let codes: Vec<_> = activities
            .items
            .iter()
            .filter(|a| a.activity_type == ActivityType::CreateWallet)
            .map(|a| {
                assert_eq!(a.status, ActivityStatus::Failed);
                a.result.as_ref().unwrap()["error_code"].clone()
            })
            .collect();
        assert_eq!(codes, vec![json!("enclave_protocol_error"), json!("validation_error")]);
    }

    #[tokio::test]
    async fn reads_are_allowed_and_not_recorded() {
        let fx = fixture_with(MockEnclave::new());
        create_org(&fx.service, "O1").await;
        let created = fx
            .service
            .create_wallet(&approved("alice"), wallet_request("O1", "W1"))
            .await
            .unwrap();

        let reader = OperationContext::new("auditor");
        let before = fx
            .service
            .list_activities(&reader, "O1", &PageRequest::default())
            .unwrap()
            .items
            .len();

        fx.service
            .get_wallet(&reader, "O1", &created.value.wallet.id)
            .unwrap();
        fx.service
            .list_wallets(&reader, "O1", &PageRequest::default())
            .unwrap();
        fx.service.get_organization(&reader, "O1").unwrap();
        assert_eq!(
            fx.service.list_quorum_members(&reader, "O1").unwrap(),
            vec!["alice", "bob"]
        );
        fx.service
            .get_activity(&reader, "O1", &created.activity.id)
            .unwrap();

        let after = fx
            .service
            .list_activities(&reader, "O1", &PageRequest::default())
            .unwrap()
            .items
            .len();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn private_key_lifecycle() {
        let fx = fixture_with(MockEnclave::new());
        create_org(&fx.service, "O1").await;
        let wallet = fx
            .service
            .create_wallet(&approved("alice"), wallet_request("O1", "W1"))
            .await
            .unwrap()
            .value
            .wallet;

        let request = CreatePrivateKeyRequest {
            organization_id: "O1".into(),
            wallet_id: wallet.id.clone(),
            name: "hot key".into(),
            curve: "ED25519".into(),
            import_material: None,
            tags: vec![],
        };
        let created = fx
            .service
            .create_private_key(&approved("alice"), request.clone())
            .await
            .unwrap();
        assert_eq!(created.value.derivation_path.as_str(), "m/44'/501'/0'/0/1");
        assert_eq!(
            created.activity.result.as_ref().unwrap()["private_key_id"],
            json!(created.value.id)
        );

        let mut import = request;
        import.import_material = Some("secret-key-bytes".into());
        let err = fx
            .service
            .create_private_key(&approved("alice"), import)
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::Validation(_)));
        let activities = fx
            .service
            .list_activities(&approved("alice"), "O1", &PageRequest::default())
            .unwrap();
        let serialized = serde_json::to_string(&activities.items).unwrap();
        assert!(!serialized.contains("secret-key-bytes"));

        let deleted = fx
            .service
            .delete_private_key(&approved("alice"), "O1", &created.value.id)
            .await
            .unwrap();
        assert_eq!(deleted.activity.activity_type, ActivityType::DeletePrivateKey);

        let removed = fx
            .service
            .delete_wallet(&approved("alice"), "O1", &wallet.id, true)
            .await
            .unwrap();
        assert_eq!(removed.value.id, wallet.id);
        assert_eq!(
            removed.activity.parameters["force_without_export"],
            json!(true)
        );
    }

    #[tokio::test]
    async fn organization_creation_validates_quorum() {
        let fx = fixture_with(MockEnclave::new());
        let err = fx
            .service
            .create_organization(
                &OperationContext::new("root"),
                NewOrganization {
                    id: Some("O1".into()),
                    name: "Org".into(),
                    member_ids: vec!["alice".into()],
                    threshold: 2,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CustodyError::Validation(_)));

        let org = create_org(&fx.service, "O1").await;
        assert_eq!(org.root_quorum.threshold, 2);
    }

    #[tokio::test]
    async fn probe_enclave_reports_capabilities() {
        let fx = fixture_with(MockEnclave::new());
        let info = fx
            .service
            .probe_enclave(&CallContext::default())
            .await
            .unwrap();
        assert!(info.healthy);
        assert!(info.capabilities.iter().any(|c| c == "derive-key"));

        fx.enclave.fail_operation(
            EnclaveOperation::Health,
            EnclaveErrorKind::Transport("connection refused".into()),
        );
        let err = fx
            .service
            .probe_enclave(&CallContext::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
