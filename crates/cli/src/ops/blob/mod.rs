use clap::{Args, Subcommand};
use common::blob::{Blob as VaultBlob, BlobError, PatchError};
use common::client::VaultError;
use serde_json::Value;

pub mod consolidate;
pub mod extend;
pub mod filter;
pub mod set;
pub mod show;
pub mod unset;
pub mod unshift;

use crate::op::{Op, OpContext};
use crate::state::{AppState, Session, StateError};

crate::command_enum! {
    (Show, show::Show),
    (Set, set::Set),
    (Unset, unset::Unset),
    (Extend, extend::Extend),
    (Unshift, unshift::Unshift),
    (Filter, filter::Filter),
    (Consolidate, consolidate::Consolidate),
}

// Rename the generated Command to BlobCommand for clarity
pub type BlobCommand = Command;

#[derive(Args, Debug, Clone)]
pub struct Blob {
    #[command(subcommand)]
    pub command: BlobCommand,
}

#[async_trait::async_trait]
impl Op for Blob {
    type Error = OpError;
    type Output = OpOutput;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        self.command.execute(ctx).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobOpError {
    #[error("state error: {0}")]
    State(#[from] StateError),
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
    #[error("blob error: {0}")]
    Blob(#[from] BlobError),
    #[error("invalid patch: {0}")]
    Patch(#[from] PatchError),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("no login token. Run 'vault login --token <token>' first")]
    NoLoginToken,
    #[error("nothing at '{0}'")]
    NotFound(String),
}

/// The logged-in account's blob, with the state it was loaded from
pub struct Opened {
    pub state: AppState,
    pub session: Session,
    pub blob: VaultBlob,
}

/// Open the blob from the session's snapshot, or fetch it from the vault if
/// there is none yet
pub async fn open(ctx: &OpContext) -> Result<Opened, BlobOpError> {
    let state = AppState::load(ctx.config_path.clone())?;
    let mut session = state.load_session()?;

    let blob = match session.blob.clone() {
        Some(snapshot) => VaultBlob::restore(snapshot, ctx.transport.clone()),
        None => {
            let token = session
                .login_token
                .clone()
                .ok_or(BlobOpError::NoLoginToken)?;
            let (blob, report, refreshed) = ctx.client().open_blob(&session.keys, &token).await?;
            let (applied, failed) = (report.applied, report.failed);
            let consolidated = report.consolidated().await;
            tracing::info!(applied, failed, consolidated, "fetched blob");
            if refreshed.is_some() {
                session.login_token = refreshed;
            }
            blob
        }
    };

    Ok(Opened {
        state,
        session,
        blob,
    })
}

impl Opened {
    /// Store the blob's current state in the session; returns its revision
    pub async fn save(mut self) -> Result<u64, BlobOpError> {
        let snapshot = self.blob.snapshot().await?;
        let revision = snapshot.revision;
        self.session.blob = Some(snapshot);
        self.state.save_session(&self.session)?;
        Ok(revision)
    }
}

/// Parse a JSON value, taking anything that is not JSON as a plain string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;
    use common::auth_info::AuthInfo;
    use common::blob::BlobSnapshot;
    use common::client::{HttpRequest, HttpResponse, Transport, TransportError};
    use common::crypto::Secret;
    use common::custom_keys::CustomKeys;
    use reqwest::StatusCode;
    use serde_json::json;
    use tempfile::TempDir;

    /// Accepts every request
    struct Accept;

    #[async_trait::async_trait]
    impl Transport for Accept {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Ok(HttpResponse::new(StatusCode::OK, json!({ "result": "success" })))
        }
    }

    fn keys() -> CustomKeys {
        CustomKeys::new(AuthInfo {
            username: "alice".into(),
            version: 3,
            exists: true,
            email_verified: false,
            blobvault: "http://localhost:5150".into(),
            pakdf: serde_json::from_value(json!({
                "modulus": "c5",
                "exponent": "010001",
                "alpha": "02",
                "host": "auth.example.com",
            }))
            .unwrap(),
        })
    }

    fn setup(blob: Option<BlobSnapshot>) -> (TempDir, PathBuf, OpContext) {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("vault");
        let state = AppState::init(Some(dir.clone()), None).unwrap();
        state
            .save_session(&Session {
                keys: keys(),
                login_token: None,
                blob,
            })
            .unwrap();
        let ctx = OpContext::with_transport(Arc::new(Accept), None, Some(dir.clone()));
        (temp, dir, ctx)
    }

    fn snapshot() -> BlobSnapshot {
        BlobSnapshot {
            id: "b1".into(),
            url: "http://localhost:5150".into(),
            key: Secret::generate().unwrap(),
            revision: 0,
            data: json!({ "auth_secret": "0f".repeat(32), "list": [{"id": 1}, {"id": 2}] }),
            encrypted_secret: None,
        }
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("1"), json!(1));
        assert_eq!(parse_value("{\"a\":[true]}"), json!({"a": [true]}));
        assert_eq!(parse_value("\"quoted\""), json!("quoted"));
        assert_eq!(parse_value("plain text"), json!("plain text"));
    }

    #[tokio::test]
    async fn test_commands_update_the_session_snapshot() {
        let (_temp, dir, ctx) = setup(Some(snapshot()));

        let set = set::Set {
            pointer: "/name".into(),
            value: "alice".into(),
        };
        assert_eq!(set.execute(&ctx).await.unwrap(), "set /name (revision 1)");

        let unshift = unshift::Unshift {
            pointer: "/list".into(),
            value: "{\"id\": 0}".into(),
        };
        unshift.execute(&ctx).await.unwrap();

        let filter = filter::Filter {
            pointer: "/list".into(),
            field: "id".into(),
            value: "2".into(),
            subcommands: r#"["set", "/seen", true]"#.into(),
        };
        assert_eq!(
            filter.execute(&ctx).await.unwrap(),
            "filtered /list (revision 3)"
        );

        let show = show::Show {
            pointer: Some("/list".into()),
        };
        let shown: Value = serde_json::from_str(&show.execute(&ctx).await.unwrap()).unwrap();
        assert_eq!(shown, json!([{"id": 0}, {"id": 1}, {"id": 2, "seen": true}]));

        let session = AppState::load(Some(dir)).unwrap().load_session().unwrap();
        let stored = session.blob.unwrap();
        assert_eq!(stored.revision, 3);
        assert_eq!(stored.data["name"], json!("alice"));
    }

    #[tokio::test]
    async fn test_show_missing_pointer() {
        let (_temp, _dir, ctx) = setup(Some(snapshot()));
        let show = show::Show {
            pointer: Some("/missing".into()),
        };
        assert!(matches!(
            show.execute(&ctx).await,
            Err(BlobOpError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_extend_requires_json() {
        let (_temp, _dir, ctx) = setup(Some(snapshot()));
        let extend = extend::Extend {
            pointer: "/settings".into(),
            value: "not json".into(),
        };
        assert!(matches!(extend.execute(&ctx).await, Err(BlobOpError::Json(_))));
    }

    #[tokio::test]
    async fn test_identity_vault_cannot_be_removed() {
        let (_temp, _dir, ctx) = setup(Some(snapshot()));
        let unset = unset::Unset {
            pointer: "/identityVault".into(),
        };
        assert!(matches!(
            unset.execute(&ctx).await,
            Err(BlobOpError::Blob(BlobError::IdentityVaultProtected(_)))
        ));
    }

    #[tokio::test]
    async fn test_open_without_token() {
        let (_temp, _dir, ctx) = setup(None);
        let show = show::Show { pointer: None };
        assert!(matches!(
            show.execute(&ctx).await,
            Err(BlobOpError::NoLoginToken)
        ));
    }
}
