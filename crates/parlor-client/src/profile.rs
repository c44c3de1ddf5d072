//! Profile settings: username, bio and avatar of the signed-in user.

use std::sync::Arc;

use parlor_shared::constants::{MAX_BIO_CHARS, USERS};
use parlor_shared::User;
use parlor_store::{DocumentStore, FieldUpdate};
use tracing::{debug, info, warn};

use crate::alerts::{AlertKind, Alerts};
use crate::error::{ClientError, Result};
use crate::session::SessionState;
use crate::upload::{ImageBlob, Uploader};

pub const USERNAME_REQUIRED: &str = "Please enter a username";

/// Changes from the settings form. `None` leaves a field alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<ImageBlob>,
}

/// Cut `bio` to the stored maximum, on character boundaries.
pub fn truncate_bio(bio: &str) -> String {
    bio.chars().take(MAX_BIO_CHARS).collect()
}

pub struct ProfileSettings {
    store: Arc<dyn DocumentStore>,
    uploader: Arc<dyn Uploader>,
    session: Arc<SessionState>,
    alerts: Alerts,
}

impl ProfileSettings {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Arc<dyn Uploader>,
        session: Arc<SessionState>,
        alerts: Alerts,
    ) -> Self {
        Self {
            store,
            uploader,
            session,
            alerts,
        }
    }

    /// Write `edit` to the signed-in user's profile in one update and refresh
    /// the session copy. Returns the updated profile.
    pub async fn update_profile(&self, edit: ProfileEdit) -> Result<User> {
        let mut user = self.session.require_identity()?;
        let mut updates = Vec::new();

        if let Some(username) = edit.username {
            let username = username.trim();
            if username.is_empty() {
                self.alerts.emit(AlertKind::Rejected, USERNAME_REQUIRED);
                return Err(ClientError::rejected(USERNAME_REQUIRED));
            }
            if username != user.username {
                user.username = username.to_string();
                updates.push(FieldUpdate::set("username", username));
            }
        }
        if let Some(bio) = edit.bio {
            let bio = truncate_bio(&bio);
            if bio != user.bio {
                updates.push(FieldUpdate::set("bio", bio.as_str()));
                user.bio = bio;
            }
        }
        if let Some(image) = edit.avatar {
            let reference = self.uploader.upload(image).await.map_err(|e| {
                warn!(user = %user.id, error = %e, "avatar upload failed");
                self.alerts.emit(AlertKind::UploadFailed, e.to_string());
                ClientError::Upload(e)
            })?;
            updates.push(FieldUpdate::set("avatar", reference.as_str()));
            user.avatar = Some(reference);
        }

        if updates.is_empty() {
            debug!(user = %user.id, "profile unchanged");
            return Ok(user);
        }

        self.store
            .update_fields(USERS, user.id.as_str(), updates)
            .await
            .map_err(|e| {
                warn!(user = %user.id, error = %e, "profile update failed");
                self.alerts.emit(AlertKind::WriteFailed, "Profile could not be saved");
                ClientError::Write(e)
            })?;
        info!(user = %user.id, "profile updated");

        self.session.apply_profile(user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{seed_user, FailingUploader};
    use crate::upload::DataUrlUploader;
    use parlor_shared::UserId;
    use parlor_store::MemoryStore;
    use serde_json::json;

    async fn signed_in(store: &MemoryStore) -> Arc<SessionState> {
        seed_user(store, "a", "Ana").await;
        let session = Arc::new(SessionState::new(Arc::new(store.clone())));
        session.handle_identity_change(Some(UserId::from("a"))).await;
        session
    }

    #[test]
    fn bio_truncates_on_chars() {
        assert_eq!(truncate_bio("short"), "short");
        assert_eq!(truncate_bio("exactly10!"), "exactly10!");
        assert_eq!(truncate_bio("héllo wörld again"), "héllo wörl");
    }

    #[tokio::test]
    async fn update_writes_and_refreshes_session() {
        let store = MemoryStore::new();
        let session = signed_in(&store).await;
        let settings = ProfileSettings::new(
            Arc::new(store.clone()),
            Arc::new(DataUrlUploader::new(1024)),
            session.clone(),
            Alerts::new(),
        );

        let user = settings
            .update_profile(ProfileEdit {
                username: Some("Ana B".into()),
                bio: Some("likes long walks".into()),
                avatar: Some(ImageBlob::new(&b"hi"[..], "image/png")),
            })
            .await
            .unwrap();
        assert_eq!(user.bio, "likes long");

        let doc = store.get_one(USERS, "a").await.unwrap();
        assert_eq!(doc.get("username"), Some(&json!("Ana B")));
        assert_eq!(doc.get("bio"), Some(&json!("likes long")));
        assert_eq!(doc.get("avatar"), Some(&json!("data:image/png;base64,aGk=")));
        assert_eq!(session.current_identity(), Some(user));
    }

    #[tokio::test]
    async fn unchanged_profile_writes_nothing() {
        let store = MemoryStore::new();
        let session = signed_in(&store).await;
        let settings = ProfileSettings::new(
            Arc::new(store.clone()),
            Arc::new(DataUrlUploader::new(1024)),
            session,
            Alerts::new(),
        );
        let writes = store.write_count();
        settings
            .update_profile(ProfileEdit {
                username: Some("Ana".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn failed_avatar_upload_writes_nothing() {
        let store = MemoryStore::new();
        let session = signed_in(&store).await;
        let settings = ProfileSettings::new(
            Arc::new(store.clone()),
            Arc::new(FailingUploader),
            session.clone(),
            Alerts::new(),
        );
        let writes = store.write_count();
        let err = settings
            .update_profile(ProfileEdit {
                bio: Some("new".into()),
                avatar: Some(ImageBlob::new(&b"hi"[..], "image/png")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Upload(_)));
        assert_eq!(store.write_count(), writes);
        assert_eq!(session.current_identity().unwrap().bio, "");
    }

    #[tokio::test]
    async fn requires_sign_in() {
        let store = MemoryStore::new();
        let settings = ProfileSettings::new(
            Arc::new(store.clone()),
            Arc::new(DataUrlUploader::new(1024)),
            Arc::new(SessionState::new(Arc::new(store))),
            Alerts::new(),
        );
        assert!(matches!(
            settings.update_profile(ProfileEdit::default()).await,
            Err(ClientError::NotSignedIn)
        ));
    }
}
