use std::sync::Arc;

use model::profile::{Address, Profile, ProfileUpdate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use utility::id::Id;

use crate::{
    backend::IdentityBackend, cpf, identifier::Identifier, settings::Settings, IdentityError,
    IdentityResult, USER_STORAGE_KEY,
};

/// Sign-up form.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub cpf: String,
    pub phone: Option<String>,
    pub vehicle_plate: Option<String>,
    pub avatar: Option<String>,
    #[serde(flatten)]
    pub address: Address,
}

/// Login, registration and profile maintenance on top of an
/// [`IdentityBackend`]. The logged-in profile is cached in [`Settings`].
pub struct Auth {
    backend: Arc<dyn IdentityBackend>,
    settings: Settings,
}

impl Auth {
    pub fn new(backend: Arc<dyn IdentityBackend>, settings: Settings) -> Self {
        Self { backend, settings }
    }

    pub async fn login(&self, identifier: &str, password: &str) -> IdentityResult<Profile> {
        if identifier.trim().is_empty() || password.is_empty() {
            return Err(IdentityError::MissingFields);
        }
        let identifier = Identifier::parse(identifier)?;
        let user = self
            .backend
            .find_user(&identifier)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        let session = self
            .backend
            .sign_in(&user.email, password)
            .await
            .map_err(|why| match why {
                IdentityError::UserNotFound => IdentityError::WrongPassword,
                other => other,
            })?;

        let mut profile = self.backend.get_profile(&session.user).await?;
        profile.email = user.email;
        self.settings.set(USER_STORAGE_KEY, &profile).await?;
        log::info!("user '{}' logged in via {identifier}", profile.id);
        Ok(profile)
    }

    /// Validates the CPF and creates the account. If the backend fails
    /// after the account was created, nothing is rolled back.
    pub async fn register(&self, registration: Registration) -> IdentityResult<Id<Profile>> {
        let Registration {
            name,
            email,
            password,
            cpf: raw_cpf,
            phone,
            vehicle_plate,
            avatar,
            address,
        } = registration;

        if name.trim().is_empty() || email.trim().is_empty() || password.is_empty() {
            return Err(IdentityError::MissingFields);
        }
        if !email.contains('@') {
            return Err(IdentityError::InvalidEmail);
        }
        if !cpf::validate(&raw_cpf) {
            return Err(IdentityError::InvalidCpf);
        }
        let digits = cpf::clean(&raw_cpf);
        if self
            .backend
            .find_user(&Identifier::Cpf(digits.clone()))
            .await?
            .is_some()
        {
            return Err(IdentityError::CpfAlreadyRegistered);
        }

        let profile = Profile {
            id: Id::default(),
            name: name.trim().to_owned(),
            email: email.trim().to_lowercase(),
            cpf: digits,
            phone,
            avatar,
            vehicle_plate,
            address,
        };
        let id = self.backend.sign_up(&profile.email, &password, profile.clone()).await?;
        log::info!("registered user '{id}'");
        Ok(id)
    }

    /// Profile of the logged-in user, from the local cache.
    pub async fn current_profile(&self) -> IdentityResult<Option<Profile>> {
        self.settings.get(USER_STORAGE_KEY).await
    }

    /// Sends `update` once and refreshes the cached profile with the result.
    pub async fn update_profile(&self, update: ProfileUpdate) -> IdentityResult<Profile> {
        let current = self
            .current_profile()
            .await?
            .ok_or(IdentityError::NotLoggedIn)?;
        let profile = self.backend.update_profile(&current.id, update).await?;
        self.settings.set(USER_STORAGE_KEY, &profile).await?;
        Ok(profile)
    }

    pub async fn logout(&self) -> IdentityResult<()> {
        self.settings.remove(USER_STORAGE_KEY).await
    }

    /// Asks the backend to mail a recovery link. Only the address format is
    /// checked here; unknown addresses are not reported.
    pub async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> IdentityResult<()> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(IdentityError::MissingFields);
        }
        if !email.contains('@') {
            return Err(IdentityError::InvalidEmail);
        }
        self.backend.request_password_reset(&email, redirect_to).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::backend::{InMemoryBackend, Session, UserRef};

    use super::*;

    fn registration() -> Registration {
        Registration {
            name: "Maria Souza".to_owned(),
            email: "Maria@Example.com".to_owned(),
            password: "segredo".to_owned(),
            cpf: "529.982.247-25".to_owned(),
            vehicle_plate: Some("ABC1D23".to_owned()),
            ..Default::default()
        }
    }

    fn auth(dir: &tempfile::TempDir) -> (Auth, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let settings = Settings::new(dir.path().join("settings.json"));
        (Auth::new(backend.clone(), settings), backend)
    }

    #[tokio::test]
    async fn register_then_login_with_email_or_cpf() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = auth(&dir);
        let id = auth.register(registration()).await.unwrap();

        let profile = auth.login("maria@example.com", "segredo").await.unwrap();
        assert_eq!(profile.id, id);
        assert_eq!(profile.cpf, "52998224725");
        assert_eq!(auth.current_profile().await.unwrap(), Some(profile));

        auth.logout().await.unwrap();
        assert_eq!(auth.current_profile().await.unwrap(), None);

        let profile = auth.login("529.982.247-25", "segredo").await.unwrap();
        assert_eq!(profile.id, id);
    }

    #[tokio::test]
    async fn password_reset_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, backend) = auth(&dir);
        auth.register(registration()).await.unwrap();

        auth.request_password_reset(" Maria@Example.com ", Some("http://localhost/"))
            .await
            .unwrap();
        // unknown addresses succeed without sending anything
        auth.request_password_reset("joao@example.com", None)
            .await
            .unwrap();
        assert_eq!(backend.password_resets().await, vec!["maria@example.com"]);

        assert!(matches!(
            auth.request_password_reset("  ", None).await,
            Err(IdentityError::MissingFields)
        ));
        assert!(matches!(
            auth.request_password_reset("maria.example.com", None).await,
            Err(IdentityError::InvalidEmail)
        ));
        assert_eq!(backend.password_resets().await.len(), 1);
    }

    #[tokio::test]
    async fn login_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = auth(&dir);
        auth.register(registration()).await.unwrap();

        assert!(matches!(
            auth.login("", "segredo").await,
            Err(IdentityError::MissingFields)
        ));
        assert!(matches!(
            auth.login("maria@example.com", "").await,
            Err(IdentityError::MissingFields)
        ));
        assert!(matches!(
            auth.login("joao@example.com", "segredo").await,
            Err(IdentityError::UserNotFound)
        ));
        assert!(matches!(
            auth.login("maria@example.com", "errada").await,
            Err(IdentityError::WrongPassword)
        ));
        assert!(matches!(
            auth.login("111.111.111-11", "segredo").await,
            Err(IdentityError::InvalidCpf)
        ));
        assert_eq!(auth.current_profile().await.unwrap(), None);
    }

    #[tokio::test]
    async fn registration_checks_cpf() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, backend) = auth(&dir);

        let invalid = Registration {
            cpf: "111.111.111-11".to_owned(),
            ..registration()
        };
        assert!(matches!(
            auth.register(invalid).await,
            Err(IdentityError::InvalidCpf)
        ));
        assert_eq!(backend.account_count().await, 0);

        auth.register(registration()).await.unwrap();
        let duplicate = Registration {
            email: "outra@example.com".to_owned(),
            ..registration()
        };
        assert!(matches!(
            auth.register(duplicate).await,
            Err(IdentityError::CpfAlreadyRegistered)
        ));

        let same_email = Registration {
            cpf: "123.456.789-09".to_owned(),
            ..registration()
        };
        assert!(matches!(
            auth.register(same_email).await,
            Err(IdentityError::EmailAlreadyRegistered)
        ));
        assert_eq!(backend.account_count().await, 1);
    }

    #[tokio::test]
    async fn update_requires_login_and_refreshes_cache() {
        let dir = tempfile::tempdir().unwrap();
        let (auth, _) = auth(&dir);
        auth.register(registration()).await.unwrap();

        let update = ProfileUpdate {
            phone: Some("(11) 98888-7777".to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            auth.update_profile(update.clone()).await,
            Err(IdentityError::NotLoggedIn)
        ));

        auth.login("maria@example.com", "segredo").await.unwrap();
        let profile = auth.update_profile(update).await.unwrap();
        assert_eq!(profile.phone.as_deref(), Some("(11) 98888-7777"));
        assert_eq!(auth.current_profile().await.unwrap(), Some(profile));
    }

    /// Backend whose profile updates always fail, counting the calls.
    struct FailingUpdates {
        inner: InMemoryBackend,
        updates: AtomicUsize,
    }

    #[async_trait]
    impl IdentityBackend for FailingUpdates {
        async fn sign_up(
            &self,
            email: &str,
            password: &str,
            profile: Profile,
        ) -> IdentityResult<Id<Profile>> {
            self.inner.sign_up(email, password, profile).await
        }

        async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session> {
            self.inner.sign_in(email, password).await
        }

        async fn get_profile(&self, user: &Id<Profile>) -> IdentityResult<Profile> {
            self.inner.get_profile(user).await
        }

        async fn update_profile(
            &self,
            _user: &Id<Profile>,
            _update: ProfileUpdate,
        ) -> IdentityResult<Profile> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            Err(IdentityError::Backend("connection reset".to_owned()))
        }

        async fn find_user(&self, identifier: &Identifier) -> IdentityResult<Option<UserRef>> {
            self.inner.find_user(identifier).await
        }

        async fn request_password_reset(
            &self,
            email: &str,
            redirect_to: Option<&str>,
        ) -> IdentityResult<()> {
            self.inner.request_password_reset(email, redirect_to).await
        }
    }

    #[tokio::test]
    async fn failed_updates_are_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FailingUpdates {
            inner: InMemoryBackend::new(),
            updates: AtomicUsize::new(0),
        });
        let auth = Auth::new(
            backend.clone(),
            Settings::new(dir.path().join("settings.json")),
        );
        auth.register(registration()).await.unwrap();
        let before = auth.login("maria@example.com", "segredo").await.unwrap();

        let result = auth
            .update_profile(ProfileUpdate {
                name: Some("Maria S.".to_owned()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(IdentityError::Backend(_))));
        assert_eq!(backend.updates.load(Ordering::SeqCst), 1);
        assert_eq!(auth.current_profile().await.unwrap(), Some(before));
    }
}
