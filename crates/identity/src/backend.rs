use std::collections::HashMap;

use async_trait::async_trait;
use model::profile::{Profile, ProfileUpdate};
use tokio::sync::RwLock;
use utility::id::Id;

use crate::{identifier::Identifier, IdentityError, IdentityResult};

/// Minimal account data returned by a lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRef {
    pub id: Id<Profile>,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user: Id<Profile>,
    pub access_token: String,
}

/// Remote authentication and profile store.
#[async_trait]
pub trait IdentityBackend: Send + Sync + 'static {
    /// Creates the account and its profile. `profile.id` is assigned by the
    /// backend.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: Profile,
    ) -> IdentityResult<Id<Profile>>;

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session>;

    async fn get_profile(&self, user: &Id<Profile>) -> IdentityResult<Profile>;

    async fn update_profile(
        &self,
        user: &Id<Profile>,
        update: ProfileUpdate,
    ) -> IdentityResult<Profile>;

    /// `Ok(None)` if nobody is registered under `identifier`.
    async fn find_user(&self, identifier: &Identifier) -> IdentityResult<Option<UserRef>>;

    /// Sends a recovery link to `email`. Succeeds for unknown addresses too,
    /// so the answer does not reveal who is registered. `redirect_to` is
    /// where the link leads after the reset.
    async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> IdentityResult<()>;
}

struct Account {
    password: String,
    profile: Profile,
}

/// Backend keeping accounts in memory. Used by the development server and
/// in tests.
#[derive(Default)]
pub struct InMemoryBackend {
    accounts: RwLock<HashMap<Id<Profile>, Account>>,
    password_resets: RwLock<Vec<String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }

    /// Addresses of registered accounts a recovery link was sent to.
    pub async fn password_resets(&self) -> Vec<String> {
        self.password_resets.read().await.clone()
    }
}

#[async_trait]
impl IdentityBackend for InMemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        mut profile: Profile,
    ) -> IdentityResult<Id<Profile>> {
        let email = email.trim().to_lowercase();
        let mut accounts = self.accounts.write().await;
        if accounts
            .values()
            .any(|account| account.profile.email == email)
        {
            return Err(IdentityError::EmailAlreadyRegistered);
        }

        let id: Id<Profile> = Id::new(format!("user-{}", accounts.len() + 1));
        profile.id = id.clone();
        profile.email = email;
        accounts.insert(
            id.clone(),
            Account {
                password: password.to_owned(),
                profile,
            },
        );
        Ok(id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> IdentityResult<Session> {
        let email = email.trim().to_lowercase();
        let accounts = self.accounts.read().await;
        let (id, account) = accounts
            .iter()
            .find(|(_, account)| account.profile.email == email)
            .ok_or(IdentityError::UserNotFound)?;
        if account.password != password {
            return Err(IdentityError::WrongPassword);
        }
        Ok(Session {
            user: id.clone(),
            access_token: format!("session-{id}"),
        })
    }

    async fn get_profile(&self, user: &Id<Profile>) -> IdentityResult<Profile> {
        self.accounts
            .read()
            .await
            .get(user)
            .map(|account| account.profile.clone())
            .ok_or(IdentityError::ProfileNotFound)
    }

    async fn update_profile(
        &self,
        user: &Id<Profile>,
        update: ProfileUpdate,
    ) -> IdentityResult<Profile> {
        let mut accounts = self.accounts.write().await;
        let account = accounts.get_mut(user).ok_or(IdentityError::ProfileNotFound)?;
        account.profile.apply(update);
        Ok(account.profile.clone())
    }

    async fn find_user(&self, identifier: &Identifier) -> IdentityResult<Option<UserRef>> {
        let accounts = self.accounts.read().await;
        let found = accounts.values().find(|account| match identifier {
            Identifier::Email(email) => &account.profile.email == email,
            Identifier::Cpf(cpf) => &account.profile.cpf == cpf,
        });
        Ok(found.map(|account| UserRef {
            id: account.profile.id.clone(),
            email: account.profile.email.clone(),
        }))
    }

    async fn request_password_reset(
        &self,
        email: &str,
        redirect_to: Option<&str>,
    ) -> IdentityResult<()> {
        let email = email.trim().to_lowercase();
        let known = self
            .accounts
            .read()
            .await
            .values()
            .any(|account| account.profile.email == email);
        if known {
            log::info!(
                "password reset for '{email}' (redirect to {})",
                redirect_to.unwrap_or("default")
            );
            self.password_resets.write().await.push(email);
        } else {
            log::debug!("password reset for unknown address ignored");
        }
        Ok(())
    }
}
