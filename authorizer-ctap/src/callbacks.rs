//! Collaborator traits for user interaction and credential storage
//!
//! These traits define the interface between the authenticator core and the
//! host: its dialogs and prompts, and its credential store.

use crate::prompt::PendingPrompt;
use crate::status::Result;
use crate::types::{CredentialSource, NewCredential};

/// Why the authenticator is asking the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    MakeCredential,
    GetAssertion,
    U2fPresence,
    Reset,
    ResetPin,
    ChangePin,
    DeleteCredential,
    DeleteAllCredentials,
    /// Empty pinAuth probe from a platform
    PinNotSet,
    /// Third consecutive PIN mismatch; informational
    PinAuthBlocked,
    /// Another credential with an excluded id exists; informational
    CredentialExcluded,
}

/// What the host should show for a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub kind: PromptKind,
    pub rp_id: Option<String>,
    pub rp_name: Option<String>,
    pub user_name: Option<String>,
    pub user_display_name: Option<String>,
    /// Text supplied through the `txAuthSimple` extension
    pub transaction_text: Option<String>,
}

impl ConsentRequest {
    /// A request with nothing but its kind
    pub fn new(kind: PromptKind) -> Self {
        Self {
            kind,
            rp_id: None,
            rp_name: None,
            user_name: None,
            user_display_name: None,
            transaction_text: None,
        }
    }

    pub fn with_rp(mut self, rp_id: impl Into<String>, rp_name: Option<String>) -> Self {
        self.rp_id = Some(rp_id.into());
        self.rp_name = rp_name;
        self
    }

    pub fn with_user(mut self, name: Option<String>, display_name: Option<String>) -> Self {
        self.user_name = name;
        self.user_display_name = display_name;
        self
    }

    pub fn with_transaction_text(mut self, text: Option<String>) -> Self {
        self.transaction_text = text;
        self
    }
}

/// Host UI
///
/// Each method returns immediately with a [`PendingPrompt`]; the host keeps
/// the matching [`Prompt`](crate::prompt::Prompt) and resolves it when the
/// user answers. Dropping the resolver counts as a refusal.
pub trait UserInteraction: Send + Sync {
    /// A yes/no dialog
    fn show_dialog(&self, request: &ConsentRequest) -> PendingPrompt<bool>;

    /// A biometric-style prompt
    fn show_prompt(&self, request: &ConsentRequest) -> PendingPrompt<bool>;

    /// Pick one of several credentials; resolves to an index into `candidates`
    fn select_credential(
        &self,
        rp_id: &str,
        candidates: &[CredentialSource],
    ) -> PendingPrompt<usize>;
}

/// Host credential store
///
/// The authenticator never caches what it reads here across operations.
pub trait CredentialSafe: Send + Sync {
    /// Create and persist a new credential
    fn generate_credential(&self, request: NewCredential) -> Result<CredentialSource>;

    /// Look up a credential by id
    fn credential_by_id(&self, id: &[u8]) -> Result<Option<CredentialSource>>;

    /// All credentials for a relying party
    fn credentials_for_rp(&self, rp_id: &str) -> Result<Vec<CredentialSource>>;

    /// Every stored credential
    fn all_credentials(&self) -> Result<Vec<CredentialSource>>;

    /// Delete one credential; deleting an unknown id is not an error
    fn delete_credential(&self, id: &[u8]) -> Result<()>;

    /// Delete everything
    fn delete_all_credentials(&self) -> Result<()>;

    /// Increment and persist the use counter, returning the new value
    fn increment_counter(&self, id: &[u8]) -> Result<u32>;
}

/// Combined collaborator interface
pub trait AuthenticatorCallbacks: UserInteraction + CredentialSafe {}

impl<T> AuthenticatorCallbacks for T where T: UserInteraction + CredentialSafe {}

/// Callbacks assembled from a separate UI and credential store
#[derive(Debug, Clone, Default)]
pub struct CallbackSet<U, S> {
    interaction: U,
    safe: S,
}

impl<U: UserInteraction, S: CredentialSafe> CallbackSet<U, S> {
    pub fn new(interaction: U, safe: S) -> Self {
        Self { interaction, safe }
    }

    pub fn interaction(&self) -> &U {
        &self.interaction
    }

    pub fn safe(&self) -> &S {
        &self.safe
    }
}

impl<U: UserInteraction, S: CredentialSafe> UserInteraction for CallbackSet<U, S> {
    fn show_dialog(&self, request: &ConsentRequest) -> PendingPrompt<bool> {
        self.interaction.show_dialog(request)
    }

    fn show_prompt(&self, request: &ConsentRequest) -> PendingPrompt<bool> {
        self.interaction.show_prompt(request)
    }

    fn select_credential(
        &self,
        rp_id: &str,
        candidates: &[CredentialSource],
    ) -> PendingPrompt<usize> {
        self.interaction.select_credential(rp_id, candidates)
    }
}

impl<U: UserInteraction, S: CredentialSafe> CredentialSafe for CallbackSet<U, S> {
    fn generate_credential(&self, request: NewCredential) -> Result<CredentialSource> {
        self.safe.generate_credential(request)
    }

    fn credential_by_id(&self, id: &[u8]) -> Result<Option<CredentialSource>> {
        self.safe.credential_by_id(id)
    }

    fn credentials_for_rp(&self, rp_id: &str) -> Result<Vec<CredentialSource>> {
        self.safe.credentials_for_rp(rp_id)
    }

    fn all_credentials(&self) -> Result<Vec<CredentialSource>> {
        self.safe.all_credentials()
    }

    fn delete_credential(&self, id: &[u8]) -> Result<()> {
        self.safe.delete_credential(id)
    }

    fn delete_all_credentials(&self) -> Result<()> {
        self.safe.delete_all_credentials()
    }

    fn increment_counter(&self, id: &[u8]) -> Result<u32> {
        self.safe.increment_counter(id)
    }
}
