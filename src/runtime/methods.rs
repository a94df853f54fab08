//! Closed method set and its dispatch table.
//!
//! Every [`JsonRpcMethod`] is wired to exactly one partition by an exhaustive
//! match, so adding a method without a handler does not compile. The table
//! is still validated when built, mirroring what the transport relies on:
//! partitions are disjoint and together cover every method.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{RequestError, Result};
use crate::types::{Context, Service};

/// Every method the gatekeeper understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JsonRpcMethod {
    Authorization,
    SignTransaction,
    Algod,
    Indexer,
    Accounts,
    AuthorizationAllow,
    AuthorizationDeny,
    CreateWallet,
    CreateAccount,
    Login,
    GetSession,
    SaveAccount,
    ImportAccount,
    DeleteAccount,
    Transactions,
    AccountDetails,
    AssetDetails,
    SignSendTransaction,
}

impl JsonRpcMethod {
    pub const ALL: [JsonRpcMethod; 18] = [
        JsonRpcMethod::Authorization,
        JsonRpcMethod::SignTransaction,
        JsonRpcMethod::Algod,
        JsonRpcMethod::Indexer,
        JsonRpcMethod::Accounts,
        JsonRpcMethod::AuthorizationAllow,
        JsonRpcMethod::AuthorizationDeny,
        JsonRpcMethod::CreateWallet,
        JsonRpcMethod::CreateAccount,
        JsonRpcMethod::Login,
        JsonRpcMethod::GetSession,
        JsonRpcMethod::SaveAccount,
        JsonRpcMethod::ImportAccount,
        JsonRpcMethod::DeleteAccount,
        JsonRpcMethod::Transactions,
        JsonRpcMethod::AccountDetails,
        JsonRpcMethod::AssetDetails,
        JsonRpcMethod::SignSendTransaction,
    ];

    /// Wire name, e.g. `sign-transaction`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::SignTransaction => "sign-transaction",
            Self::Algod => "algod",
            Self::Indexer => "indexer",
            Self::Accounts => "accounts",
            Self::AuthorizationAllow => "authorization-allow",
            Self::AuthorizationDeny => "authorization-deny",
            Self::CreateWallet => "create-wallet",
            Self::CreateAccount => "create-account",
            Self::Login => "login",
            Self::GetSession => "get-session",
            Self::SaveAccount => "save-account",
            Self::ImportAccount => "import-account",
            Self::DeleteAccount => "delete-account",
            Self::Transactions => "transactions",
            Self::AccountDetails => "account-details",
            Self::AssetDetails => "asset-details",
            Self::SignSendTransaction => "sign-send-transaction",
        }
    }

    /// Identifier form, e.g. `SignTransaction`.
    pub fn name(self) -> &'static str {
        match self {
            Self::Authorization => "Authorization",
            Self::SignTransaction => "SignTransaction",
            Self::Algod => "Algod",
            Self::Indexer => "Indexer",
            Self::Accounts => "Accounts",
            Self::AuthorizationAllow => "AuthorizationAllow",
            Self::AuthorizationDeny => "AuthorizationDeny",
            Self::CreateWallet => "CreateWallet",
            Self::CreateAccount => "CreateAccount",
            Self::Login => "Login",
            Self::GetSession => "GetSession",
            Self::SaveAccount => "SaveAccount",
            Self::ImportAccount => "ImportAccount",
            Self::DeleteAccount => "DeleteAccount",
            Self::Transactions => "Transactions",
            Self::AccountDetails => "AccountDetails",
            Self::AssetDetails => "AssetDetails",
            Self::SignSendTransaction => "SignSendTransaction",
        }
    }

    /// Accepts either the wire name or the identifier form.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == s || m.name() == s)
    }

    /// Handler wiring. Exhaustive on purpose: a new method must pick a route.
    fn route(self) -> Route {
        match self {
            Self::Authorization => Route::Public(PublicHandler::Handshake),
            Self::SignTransaction => Route::Public(PublicHandler::SignTransaction),
            Self::Algod => Route::Public(PublicHandler::Query(Service::Algod)),
            Self::Indexer => Route::Public(PublicHandler::Query(Service::Indexer)),
            Self::Accounts => Route::Public(PublicHandler::Accounts),
            Self::AuthorizationAllow => Route::Private(PrivateHandler::Allow),
            Self::AuthorizationDeny => Route::Private(PrivateHandler::Deny),
            Self::CreateWallet
            | Self::CreateAccount
            | Self::Login
            | Self::GetSession
            | Self::SaveAccount
            | Self::ImportAccount
            | Self::DeleteAccount
            | Self::Transactions
            | Self::AccountDetails
            | Self::AssetDetails
            | Self::SignSendTransaction => Route::Extension,
        }
    }

    pub fn partition(self) -> Partition {
        match self.route() {
            Route::Public(_) => Partition::Public,
            Route::Private(_) => Partition::Private,
            Route::Extension => Partition::Extension,
        }
    }
}

impl core::fmt::Display for JsonRpcMethod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method-name space reachable from one transport context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    /// Untrusted pages.
    Public,
    /// The approval surface only.
    Private,
    /// The extension's own UI only.
    Extension,
}

impl From<Context> for Partition {
    fn from(context: Context) -> Self {
        match context {
            Context::Page => Partition::Public,
            Context::ApprovalSurface => Partition::Private,
            Context::Extension => Partition::Extension,
        }
    }
}

/// Handlers reachable from untrusted origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicHandler {
    Handshake,
    SignTransaction,
    Query(Service),
    Accounts,
}

/// Handlers reachable from the approval surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateHandler {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy)]
enum Route {
    Public(PublicHandler),
    Private(PrivateHandler),
    Extension,
}

/// Method name -> handler, split by partition.
#[derive(Debug, Clone)]
pub struct MethodTable {
    public: HashMap<JsonRpcMethod, PublicHandler>,
    private: HashMap<JsonRpcMethod, PrivateHandler>,
    extension: HashSet<JsonRpcMethod>,
}

impl MethodTable {
    /// Build the table from [`JsonRpcMethod::ALL`] and check it is complete.
    pub fn build() -> Result<Self> {
        let mut table = Self {
            public: HashMap::new(),
            private: HashMap::new(),
            extension: HashSet::new(),
        };

        for method in JsonRpcMethod::ALL {
            let fresh = match method.route() {
                Route::Public(handler) => table.public.insert(method, handler).is_none(),
                Route::Private(handler) => table.private.insert(method, handler).is_none(),
                Route::Extension => table.extension.insert(method),
            };
            if !fresh {
                return Err(RequestError::Internal(format!("method {} wired twice", method)));
            }
        }

        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let wired = self
            .public
            .keys()
            .chain(self.private.keys())
            .chain(self.extension.iter());
        for method in wired {
            if !seen.insert(*method) {
                return Err(RequestError::Internal(format!(
                    "method {} is reachable from more than one partition",
                    method
                )));
            }
        }

        if let Some(missing) = JsonRpcMethod::ALL.into_iter().find(|m| !seen.contains(m)) {
            return Err(RequestError::Internal(format!("method {} has no handler", missing)));
        }

        let names: HashSet<&str> = seen.iter().map(|m| m.as_str()).collect();
        if names.len() != seen.len() {
            return Err(RequestError::Internal("duplicate wire names in method table".into()));
        }

        Ok(())
    }

    fn resolve(name: &str) -> Result<JsonRpcMethod> {
        JsonRpcMethod::parse(name).ok_or_else(|| RequestError::MethodNotFound {
            method: name.to_string(),
        })
    }

    pub fn public(&self, name: &str) -> Result<(JsonRpcMethod, PublicHandler)> {
        let method = Self::resolve(name)?;
        self.public
            .get(&method)
            .map(|h| (method, *h))
            .ok_or_else(|| RequestError::MethodNotFound {
                method: name.to_string(),
            })
    }

    pub fn private(&self, name: &str) -> Result<(JsonRpcMethod, PrivateHandler)> {
        let method = Self::resolve(name)?;
        self.private
            .get(&method)
            .map(|h| (method, *h))
            .ok_or_else(|| RequestError::MethodNotFound {
                method: name.to_string(),
            })
    }

    pub fn extension(&self, name: &str) -> Result<JsonRpcMethod> {
        let method = Self::resolve(name)?;
        if self.extension.contains(&method) {
            Ok(method)
        } else {
            Err(RequestError::MethodNotFound {
                method: name.to_string(),
            })
        }
    }

    /// Methods reachable from `partition`.
    pub fn methods(&self, partition: Partition) -> Vec<JsonRpcMethod> {
        let mut methods: Vec<JsonRpcMethod> = match partition {
            Partition::Public => self.public.keys().copied().collect(),
            Partition::Private => self.private.keys().copied().collect(),
            Partition::Extension => self.extension.iter().copied().collect(),
        };
        methods.sort_by_key(|m| m.as_str());
        methods
    }
}
