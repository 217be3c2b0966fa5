use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::money::{Currency, Money};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(format!("acc_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountStatus {
    Active,
    Suspended,
    Closed,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
            AccountStatus::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Personal,
    Business,
    Enterprise,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountError {
    #[error("Account {0} is closed, no further status changes are allowed")]
    AccountClosed(AccountId),
    #[error("Account {id} cannot be closed while holding {balance}")]
    NonZeroBalance { id: AccountId, balance: Money },
    #[error("Account {id} holds {expected}, cannot store a {found} balance")]
    CurrencyMismatch {
        id: AccountId,
        expected: Currency,
        found: Currency,
    },
}

/// Single-currency account.
///
/// Balance is changed only through [`Account::update_balance`]; deciding what
/// the new balance should be (and whether it may go negative) is up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    id: AccountId,
    owner_id: OwnerId,
    account_type: AccountType,
    balance: Money,
    status: AccountStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    pub fn open(owner_id: OwnerId, currency: Currency) -> Self {
        Self::open_with_type(owner_id, currency, AccountType::default())
    }

    pub fn open_with_type(
        owner_id: OwnerId,
        currency: Currency,
        account_type: AccountType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::generate(),
            owner_id,
            account_type,
            balance: Money::zero(currency),
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    pub fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    pub fn account_type(&self) -> AccountType {
        self.account_type
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    pub fn currency(&self) -> Currency {
        self.balance.currency()
    }

    pub fn status(&self) -> AccountStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    pub fn update_balance(&mut self, new_balance: Money) -> Result<(), AccountError> {
        if new_balance.currency() != self.currency() {
            return Err(AccountError::CurrencyMismatch {
                id: self.id.clone(),
                expected: self.currency(),
                found: new_balance.currency(),
            });
        }
        self.balance = new_balance;
        self.touch();
        Ok(())
    }

    pub fn suspend(&mut self) -> Result<(), AccountError> {
        self.transition(AccountStatus::Suspended)
    }

    pub fn activate(&mut self) -> Result<(), AccountError> {
        self.transition(AccountStatus::Active)
    }

    pub fn close(&mut self) -> Result<(), AccountError> {
        if self.status != AccountStatus::Closed && !self.balance.is_zero() {
            return Err(AccountError::NonZeroBalance {
                id: self.id.clone(),
                balance: self.balance,
            });
        }
        self.transition(AccountStatus::Closed)
    }

    fn transition(&mut self, status: AccountStatus) -> Result<(), AccountError> {
        // closure is terminal
        if self.status == AccountStatus::Closed {
            return Err(AccountError::AccountClosed(self.id.clone()));
        }
        self.status = status;
        self.touch();
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn with_id(mut self, id: AccountId) -> Self {
        self.id = id;
        self
    }

    fn touch(&mut self) {
        // keep updated_at monotonic even if the wall clock steps back
        self.updated_at = Utc::now().max(self.updated_at);
    }
}
