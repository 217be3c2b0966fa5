use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    account::{AccountId, AccountType, OwnerId},
    money::{Currency, Money, MoneyError},
    transaction::Movement,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandAction {
    CreateAccount,
    Deposit,
    Withdraw,
    Transfer,
    SuspendAccount,
    ActivateAccount,
    CloseAccount,
}

#[derive(Debug, Clone)]
pub struct CreateAccountCommand {
    pub owner_id: String,
    pub currency: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone)]
pub struct DepositCommand {
    pub account_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct WithdrawCommand {
    pub account_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct TransferCommand {
    pub source_account_id: String,
    pub target_account_id: String,
    pub amount: Decimal,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct SuspendAccountCommand {
    pub account_id: String,
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivateAccountCommand {
    pub account_id: String,
}

#[derive(Debug, Clone)]
pub struct CloseAccountCommand {
    pub account_id: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("`{field}` is required for {action:?}")]
    MissingField {
        action: CommandAction,
        field: &'static str,
    },
    #[error("Invalid currency for {action:?}: {source}")]
    InvalidCurrency {
        action: CommandAction,
        #[source]
        source: MoneyError,
    },
}

/// Request as received from outside, identifiers and currency still untyped.
#[derive(Debug, Clone)]
pub enum LedgerCommand {
    CreateAccount(CreateAccountCommand),
    Deposit(DepositCommand),
    Withdraw(WithdrawCommand),
    Transfer(TransferCommand),
    SuspendAccount(SuspendAccountCommand),
    ActivateAccount(ActivateAccountCommand),
    CloseAccount(CloseAccountCommand),
}

/// A validated command, mapping one-to-one onto a service call.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateAccount {
        owner_id: OwnerId,
        currency: Currency,
        account_type: AccountType,
    },
    Move(Movement),
    Suspend {
        account_id: AccountId,
        reason: Option<String>,
    },
    Activate {
        account_id: AccountId,
    },
    Close {
        account_id: AccountId,
    },
}

impl LedgerCommand {
    pub fn action(&self) -> CommandAction {
        match self {
            LedgerCommand::CreateAccount(_) => CommandAction::CreateAccount,
            LedgerCommand::Deposit(_) => CommandAction::Deposit,
            LedgerCommand::Withdraw(_) => CommandAction::Withdraw,
            LedgerCommand::Transfer(_) => CommandAction::Transfer,
            LedgerCommand::SuspendAccount(_) => CommandAction::SuspendAccount,
            LedgerCommand::ActivateAccount(_) => CommandAction::ActivateAccount,
            LedgerCommand::CloseAccount(_) => CommandAction::CloseAccount,
        }
    }

    /// Checks required fields and parses identifiers and currency.
    ///
    /// Amount sign, account existence and status are checked by the services.
    pub fn validate(self) -> Result<Operation, CommandError> {
        let action = self.action();
        match self {
            LedgerCommand::CreateAccount(cmd) => Ok(Operation::CreateAccount {
                owner_id: OwnerId::new(required(action, "owner_id", cmd.owner_id)?),
                currency: parse_currency(action, &cmd.currency)?,
                account_type: cmd.account_type,
            }),
            LedgerCommand::Deposit(cmd) => Ok(Operation::Move(Movement::Deposit {
                account_id: account_id(action, "account_id", cmd.account_id)?,
                amount: money(action, cmd.amount, &cmd.currency)?,
            })),
            LedgerCommand::Withdraw(cmd) => Ok(Operation::Move(Movement::Withdrawal {
                account_id: account_id(action, "account_id", cmd.account_id)?,
                amount: money(action, cmd.amount, &cmd.currency)?,
            })),
            LedgerCommand::Transfer(cmd) => Ok(Operation::Move(Movement::Transfer {
                source_id: account_id(action, "source_account_id", cmd.source_account_id)?,
                target_id: account_id(action, "target_account_id", cmd.target_account_id)?,
                amount: money(action, cmd.amount, &cmd.currency)?,
            })),
            LedgerCommand::SuspendAccount(cmd) => Ok(Operation::Suspend {
                account_id: account_id(action, "account_id", cmd.account_id)?,
                reason: cmd.reason.filter(|reason| !reason.trim().is_empty()),
            }),
            LedgerCommand::ActivateAccount(cmd) => Ok(Operation::Activate {
                account_id: account_id(action, "account_id", cmd.account_id)?,
            }),
            LedgerCommand::CloseAccount(cmd) => Ok(Operation::Close {
                account_id: account_id(action, "account_id", cmd.account_id)?,
            }),
        }
    }
}

fn required(
    action: CommandAction,
    field: &'static str,
    value: String,
) -> Result<String, CommandError> {
    if value.trim().is_empty() {
        Err(CommandError::MissingField { action, field })
    } else {
        Ok(value)
    }
}

fn account_id(
    action: CommandAction,
    field: &'static str,
    value: String,
) -> Result<AccountId, CommandError> {
    required(action, field, value).map(AccountId::new)
}

fn parse_currency(action: CommandAction, value: &str) -> Result<Currency, CommandError> {
    if value.trim().is_empty() {
        return Err(CommandError::MissingField {
            action,
            field: "currency",
        });
    }
    value
        .parse()
        .map_err(|source| CommandError::InvalidCurrency { action, source })
}

fn money(action: CommandAction, amount: Decimal, currency: &str) -> Result<Money, CommandError> {
    Ok(Money::new(amount, parse_currency(action, currency)?))
}
