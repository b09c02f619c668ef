//! Ledger events that make cached reads stale.

use serde::{Deserialize, Serialize};

use crate::keys::normalize_address;

/// An event emitted by the ledger contract.
///
/// Addresses are stored lowercased. Amounts are kept as decimal strings
/// because they are never interpreted, only logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LedgerEvent {
    Transfer {
        from: String,
        to: String,
        token: String,
        amount: String,
    },
    Deposit {
        user: String,
        token: String,
        amount: String,
    },
    Withdraw {
        user: String,
        token: String,
        amount: String,
    },
}

impl LedgerEvent {
    pub fn transfer(from: &str, to: &str, token: &str, amount: impl Into<String>) -> Self {
        Self::Transfer {
            from: normalize_address(from),
            to: normalize_address(to),
            token: normalize_address(token),
            amount: amount.into(),
        }
    }

    pub fn deposit(user: &str, token: &str, amount: impl Into<String>) -> Self {
        Self::Deposit {
            user: normalize_address(user),
            token: normalize_address(token),
            amount: amount.into(),
        }
    }

    pub fn withdraw(user: &str, token: &str, amount: impl Into<String>) -> Self {
        Self::Withdraw {
            user: normalize_address(user),
            token: normalize_address(token),
            amount: amount.into(),
        }
    }

    /// Returns the event name as declared by the contract.
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::Transfer { .. } => "Transfer",
            LedgerEvent::Deposit { .. } => "Deposit",
            LedgerEvent::Withdraw { .. } => "Withdraw",
        }
    }

    /// Returns the distinct, non-empty principals touched by this event.
    ///
    /// Order follows the event arguments: sender, recipient, then token.
    pub fn principals(&self) -> Vec<String> {
        let raw: [&str; 3] = match self {
            LedgerEvent::Transfer { from, to, token, .. } => [from, to, token],
            LedgerEvent::Deposit { user, token, .. } | LedgerEvent::Withdraw { user, token, .. } => {
                [user, token, ""]
            },
        };

        let mut principals: Vec<String> = Vec::with_capacity(3);
        for address in raw {
            let normalized = normalize_address(address);
            if !normalized.is_empty() && !principals.contains(&normalized) {
                principals.push(normalized);
            }
        }
        principals
    }
}
