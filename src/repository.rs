use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;

use crate::account::CreditAccount;
use crate::application::CreditApplication;
use crate::errors::RepositoryError;
use crate::profile::User;
use crate::transaction::Transaction;
use crate::types::{AccountId, ApplicationId, UserId};

/// persistence for accounts and their ledger rows
pub trait AccountRepository: Send + Sync {
    fn load_account(&self, id: AccountId) -> Result<Option<CreditAccount>, RepositoryError>;
    fn save_account(&self, account: &CreditAccount) -> Result<(), RepositoryError>;
    /// removes the account and every transaction it owns
    fn delete_account(&self, id: AccountId) -> Result<(), RepositoryError>;
    /// fails with `Conflict` when the correlation id is already recorded
    fn append_transaction(&self, transaction: Transaction) -> Result<(), RepositoryError>;
    /// drop a row whose payment could not be applied; missing rows are fine
    fn remove_transaction(&self, correlation_id: &str) -> Result<(), RepositoryError>;
    fn find_transaction_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Transaction>, RepositoryError>;
    fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, RepositoryError>;
    fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<CreditAccount>, RepositoryError>;
    /// credit accounts repaying with an installment due by `as_of`
    fn due_credit_accounts(&self, as_of: NaiveDate) -> Result<Vec<CreditAccount>, RepositoryError>;
    fn all_accounts(&self) -> Result<Vec<CreditAccount>, RepositoryError>;
}

pub trait UserRepository: Send + Sync {
    fn load_user(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    /// case-insensitive
    fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
    fn save_user(&self, user: User) -> Result<(), RepositoryError>;
}

pub trait ApplicationRepository: Send + Sync {
    fn save_application(&self, application: &CreditApplication) -> Result<(), RepositoryError>;
    fn load_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<CreditApplication>, RepositoryError>;
    /// newest first
    fn applications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CreditApplication>, RepositoryError>;
}

#[derive(Debug, Default)]
struct StoreState {
    accounts: HashMap<AccountId, CreditAccount>,
    transactions: Vec<Transaction>,
    users: HashMap<UserId, User>,
    applications: HashMap<ApplicationId, CreditApplication>,
}

/// in-process store backing tests and demos
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl AccountRepository for InMemoryStore {
    fn load_account(&self, id: AccountId) -> Result<Option<CreditAccount>, RepositoryError> {
        Ok(self.lock()?.accounts.get(&id).cloned())
    }

    fn save_account(&self, account: &CreditAccount) -> Result<(), RepositoryError> {
        self.lock()?.accounts.insert(account.id, account.clone());
        Ok(())
    }

    fn delete_account(&self, id: AccountId) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if guard.accounts.remove(&id).is_none() {
            return Err(RepositoryError::NotFound);
        }
        guard.transactions.retain(|t| t.account_id != id);
        Ok(())
    }

    fn append_transaction(&self, transaction: Transaction) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        if guard
            .transactions
            .iter()
            .any(|t| t.correlation_id == transaction.correlation_id)
        {
            return Err(RepositoryError::Conflict {
                key: transaction.correlation_id,
            });
        }
        guard.transactions.push(transaction);
        Ok(())
    }

    fn remove_transaction(&self, correlation_id: &str) -> Result<(), RepositoryError> {
        self.lock()?
            .transactions
            .retain(|t| t.correlation_id != correlation_id);
        Ok(())
    }

    fn find_transaction_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Option<Transaction>, RepositoryError> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .find(|t| t.correlation_id == correlation_id)
            .cloned())
    }

    fn transactions_for(&self, account_id: AccountId) -> Result<Vec<Transaction>, RepositoryError> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect())
    }

    fn accounts_for_user(&self, user_id: UserId) -> Result<Vec<CreditAccount>, RepositoryError> {
        let mut accounts: Vec<CreditAccount> = self
            .lock()?
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    fn due_credit_accounts(&self, as_of: NaiveDate) -> Result<Vec<CreditAccount>, RepositoryError> {
        let mut due: Vec<CreditAccount> = self
            .lock()?
            .accounts
            .values()
            .filter(|a| a.is_due(as_of))
            .cloned()
            .collect();
        due.sort_by_key(|a| (a.next_payment_due_date, a.created_at));
        Ok(due)
    }

    fn all_accounts(&self) -> Result<Vec<CreditAccount>, RepositoryError> {
        let mut accounts: Vec<CreditAccount> = self.lock()?.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }
}

impl UserRepository for InMemoryStore {
    fn load_user(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    fn save_user(&self, user: User) -> Result<(), RepositoryError> {
        let mut guard = self.lock()?;
        let taken = guard
            .users
            .values()
            .any(|u| u.id != user.id && u.username.eq_ignore_ascii_case(&user.username));
        if taken {
            return Err(RepositoryError::Conflict { key: user.username });
        }
        guard.users.insert(user.id, user);
        Ok(())
    }
}

impl ApplicationRepository for InMemoryStore {
    fn save_application(&self, application: &CreditApplication) -> Result<(), RepositoryError> {
        self.lock()?
            .applications
            .insert(application.id, application.clone());
        Ok(())
    }

    fn load_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<CreditApplication>, RepositoryError> {
        Ok(self.lock()?.applications.get(&id).cloned())
    }

    fn applications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CreditApplication>, RepositoryError> {
        let mut applications: Vec<CreditApplication> = self
            .lock()?
            .applications
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(applications)
    }
}
