use std::sync::Arc;

use tracing::info;

use crate::{error::Result, models::account::Account, repository::AccountStore};

pub struct AccountService {
    accounts: Arc<dyn AccountStore>,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountStore>) -> Self {
        Self { accounts }
    }

    /// Registers an account with a freshly generated callback key.
    pub async fn create_account(&self) -> Result<Account> {
        let account = Account::generate();
        self.accounts.create_account(&account).await?;

        info!(account_id = %account.id, "Account created");
        Ok(account)
    }

    pub async fn get_account(&self, id: &str) -> Result<Account> {
        self.accounts.get_account(id).await
    }
}
