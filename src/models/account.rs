// src/models/account.rs

use std::fmt;

use serde::{Deserialize, Serialize};

/// A coin balance holder. Balances live on users and on tests.
///
/// The derived ordering is the global lock order: every user account sorts
/// before every test account, then by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AccountRef {
    User(i64),
    Test(i64),
}

impl AccountRef {
    pub fn id(&self) -> i64 {
        match self {
            AccountRef::User(id) | AccountRef::Test(id) => *id,
        }
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::User(id) => write!(f, "user:{id}"),
            AccountRef::Test(id) => write!(f, "test:{id}"),
        }
    }
}

/// Returns the two accounts in the order their locks must be taken.
pub fn lock_order(a: AccountRef, b: AccountRef) -> [AccountRef; 2] {
    if a <= b { [a, b] } else { [b, a] }
}
