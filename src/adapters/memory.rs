// src/adapters/memory.rs

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::{sync::Mutex, time::Instant};

use crate::{
    config::SIGNUP_COINS,
    error::{AppError, AppResult},
    models::{
        account::AccountRef,
        attempt::{AnswerSheet, Assignment, Attempt},
        exam::{Test, TestDefinition},
        payment::{PaymentIntent, PaymentStatus, SettlementEvent, SettlementOutcome},
        user::User,
    },
    ports::{
        Clock, ExamStore, KeyValueStore, LedgerStore, NewAttempt, NewPaymentIntent, NewTest,
        PaymentStore, UserStore,
    },
};

#[derive(Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    tests: BTreeMap<i64, Test>,
    /// Keyed by `(test_id, candidate_id)`.
    assignments: BTreeMap<(i64, i64), Assignment>,
    attempts: BTreeMap<i64, Attempt>,
    intents: BTreeMap<i64, PaymentIntent>,
    kv: HashMap<String, (String, Instant)>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn balance(&self, account: AccountRef) -> AppResult<i64> {
        match account {
            AccountRef::User(id) => self.users.get(&id).map(|u| u.coins),
            AccountRef::Test(id) => self.tests.get(&id).map(|t| t.coins),
        }
        .ok_or(AppError::AccountNotFound(account))
    }

    fn balance_mut(&mut self, account: AccountRef) -> AppResult<&mut i64> {
        match account {
            AccountRef::User(id) => self.users.get_mut(&id).map(|u| &mut u.coins),
            AccountRef::Test(id) => self.tests.get_mut(&id).map(|t| &mut t.coins),
        }
        .ok_or(AppError::AccountNotFound(account))
    }

    /// Adds `amount` to a balance and returns the new value.
    fn credit(&mut self, account: AccountRef, amount: i64) -> AppResult<i64> {
        let balance = self.balance_mut(account)?;
        *balance += amount;
        Ok(*balance)
    }

    fn live_value(&self, key: &str) -> Option<&str> {
        self.kv
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.as_str())
    }

    fn owned_attempt_mut(&mut self, attempt_id: i64, candidate_id: i64) -> AppResult<&mut Attempt> {
        self.attempts
            .get_mut(&attempt_id)
            .filter(|a| a.candidate_id == candidate_id)
            .ok_or_else(|| AppError::NotFound("Attempt not found".to_string()))
    }
}

/// Process-local implementation of every store port.
///
/// All state sits behind one async mutex, so each trait method is a single
/// atomic step, matching a committed transaction in the Postgres adapter.
/// Key expiry follows `tokio::time`, so paused-clock tests can advance it.
#[derive(Default, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn balance(&self, account: AccountRef) -> AppResult<i64> {
        self.state.lock().await.balance(account)
    }

    async fn credit(&self, account: AccountRef, amount: i64) -> AppResult<i64> {
        self.state.lock().await.credit(account, amount)
    }

    async fn transfer(&self, from: AccountRef, to: AccountRef, amount: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let available = state.balance(from)?;
        state.balance(to)?;
        if available < amount {
            return Err(AppError::InsufficientFunds {
                account: from,
                balance: available,
                requested: amount,
            });
        }
        *state.balance_mut(from)? -= amount;
        *state.balance_mut(to)? += amount;
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn insert_intent(&self, intent: NewPaymentIntent) -> AppResult<PaymentIntent> {
        let mut state = self.state.lock().await;
        let id = state.next_id();
        let intent = PaymentIntent {
            id,
            order_ref: None,
            payment_ref: None,
            owner_id: intent.owner_id,
            amount_minor: intent.amount_minor,
            currency: intent.currency,
            coins: intent.coins,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        };
        state.intents.insert(id, intent.clone());
        Ok(intent)
    }

    async fn attach_order_ref(&self, intent_id: i64, order_ref: &str) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state
            .intents
            .values()
            .any(|i| i.order_ref.as_deref() == Some(order_ref))
        {
            return Err(AppError::Integrity(format!(
                "order reference {order_ref} already attached"
            )));
        }
        let intent = state
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;
        intent.order_ref = Some(order_ref.to_string());
        Ok(())
    }

    async fn abandon_intent(&self, intent_id: i64) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(intent) = state
            .intents
            .get_mut(&intent_id)
            .filter(|i| i.status == PaymentStatus::Pending)
        {
            intent.status = PaymentStatus::Failed;
        }
        Ok(())
    }

    async fn settle(
        &self,
        order_ref: &str,
        event: &SettlementEvent,
    ) -> AppResult<(PaymentIntent, SettlementOutcome)> {
        let mut state = self.state.lock().await;
        let mut intent = state
            .intents
            .values()
            .find(|i| i.order_ref.as_deref() == Some(order_ref))
            .cloned()
            .ok_or_else(|| AppError::NotFound("Payment intent not found".to_string()))?;

        let outcome = intent.apply(event)?;
        if outcome == SettlementOutcome::Credited {
            state.credit(AccountRef::User(intent.owner_id), intent.coins)?;
        }
        if outcome.changed() {
            state.intents.insert(intent.id, intent.clone());
        }
        Ok((intent, outcome))
    }

    async fn intents_for_owner(&self, owner_id: i64) -> AppResult<Vec<PaymentIntent>> {
        let state = self.state.lock().await;
        Ok(state
            .intents
            .values()
            .rev()
            .filter(|i| i.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_or_create_user(&self, email: &str) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.values().find(|u| u.email == email) {
            return Ok(user.clone());
        }
        let id = state.next_id();
        let user = User {
            id,
            email: email.to_string(),
            name: email.to_string(),
            birth_date: None,
            coins: SIGNUP_COINS,
            is_active: true,
            created_at: Utc::now(),
        };
        state.users.insert(id, user.clone());
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn update_profile(
        &self,
        id: i64,
        name: Option<&str>,
        birth_date: Option<NaiveDate>,
    ) -> AppResult<User> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
        if let Some(name) = name {
            user.name = name.to_string();
        }
        if birth_date.is_some() {
            user.birth_date = birth_date;
        }
        Ok(user.clone())
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn insert_test(&self, test: NewTest) -> AppResult<Test> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&test.examiner_id) {
            return Err(AppError::NotFound("User not found".to_string()));
        }
        let id = state.next_id();
        let test = Test {
            id,
            examiner_id: test.examiner_id,
            name: test.name,
            coins: 0,
            definition: None,
            duration_minutes: test.duration_minutes,
            starts_at: test.starts_at,
            ends_at: test.ends_at,
            created_at: Utc::now(),
        };
        state.tests.insert(id, test.clone());
        Ok(test)
    }

    async fn test_by_id(&self, id: i64) -> AppResult<Option<Test>> {
        Ok(self.state.lock().await.tests.get(&id).cloned())
    }

    async fn tests_by_examiner(&self, examiner_id: i64) -> AppResult<Vec<Test>> {
        let state = self.state.lock().await;
        Ok(state
            .tests
            .values()
            .rev()
            .filter(|t| t.examiner_id == examiner_id)
            .cloned()
            .collect())
    }

    async fn set_definition(&self, test_id: i64, definition: &TestDefinition) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let test = state
            .tests
            .get_mut(&test_id)
            .ok_or_else(|| AppError::NotFound("Test not found".to_string()))?;
        test.definition = Some(definition.clone());
        Ok(())
    }

    async fn upsert_assignment(
        &self,
        test_id: i64,
        candidate_id: i64,
        attempts: i32,
    ) -> AppResult<Assignment> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.assignments.get(&(test_id, candidate_id)) {
            return Ok(existing.clone());
        }
        let id = state.next_id();
        let assignment = Assignment {
            id,
            test_id,
            candidate_id,
            attempts_allotted: attempts,
            attempts_remaining: attempts,
        };
        state
            .assignments
            .insert((test_id, candidate_id), assignment.clone());
        Ok(assignment)
    }

    async fn assignment(&self, test_id: i64, candidate_id: i64) -> AppResult<Option<Assignment>> {
        let state = self.state.lock().await;
        Ok(state.assignments.get(&(test_id, candidate_id)).cloned())
    }

    async fn assignments_for_candidate(&self, candidate_id: i64) -> AppResult<Vec<Assignment>> {
        let state = self.state.lock().await;
        Ok(state
            .assignments
            .values()
            .filter(|a| a.candidate_id == candidate_id)
            .cloned()
            .collect())
    }

    async fn create_attempt(&self, attempt: NewAttempt) -> AppResult<Attempt> {
        let mut state = self.state.lock().await;
        let key = (attempt.test_id, attempt.candidate_id);
        match state.assignments.get(&key) {
            Some(a) if a.attempts_remaining > 0 => {}
            _ => return Err(AppError::NotAssigned),
        }

        let id = state.next_id();
        let created = Attempt {
            id,
            test_id: attempt.test_id,
            candidate_id: attempt.candidate_id,
            questions: attempt.questions,
            started_at: None,
            duration_minutes: attempt.duration_minutes,
            answers: None,
            achieved_marks: None,
            created_at: Utc::now(),
        };
        state.attempts.insert(id, created.clone());
        if let Some(assignment) = state.assignments.get_mut(&key) {
            assignment.attempts_remaining -= 1;
        }
        Ok(created)
    }

    async fn attempt_by_id(&self, id: i64) -> AppResult<Option<Attempt>> {
        Ok(self.state.lock().await.attempts.get(&id).cloned())
    }

    async fn start_attempt(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt> {
        let mut state = self.state.lock().await;
        let attempt = state.owned_attempt_mut(attempt_id, candidate_id)?;
        attempt.start(now)?;
        Ok(attempt.clone())
    }

    async fn save_answers(
        &self,
        attempt_id: i64,
        candidate_id: i64,
        answers: AnswerSheet,
        now: DateTime<Utc>,
    ) -> AppResult<Attempt> {
        let mut state = self.state.lock().await;
        let attempt = state.owned_attempt_mut(attempt_id, candidate_id)?;
        attempt.accept_answers(answers, now)?;
        Ok(attempt.clone())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state
            .kv
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        state.kv.retain(|_, (_, expires_at)| now < *expires_at);
        if state.kv.contains_key(key) {
            return Ok(false);
        }
        state.kv.insert(key.to_string(), (value.to_string(), now + ttl));
        Ok(true)
    }

    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let state = self.state.lock().await;
        Ok(state.live_value(key).map(str::to_string))
    }

    async fn touch_if_eq(&self, key: &str, value: &str, ttl: Duration) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.live_value(key) != Some(value) {
            return Ok(false);
        }
        if let Some(entry) = state.kv.get_mut(key) {
            entry.1 = Instant::now() + ttl;
        }
        Ok(true)
    }

    async fn take_if_eq(&self, key: &str, value: &str) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.live_value(key) != Some(value) {
            return Ok(false);
        }
        state.kv.remove(key);
        Ok(true)
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::Currency;

    #[tokio::test]
    async fn users_are_created_once_with_the_signup_allowance() {
        let store = MemoryStore::new();
        let first = store.find_or_create_user("a@example.com").await.unwrap();
        let again = store.find_or_create_user("a@example.com").await.unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(first.coins, SIGNUP_COINS);
        assert_eq!(first.name, "a@example.com");
    }

    #[tokio::test]
    async fn settle_credits_the_owner_exactly_once() {
        let store = MemoryStore::new();
        let owner = store.find_or_create_user("a@example.com").await.unwrap();
        let intent = store
            .insert_intent(NewPaymentIntent {
                owner_id: owner.id,
                amount_minor: 10_000,
                currency: Currency::Inr,
                coins: 100,
            })
            .await
            .unwrap();
        store.attach_order_ref(intent.id, "order_1").await.unwrap();

        let paid = SettlementEvent::Paid {
            payment_ref: "pay_1".to_string(),
        };
        let (_, first) = store.settle("order_1", &paid).await.unwrap();
        let (_, second) = store.settle("order_1", &paid).await.unwrap();

        assert_eq!(first, SettlementOutcome::Credited);
        assert_eq!(second, SettlementOutcome::AlreadyCompleted);
        assert_eq!(store.balance(AccountRef::User(owner.id)).await.unwrap(), 1600);
    }

    #[tokio::test]
    async fn unknown_order_refs_are_not_found() {
        let store = MemoryStore::new();
        let paid = SettlementEvent::Paid {
            payment_ref: "pay_1".to_string(),
        };
        assert!(matches!(
            store.settle("order_x", &paid).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_read_as_absent() {
        let store = MemoryStore::new();
        store.put("k", "v", Duration::from_secs(10)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.take_if_eq("k", "v").await.unwrap());
        assert!(store.put_if_absent("k", "w", Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn put_if_absent_drops_expired_keys() {
        let store = MemoryStore::new();
        for key in ["a", "b", "c"] {
            store.put(key, "v", Duration::from_secs(5)).await.unwrap();
        }
        store.put("kept", "v", Duration::from_secs(60)).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.put_if_absent("new", "v", Duration::from_secs(5)).await.unwrap());
        assert!(!store.put_if_absent("kept", "w", Duration::from_secs(5)).await.unwrap());

        let mut keys: Vec<String> = store.state.lock().await.kv.keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, ["kept", "new"]);
    }

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::minutes(3));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(3));
    }
}
