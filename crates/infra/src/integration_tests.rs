//! End-to-end tests across the ledger, interest engine, audit recorder and outbox.
//!
//! Pipeline under test: Operation → UnitOfWork → Database::commit → store + audit + bus

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread;

    use chrono::{Duration, Utc};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use corebank_banking::{
        Account, AuditAction, AuditEntry, CompoundingPeriod, EncodedAccountNumber, InterestRule,
        ScheduledInterest, Transaction, TransactionKind,
    };
    use corebank_core::{
        AccountId, Audited, Currency, DomainError, InterestRuleId, Page, PageRequest, TransactionId, UserId,
    };
    use corebank_events::banking::{REASON_DEPOSIT, REASON_TRANSFER_RECEIVED, REASON_TRANSFER_SENT};
    use corebank_events::{
        BankingEvent, EventBus, EventEnvelope, InMemoryEventBus, Subscription,
    };

    use crate::bank::CoreBank;
    use crate::cipher::AccountNumberCipher;
    use crate::config::CoreConfig;
    use crate::context::OperationContext;
    use crate::error::{OperationError, StoreError};
    use crate::outbox::{InMemoryOwnerDirectory, OutboxRecord};
    use crate::store::{BankStore, CommitReceipt, InMemoryBankStore, WriteBatch};

    type Bus = Arc<InMemoryEventBus<EventEnvelope<BankingEvent>>>;

    struct Harness<S: BankStore + Clone + 'static> {
        bank: Arc<CoreBank<S, Bus>>,
        store: S,
        directory: Arc<InMemoryOwnerDirectory>,
        events: Subscription<EventEnvelope<BankingEvent>>,
    }

    fn cipher() -> AccountNumberCipher {
        AccountNumberCipher::new(&[7u8; 32], &[9u8; 16]).unwrap()
    }

    fn harness_with<S: BankStore + Clone + 'static>(store: S, config: CoreConfig) -> Harness<S> {
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let events = bus.subscribe();
        let directory = Arc::new(InMemoryOwnerDirectory::new());
        let bank = Arc::new(CoreBank::new(
            &config,
            store.clone(),
            bus,
            directory.clone(),
            cipher(),
        ));
        Harness {
            bank,
            store,
            directory,
            events,
        }
    }

    fn harness() -> Harness<Arc<InMemoryBankStore>> {
        harness_with(Arc::new(InMemoryBankStore::new()), CoreConfig::default())
    }

    impl<S: BankStore + Clone + 'static> Harness<S> {
        /// Opens an EGP account and returns (id, plaintext number).
        fn open(&self, owner: UserId, balance: Decimal) -> (AccountId, String) {
            let opened = self
                .bank
                .accounts()
                .open(&OperationContext::for_user(owner), owner, "EGP", balance)
                .unwrap();
            (opened.account.id_typed(), opened.number.as_str().to_string())
        }

        fn balance(&self, id: AccountId) -> Decimal {
            self.bank.accounts().get_by_id(id).unwrap().balance().value()
        }

        fn transactions(&self, id: AccountId) -> Page<Transaction> {
            self.bank
                .queries()
                .list_transactions_for_account(id, 1, 100)
                .unwrap()
        }

        fn balance_events(&self) -> Vec<corebank_events::BalanceChanged> {
            self.events
                .drain()
                .into_iter()
                .filter_map(|env| match env.into_payload() {
                    BankingEvent::BalanceChanged(e) => Some(e),
                    BankingEvent::AccountOpened(_) => None,
                })
                .collect()
        }

        fn audit(&self) -> Vec<AuditEntry> {
            self.bank.queries().list_audit_log(1, 1000).unwrap().items
        }
    }

    #[test]
    fn deposit_credits_balance_and_records_one_row() {
        let h = harness();
        let owner = UserId::new();
        h.directory.register(owner, "owner@bank.test");
        let (id, number) = h.open(owner, dec!(100));
        h.events.drain();

        let ok = h
            .bank
            .ledger()
            .deposit(&OperationContext::for_user(owner), &number, dec!(50), Some("salary"))
            .unwrap();

        assert!(ok);
        assert_eq!(h.balance(id), dec!(150));

        let txs = h.transactions(id);
        assert_eq!(txs.total_count, 1);
        let tx = &txs.items[0];
        assert_eq!(tx.kind(), TransactionKind::Deposit);
        assert_eq!(tx.amount().value(), dec!(50));
        assert_eq!(tx.executed_by(), owner);
        assert_eq!(tx.description(), Some("salary"));
        assert_eq!(tx.sequence(), Some(1));

        let events = h.balance_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, REASON_DEPOSIT);
        assert_eq!(events[0].amount_changed, dec!(50));
        assert_eq!(events[0].new_balance, dec!(150));
        assert_eq!(events[0].email.as_deref(), Some("owner@bank.test"));
    }

    #[test]
    fn overdrawn_withdrawal_changes_nothing() {
        let h = harness();
        let owner = UserId::new();
        let (id, number) = h.open(owner, dec!(100));
        h.events.drain();

        let err = h
            .bank
            .ledger()
            .withdraw(&OperationContext::for_user(owner), &number, dec!(150), None)
            .unwrap_err();

        assert!(matches!(
            err,
            OperationError::Domain(DomainError::InsufficientFunds { .. })
        ));
        assert_eq!(h.balance(id), dec!(100));
        assert_eq!(h.transactions(id).total_count, 0);
        assert!(h.balance_events().is_empty());
    }

    #[test]
    fn invalid_amounts_and_unknown_accounts_are_rejected() {
        let h = harness();
        let owner = UserId::new();
        let (_, number) = h.open(owner, dec!(100));
        let ctx = OperationContext::for_user(owner);
        let ledger = h.bank.ledger();

        for amount in [dec!(0), dec!(-5)] {
            let err = ledger.deposit(&ctx, &number, amount, None).unwrap_err();
            assert_eq!(err.code(), "validation_error");
        }

        let err = ledger.deposit(&ctx, "1234567890123456", dec!(5), None).unwrap_err();
        assert_eq!(err.code(), "not_found");
    }

    #[test]
    fn closed_accounts_reject_money_movement() {
        let h = harness();
        let owner = UserId::new();
        let (id, number) = h.open(owner, dec!(100));
        let ctx = OperationContext::for_user(owner);

        h.bank.accounts().close(&ctx, id).unwrap();

        // Inactive accounts look missing to money movement.
        let err = h.bank.ledger().deposit(&ctx, &number, dec!(5), None).unwrap_err();
        assert_eq!(err.code(), "not_found");
        assert_eq!(h.balance(id), dec!(100));
    }

    #[test]
    fn transfer_moves_funds_atomically() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        let (a, a_number) = h.open(alice, dec!(100));
        let (b, _) = h.open(bob, dec!(10));
        h.events.drain();

        h.bank
            .ledger()
            .transfer(&OperationContext::for_user(alice), &a_number, bob, dec!(40), None)
            .unwrap();

        assert_eq!(h.balance(a), dec!(60));
        assert_eq!(h.balance(b), dec!(50));

        let from_a = h.transactions(a);
        let to_b = h.transactions(b);
        assert_eq!(from_a.total_count, 1);
        assert_eq!(to_b.total_count, 1);
        assert_eq!(from_a.items[0].id_typed(), to_b.items[0].id_typed());
        assert_eq!(from_a.items[0].kind(), TransactionKind::Transfer);
        assert_eq!(from_a.items[0].from_account_id(), Some(a));
        assert_eq!(from_a.items[0].to_account_id(), Some(b));

        let events = h.balance_events();
        assert_eq!(events.len(), 2);
        let sent = events.iter().find(|e| e.reason == REASON_TRANSFER_SENT).unwrap();
        let received = events
            .iter()
            .find(|e| e.reason == REASON_TRANSFER_RECEIVED)
            .unwrap();
        assert_eq!((sent.account_id, sent.amount_changed, sent.new_balance), (a, dec!(-40), dec!(60)));
        assert_eq!(
            (received.account_id, received.amount_changed, received.new_balance),
            (b, dec!(40), dec!(50))
        );
    }

    #[test]
    fn failed_transfers_leave_both_sides_untouched() {
        let h = harness();
        let alice = UserId::new();
        let bob = UserId::new();
        let (a, a_number) = h.open(alice, dec!(30));
        let ctx = OperationContext::for_user(alice);

        // Recipient without an EGP account.
        let err = h
            .bank
            .ledger()
            .transfer(&ctx, &a_number, bob, dec!(10), None)
            .unwrap_err();
        assert_eq!(err.code(), "not_found");

        let (b, _) = h.open(bob, dec!(0));
        let err = h
            .bank
            .ledger()
            .transfer(&ctx, &a_number, bob, dec!(31), None)
            .unwrap_err();
        assert_eq!(err.code(), "insufficient_funds");

        assert_eq!(h.balance(a), dec!(30));
        assert_eq!(h.balance(b), dec!(0));
        assert_eq!(h.transactions(a).total_count, 0);
    }

    #[test]
    fn daily_interest_is_applied_once_per_period() {
        let h = harness();
        let owner = UserId::new();
        let (id, _) = h.open(owner, dec!(100));
        let system = OperationContext::system();
        let rule = h
            .bank
            .interest_rules()
            .create(&system, "EGP", dec!(1), CompoundingPeriod::Daily)
            .unwrap();
        h.events.drain();

        let now = Utc::now();
        assert_eq!(h.bank.interest().apply_interest(&system, now), 1);
        assert_eq!(h.balance(id), dec!(101));

        let accruals = h.bank.queries().list_scheduled_interest(1, 10).unwrap();
        assert_eq!(accruals.total_count, 1);
        assert_eq!(accruals.items[0].account_id(), id);
        assert_eq!(accruals.items[0].rule_id(), rule.id_typed());
        assert_eq!(accruals.items[0].amount().value(), dec!(1));

        let events = h.balance_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason, "Interest Applied (Daily)");

        // Same period: nothing to do.
        assert_eq!(h.bank.interest().apply_interest(&system, now), 0);
        assert_eq!(h.balance(id), dec!(101));
        assert_eq!(
            h.bank.queries().list_scheduled_interest(1, 10).unwrap().total_count,
            1
        );

        // Next day compounds on the new balance.
        let run = h
            .bank
            .interest()
            .try_apply_interest(&system, now + Duration::days(1))
            .unwrap();
        assert_eq!(run.accounts_credited, 1);
        assert_eq!(h.balance(id), dec!(102.01));
    }

    #[test]
    fn zero_interest_records_accrual_without_event() {
        let h = harness();
        let (id, _) = h.open(UserId::new(), dec!(0));
        let system = OperationContext::system();
        h.bank
            .interest_rules()
            .create(&system, "EGP", dec!(5), CompoundingPeriod::Monthly)
            .unwrap();
        h.events.drain();

        let run = h.bank.interest().try_apply_interest(&system, Utc::now()).unwrap();

        assert_eq!(run.accruals_recorded, 1);
        assert_eq!(run.accounts_credited, 0);
        assert_eq!(h.balance(id), dec!(0));
        assert!(h.balance_events().is_empty());
    }

    #[test]
    fn only_one_active_rule_per_currency() {
        let h = harness();
        let system = OperationContext::system();
        let rules = h.bank.interest_rules();

        let first = rules
            .create(&system, "EGP", dec!(2), CompoundingPeriod::Yearly)
            .unwrap();
        let err = rules
            .create(&system, "EGP", dec!(3), CompoundingPeriod::Daily)
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");

        rules.deactivate(&system, first.id_typed()).unwrap();
        rules
            .create(&system, "EGP", dec!(3), CompoundingPeriod::Daily)
            .unwrap();
        assert_eq!(rules.list_active().unwrap().len(), 1);

        for bad in [dec!(0), dec!(-1), dec!(100.5)] {
            let err = rules
                .create(&system, "USD", bad, CompoundingPeriod::Daily)
                .unwrap_err();
            assert_eq!(err.code(), "validation_error");
        }
    }

    #[test]
    fn balance_change_is_audited_with_actor_and_request_metadata() {
        let h = harness();
        let owner = UserId::new();
        let (id, number) = h.open(owner, dec!(100));
        let ctx = OperationContext::for_user(owner).with_request("10.0.0.1", "tests");

        h.bank.ledger().deposit(&ctx, &number, dec!(50), None).unwrap();

        let audit = h.audit();
        let modified = audit
            .iter()
            .find(|e| {
                e.entity_type == Account::ENTITY_TYPE
                    && e.entity_id == id.to_string()
                    && e.action == AuditAction::Modified
            })
            .unwrap();
        assert_eq!(modified.changed_fields, vec!["Balance".to_string()]);
        assert!(modified.old_values.contains_key("Balance"));
        assert!(modified.new_values.contains_key("Balance"));
        assert!(!modified.new_values.contains_key("Version"));
        assert_eq!(modified.actor, owner.to_string());
        assert_eq!(modified.ip_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(modified.user_agent.as_deref(), Some("tests"));

        let tx = &h.transactions(id).items[0];
        let added = audit
            .iter()
            .find(|e| e.entity_type == Transaction::ENTITY_TYPE)
            .unwrap();
        assert_eq!(added.action, AuditAction::Added);
        assert_eq!(added.entity_id, tx.id_typed().to_string());
        assert_eq!(
            added.new_values.get("Sequence"),
            Some(&serde_json::json!(tx.sequence().unwrap()))
        );
    }

    #[test]
    fn opening_an_account_is_audited_anonymously_without_actor() {
        let h = harness();
        let owner = UserId::new();
        h.bank
            .accounts()
            .open(&OperationContext::system(), owner, "EGP", dec!(5))
            .unwrap();

        let audit = h.audit();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::Added);
        assert_eq!(audit[0].actor, "anonymous");
        assert!(audit[0].old_values.is_empty());
        assert!(audit[0].changed_fields.is_empty());
    }

    #[test]
    fn account_number_is_stored_encrypted_and_resolvable() {
        let h = harness();
        let owner = UserId::new();
        let (id, number) = h.open(owner, dec!(1));

        let stored = h.store.account(id).unwrap().unwrap();
        assert_ne!(stored.account_number().as_str(), number);

        let revealed = h.bank.accounts().reveal_number(&stored).unwrap();
        assert_eq!(revealed.as_str(), number);
        assert_eq!(h.bank.accounts().get_by_number(&number).unwrap().id_typed(), id);

        let opened = h
            .events
            .drain()
            .into_iter()
            .find_map(|env| match env.into_payload() {
                BankingEvent::AccountOpened(e) => Some(e),
                BankingEvent::BalanceChanged(_) => None,
            })
            .unwrap();
        assert_eq!(opened.account_number, number);
    }

    #[test]
    fn removal_is_restricted_while_transactions_exist() {
        let h = harness();
        let owner = UserId::new();
        let ctx = OperationContext::for_user(owner);
        let (used, number) = h.open(owner, dec!(10));
        let (unused, _) = h.open(owner, dec!(0));

        h.bank.ledger().deposit(&ctx, &number, dec!(1), None).unwrap();

        let err = h.bank.accounts().remove(&ctx, used).unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert!(h.store.account(used).unwrap().is_some());

        h.bank.accounts().remove(&ctx, unused).unwrap();
        assert!(h.store.account(unused).unwrap().is_none());
        let deleted = h
            .audit()
            .into_iter()
            .find(|e| e.action == AuditAction::Deleted)
            .unwrap();
        assert_eq!(deleted.entity_id, unused.to_string());
        assert!(deleted.new_values.is_empty());
    }

    #[test]
    fn listings_validate_paging_and_unknown_accounts() {
        let h = harness();
        let queries = h.bank.queries();

        assert_eq!(queries.list_audit_log(0, 10).unwrap_err().code(), "validation_error");
        assert_eq!(queries.list_audit_log(1, 0).unwrap_err().code(), "validation_error");
        assert_eq!(
            queries.list_scheduled_interest(-1, 10).unwrap_err().code(),
            "validation_error"
        );
        assert_eq!(
            queries
                .list_transactions_for_account(AccountId::new(), 1, 10)
                .unwrap_err()
                .code(),
            "not_found"
        );
        assert_eq!(
            queries.get_transaction(TransactionId::new()).unwrap_err().code(),
            "not_found"
        );
    }

    #[test]
    fn transaction_history_pages_newest_first() {
        let h = harness();
        let owner = UserId::new();
        let ctx = OperationContext::for_user(owner);
        let (id, number) = h.open(owner, dec!(0));
        for amount in 1..=5 {
            h.bank
                .ledger()
                .deposit(&ctx, &number, Decimal::from(amount), None)
                .unwrap();
        }

        let first = h.bank.queries().list_transactions_for_account(id, 1, 2).unwrap();
        assert_eq!(first.total_count, 5);
        assert_eq!(first.total_pages(), 3);
        let amounts: Vec<Decimal> = first.items.iter().map(|t| t.amount().value()).collect();
        assert_eq!(amounts, vec![dec!(5), dec!(4)]);

        let last = h.bank.queries().list_transactions_for_account(id, 3, 2).unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0].amount().value(), dec!(1));
    }

    #[test]
    fn concurrent_transfers_conserve_money() {
        let config = CoreConfig {
            max_conflict_retries: 50,
            ..CoreConfig::default()
        };
        let h = harness_with(Arc::new(InMemoryBankStore::new()), config);
        let alice = UserId::new();
        let bob = UserId::new();
        let (a, a_number) = h.open(alice, dec!(1000));
        let (b, b_number) = h.open(bob, dec!(1000));

        let a_to_b = Arc::new(AtomicUsize::new(0));
        let b_to_a = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let bank = Arc::clone(&h.bank);
                let (from, to, counter) = if i % 2 == 0 {
                    (a_number.clone(), bob, Arc::clone(&a_to_b))
                } else {
                    (b_number.clone(), alice, Arc::clone(&b_to_a))
                };
                thread::spawn(move || {
                    let ctx = OperationContext::system();
                    for _ in 0..20 {
                        if bank.ledger().transfer(&ctx, &from, to, dec!(1), None).is_ok() {
                            counter.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let sent = Decimal::from(a_to_b.load(Ordering::SeqCst) as u64);
        let received = Decimal::from(b_to_a.load(Ordering::SeqCst) as u64);
        assert_eq!(h.balance(a) + h.balance(b), dec!(2000));
        assert_eq!(h.balance(a), dec!(1000) - sent + received);

        let rows = h.transactions(a).total_count;
        assert_eq!(rows, a_to_b.load(Ordering::SeqCst) + b_to_a.load(Ordering::SeqCst));
    }

    #[test]
    fn concurrent_deposits_on_disjoint_accounts_all_land() {
        let h = harness();
        let accounts: Vec<(AccountId, String)> =
            (0..4).map(|_| h.open(UserId::new(), dec!(0))).collect();

        let handles: Vec<_> = accounts
            .iter()
            .cloned()
            .map(|(_, number)| {
                let bank = Arc::clone(&h.bank);
                thread::spawn(move || {
                    for _ in 0..25 {
                        bank.ledger()
                            .deposit(&OperationContext::system(), &number, dec!(2), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for (id, _) in &accounts {
            assert_eq!(h.balance(*id), dec!(50));
            assert_eq!(h.transactions(*id).total_count, 25);
        }
    }

    /// Delegates to the in-memory store but can be told to reject audit writes.
    struct FlakyAuditStore {
        inner: InMemoryBankStore,
        fail_audit: AtomicBool,
    }

    impl BankStore for FlakyAuditStore {
        fn account(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
            self.inner.account(id)
        }

        fn account_by_number(
            &self,
            number: &EncodedAccountNumber,
        ) -> Result<Option<Account>, StoreError> {
            self.inner.account_by_number(number)
        }

        fn accounts_owned_by(&self, owner: UserId) -> Result<Vec<Account>, StoreError> {
            self.inner.accounts_owned_by(owner)
        }

        fn active_accounts_in(&self, currency: &Currency) -> Result<Vec<Account>, StoreError> {
            self.inner.active_accounts_in(currency)
        }

        fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
            self.inner.transaction(id)
        }

        fn transactions_for(
            &self,
            account: AccountId,
            page: PageRequest,
        ) -> Result<Page<Transaction>, StoreError> {
            self.inner.transactions_for(account, page)
        }

        fn interest_rule(&self, id: InterestRuleId) -> Result<Option<InterestRule>, StoreError> {
            self.inner.interest_rule(id)
        }

        fn interest_rules(&self) -> Result<Vec<InterestRule>, StoreError> {
            self.inner.interest_rules()
        }

        fn latest_scheduled_interest(
            &self,
            account: AccountId,
            rule: InterestRuleId,
        ) -> Result<Option<ScheduledInterest>, StoreError> {
            self.inner.latest_scheduled_interest(account, rule)
        }

        fn scheduled_interest(
            &self,
            page: PageRequest,
        ) -> Result<Page<ScheduledInterest>, StoreError> {
            self.inner.scheduled_interest(page)
        }

        fn apply(&self, batch: WriteBatch) -> Result<CommitReceipt, StoreError> {
            self.inner.apply(batch)
        }

        fn append_audit(&self, entries: Vec<AuditEntry>) -> Result<Vec<u64>, StoreError> {
            if self.fail_audit.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("audit table offline".to_string()));
            }
            self.inner.append_audit(entries)
        }

        fn audit_log(&self, page: PageRequest) -> Result<Page<AuditEntry>, StoreError> {
            self.inner.audit_log(page)
        }

        fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxRecord>, StoreError> {
            self.inner.pending_outbox(limit)
        }

        fn mark_dispatched(&self, ids: &[Uuid]) -> Result<(), StoreError> {
            self.inner.mark_dispatched(ids)
        }
    }

    #[test]
    fn audit_write_failure_is_reported_separately_from_business_failure() {
        let store = Arc::new(FlakyAuditStore {
            inner: InMemoryBankStore::new(),
            fail_audit: AtomicBool::new(false),
        });
        let h = harness_with(Arc::clone(&store), CoreConfig::default());
        let owner = UserId::new();
        let (id, number) = h.open(owner, dec!(100));
        h.events.drain();

        store.fail_audit.store(true, Ordering::SeqCst);
        let err = h
            .bank
            .ledger()
            .deposit(&OperationContext::for_user(owner), &number, dec!(50), None)
            .unwrap_err();

        assert!(matches!(err, OperationError::AuditWrite(_)));
        assert_eq!(err.code(), "audit_write_failed");
        // The business change is durable, applied exactly once, and its event went out.
        assert_eq!(h.balance(id), dec!(150));
        assert_eq!(h.transactions(id).total_count, 1);
        assert_eq!(h.balance_events().len(), 1);
        assert!(store.pending_outbox(10).unwrap().is_empty());
    }

    #[test]
    fn cancelled_operations_write_nothing() {
        let h = harness();
        let owner = UserId::new();
        let (id, number) = h.open(owner, dec!(100));
        let cancellation = corebank_core::Cancellation::new();
        cancellation.cancel();
        let ctx = OperationContext::for_user(owner).with_cancellation(cancellation);

        let err = h.bank.ledger().deposit(&ctx, &number, dec!(5), None).unwrap_err();

        assert_eq!(err, OperationError::Cancelled);
        assert_eq!(h.balance(id), dec!(100));
        assert_eq!(h.transactions(id).total_count, 0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(usize, u32),
        Withdraw(usize, u32),
        Transfer(usize, usize, u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..3usize, 1..500u32).prop_map(|(a, n)| Op::Deposit(a, n)),
            (0..3usize, 1..500u32).prop_map(|(a, n)| Op::Withdraw(a, n)),
            (0..3usize, 0..3usize, 1..500u32).prop_map(|(a, b, n)| Op::Transfer(a, b, n)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn total_balance_tracks_external_flows(ops in proptest::collection::vec(op(), 1..25)) {
            let h = harness();
            let owners: Vec<UserId> = (0..3).map(|_| UserId::new()).collect();
            let accounts: Vec<(AccountId, String)> =
                owners.iter().map(|o| h.open(*o, dec!(100))).collect();
            let ctx = OperationContext::system();
            let ledger = h.bank.ledger();

            let mut expected = dec!(300);
            for op in ops {
                match op {
                    Op::Deposit(a, n) => {
                        let amount = Decimal::from(n);
                        ledger.deposit(&ctx, &accounts[a].1, amount, None).unwrap();
                        expected += amount;
                    }
                    Op::Withdraw(a, n) => {
                        let amount = Decimal::from(n);
                        if ledger.withdraw(&ctx, &accounts[a].1, amount, None).is_ok() {
                            expected -= amount;
                        }
                    }
                    Op::Transfer(a, b, n) => {
                        let _ = ledger.transfer(&ctx, &accounts[a].1, owners[b], Decimal::from(n), None);
                    }
                }
            }

            let total: Decimal = accounts.iter().map(|(id, _)| h.balance(*id)).sum();
            prop_assert_eq!(total, expected);
            for (id, _) in &accounts {
                prop_assert!(h.balance(*id) >= Decimal::ZERO);
            }
        }
    }
}
