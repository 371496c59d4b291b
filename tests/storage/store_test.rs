// Store Tests
// Tests for the sled-backed deployment store

use splitter::custody::{Custody, MemoryCustody};
use splitter::identity::{Address, Keypair};
use splitter::splitter::{Splitter, SplitterEvent};
use splitter::storage::{SplitterStore, StoreError};
use tempfile::TempDir;

fn deploy_fresh(store: &SplitterStore) -> (Address, Address, [Address; 3]) {
    let owner = Keypair::generate().address();
    let sender = Keypair::generate().address();
    let recipients = [
        Keypair::generate().address(),
        Keypair::generate().address(),
        Keypair::generate().address(),
    ];
    let mut custody = MemoryCustody::new();
    custody.fund(&sender, 1_000).unwrap();

    let splitter = Splitter::deploy(owner, recipients, custody).unwrap();
    store.save_deployment(&splitter).unwrap();
    (owner, sender, recipients)
}

// ============================================================================
// STORE CREATION
// ============================================================================

#[test]
fn test_store_open_new() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();

    assert!(store.is_empty().unwrap());
    assert!(store.deployment().unwrap().is_none());
    assert!(store.events().unwrap().is_empty());
}

// ============================================================================
// ACCOUNTS
// ============================================================================

#[test]
fn test_account_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let keypair = Keypair::generate();

    store.save_account("alice", &keypair).unwrap();
    let loaded = store.load_account("alice").unwrap().unwrap();

    assert_eq!(loaded.address(), keypair.address());
    assert!(store.load_account("bob").unwrap().is_none());
}

#[test]
fn test_list_accounts_sorted_by_label() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let carol = Keypair::generate();
    let alice = Keypair::generate();
    store.save_account("carol", &carol).unwrap();
    store.save_account("alice", &alice).unwrap();

    let accounts = store.list_accounts().unwrap();

    assert_eq!(
        accounts,
        vec![
            ("alice".to_string(), alice.address()),
            ("carol".to_string(), carol.address()),
        ]
    );
}

// ============================================================================
// DEPLOYMENT
// ============================================================================

#[test]
fn test_save_deployment_records_parties() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();

    let (owner, _, recipients) = deploy_fresh(&store);

    let record = store.deployment().unwrap().unwrap();
    assert_eq!(record.owner, owner);
    assert_eq!(record.recipients, recipients);
}

#[test]
fn test_second_deployment_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    deploy_fresh(&store);
    let splitter = store.load_splitter().unwrap();

    let result = store.save_deployment(&splitter);

    assert!(matches!(result, Err(StoreError::AlreadyDeployed)));
}

#[test]
fn test_load_without_deployment_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();

    assert!(matches!(store.load_splitter(), Err(StoreError::NotDeployed)));
}

// ============================================================================
// PERSISTENCE ACROSS REOPEN
// ============================================================================

#[test]
fn test_ledger_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let (sender, recipients) = {
        let store = SplitterStore::open(temp_dir.path()).unwrap();
        let (_, sender, recipients) = deploy_fresh(&store);
        let mut splitter = store.load_splitter().unwrap();
        splitter.deposit(&sender, 11).unwrap();
        store.save_splitter(&splitter).unwrap();
        store.flush().unwrap();
        (sender, recipients)
    };

    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let splitter = store.load_splitter().unwrap();

    assert_eq!(splitter.recipients(), recipients);
    assert_eq!(splitter.pending_refund(&sender), 2);
    assert_eq!(splitter.balance(), 2);
    assert_eq!(splitter.custody().balance(), 2);
    assert_eq!(splitter.custody().balance_of(&recipients[0]), 3);
    assert_eq!(splitter.custody().balance_of(&sender), 989);
}

#[test]
fn test_rejecting_flags_persist() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let who = Keypair::generate().address();
    let mut custody = store.load_custody().unwrap();
    custody.set_rejecting(&who, true);
    custody.fund(&who, 5).unwrap();

    store.save_custody(&custody).unwrap();
    let loaded = store.load_custody().unwrap();

    assert!(loaded.is_rejecting(&who));
    assert_eq!(loaded.balance_of(&who), 5);
}

// ============================================================================
// EVENTS
// ============================================================================

#[test]
fn test_event_sequence_continues_after_reload() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let (_, sender, _) = deploy_fresh(&store);

    let mut splitter = store.load_splitter().unwrap();
    splitter.deposit(&sender, 3).unwrap();
    store.save_splitter(&splitter).unwrap();

    let mut splitter = store.load_splitter().unwrap();
    assert_eq!(splitter.events().next_sequence(), 2);
    splitter.withdraw_refund(&sender).unwrap_err();
    splitter.deposit(&sender, 4).unwrap();
    store.save_splitter(&splitter).unwrap();

    let events = store.events().unwrap();
    let sequences: Vec<u64> = events.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
    assert_eq!(
        events[2].event,
        SplitterEvent::EtherReceived {
            sender,
            amount: 4
        }
    );
}

#[test]
fn test_saving_twice_does_not_duplicate_events() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let (_, sender, _) = deploy_fresh(&store);
    let mut splitter = store.load_splitter().unwrap();
    splitter.deposit(&sender, 9).unwrap();

    store.save_splitter(&splitter).unwrap();
    store.save_splitter(&splitter).unwrap();

    assert_eq!(store.events().unwrap().len(), 2);
}

// ============================================================================
// CONSISTENCY
// ============================================================================

#[test]
fn test_load_rejects_custody_behind_ledger() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let (_, sender, _) = deploy_fresh(&store);
    let stale = store.load_custody().unwrap();

    let mut splitter = store.load_splitter().unwrap();
    splitter.deposit(&sender, 10).unwrap();
    store.save_splitter(&splitter).unwrap();
    // custody rewritten on its own with a pre-deposit copy
    store.save_custody(&stale).unwrap();

    let result = store.load_splitter();

    assert!(matches!(
        result,
        Err(StoreError::Inconsistent { held: 1, custody: 0 })
    ));
}

#[test]
fn test_load_accepts_unrecognised_forced_value() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let (_, sender, _) = deploy_fresh(&store);

    store
        .transact(|s| -> anyhow::Result<()> { Ok(s.custody_mut().force_send(&sender, 6)?) })
        .unwrap();

    let splitter = store.load_splitter().unwrap();
    assert_eq!(splitter.balance(), 0);
    assert_eq!(splitter.custody().balance(), 6);
}

// ============================================================================
// TRANSACT
// ============================================================================

#[test]
fn test_transact_persists_on_success() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let (_, sender, recipients) = deploy_fresh(&store);

    let outcome = store
        .transact(|s| -> anyhow::Result<_> { Ok(s.deposit(&sender, 9)?) })
        .unwrap();

    assert_eq!(outcome.share(), 3);
    let splitter = store.load_splitter().unwrap();
    assert_eq!(splitter.total_received(), 9);
    assert_eq!(splitter.custody().balance_of(&recipients[2]), 3);
    assert_eq!(store.events().unwrap().len(), 2);
}

#[test]
fn test_failed_transact_persists_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();
    let (_, sender, recipients) = deploy_fresh(&store);

    // the deposit commits in memory, the refund withdrawal then fails
    let result = store.transact(|s| -> anyhow::Result<()> {
        s.deposit(&sender, 9)?;
        s.withdraw_refund(&sender)?;
        Ok(())
    });

    assert!(result.is_err());
    let splitter = store.load_splitter().unwrap();
    assert_eq!(splitter.total_received(), 0);
    assert_eq!(splitter.custody().balance_of(&sender), 1_000);
    assert_eq!(splitter.custody().balance_of(&recipients[0]), 0);
    assert!(store.events().unwrap().is_empty());
}

#[test]
fn test_transact_without_deployment_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store = SplitterStore::open(temp_dir.path()).unwrap();

    let result = store.transact(|s| -> Result<(), StoreError> {
        let _ = s.balance();
        Ok(())
    });

    assert!(matches!(result, Err(StoreError::NotDeployed)));
}
