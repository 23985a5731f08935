//! Error handling and edge case tests.

use flexsync::{
    SubscriptionError, SubscriptionOptions, SubscriptionState, Subscriptions,
    SubscriptionsConfig, Version,
};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Barrier};
use std::thread;
use tempfile::TempDir;

fn seeded() -> Subscriptions {
    let subs = Subscriptions::in_memory();
    subs.update(|s| {
        s.add("Dog", "age > 3")?;
        s.add_with("Cat", "color == 'black'", SubscriptionOptions::named("black-cats"))?;
        Ok(())
    })
    .unwrap();
    subs
}

// --- Rollback ---

#[test]
fn test_failed_callback_leaves_set_untouched() {
    let subs = Subscriptions::in_memory();

    let result = subs.update(|s| {
        s.add("Dog", "age>3")?;
        Err(SubscriptionError::InvalidState("abort".into()))
    });

    assert!(result.is_err());
    assert_eq!(subs.version(), Version(0));
    assert_eq!(subs.current().len(), 0);
    assert_eq!(subs.current().state(), SubscriptionState::Complete);
}

#[test]
fn test_rollback_after_mixed_operations() {
    let subs = seeded();
    let before = subs.current();
    let entries_before: Vec<_> = before.iter().cloned().collect();

    let result = subs.update(|s| {
        s.remove_all(true);
        s.add("Bird", "canFly == true")?;
        s.add_with(
            "Cat",
            "color == 'white'",
            SubscriptionOptions::named("black-cats"),
        )?;
        Err(SubscriptionError::InvalidState("abort".into()))
    });
    assert!(result.is_err());

    let after = subs.current();
    let entries_after: Vec<_> = after.iter().cloned().collect();
    assert_eq!(after.version(), before.version());
    assert_eq!(entries_after, entries_before);
}

#[test]
fn test_panicking_callback_rolls_back() {
    let subs = seeded();
    let version = subs.version();

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = subs.update(|s| {
            s.add("Bird", "canFly == true")?;
            panic!("callback blew up");
        });
    }));
    assert!(result.is_err());

    assert_eq!(subs.version(), version);
    assert_eq!(subs.current().len(), 2);

    // The write gate was released
    let set = subs.update(|_| Ok(())).unwrap();
    assert_eq!(set.version(), version.next());
}

#[derive(Debug)]
enum AppError {
    Subscriptions(SubscriptionError),
    Validation(&'static str),
}

impl From<SubscriptionError> for AppError {
    fn from(e: SubscriptionError) -> Self {
        AppError::Subscriptions(e)
    }
}

#[test]
fn test_try_update_with_caller_error() {
    let subs = seeded();

    let result = subs.try_update(|s| -> Result<(), AppError> {
        s.add("Bird", "canFly == true")?;
        Err(AppError::Validation("birds are not allowed"))
    });
    assert!(matches!(result, Err(AppError::Validation(_))));
    assert_eq!(subs.current().len(), 2);

    let result = subs.try_update(|s| -> Result<(), AppError> {
        s.add_with(
            "Dog",
            "age > 10",
            SubscriptionOptions::named("black-cats").with_update_existing(false),
        )?;
        Ok(())
    });
    assert!(matches!(
        result,
        Err(AppError::Subscriptions(SubscriptionError::DuplicateName(_)))
    ));
}

// --- Name Collisions ---

#[test]
fn test_duplicate_name_without_update_existing() {
    let subs = seeded();
    let version = subs.version();

    let result = subs.update(|s| {
        s.add_with(
            "Cat",
            "color == 'white'",
            SubscriptionOptions::named("black-cats").with_update_existing(false),
        )?;
        Ok(())
    });

    match result {
        Err(SubscriptionError::DuplicateName(name)) => assert_eq!(name, "black-cats"),
        other => panic!("Expected DuplicateName, got {:?}", other),
    }
    assert_eq!(subs.version(), version);
    assert_eq!(
        subs.current().find_by_name("black-cats").unwrap().query,
        "color == 'black'"
    );
}

#[test]
fn test_duplicate_query_ignores_name_and_flag() {
    let subs = seeded();

    let set = subs
        .update(|s| {
            let existing = s.add_with(
                "Cat",
                "color == 'black'",
                SubscriptionOptions::named("other-name").with_update_existing(false),
            )?;
            assert_eq!(existing.name, "black-cats");
            Ok(())
        })
        .unwrap();

    assert_eq!(set.len(), 2);
    assert!(set.find_by_name("other-name").is_none());
}

#[test]
fn test_duplicate_name_inside_scope_can_be_handled() {
    let subs = seeded();

    let set = subs
        .update(|s| {
            let dup = s.add_with(
                "Cat",
                "age > 1",
                SubscriptionOptions::named("black-cats").with_update_existing(false),
            );
            assert!(matches!(dup, Err(SubscriptionError::DuplicateName(_))));
            s.add_with("Cat", "age > 1", SubscriptionOptions::named("young-cats"))?;
            Ok(())
        })
        .unwrap();

    assert_eq!(set.len(), 3);
}

// --- Index Access ---

#[test]
fn test_get_out_of_range() {
    let subs = seeded();
    let set = subs.current();

    assert!(set.get(1).is_ok());
    match set.get(2) {
        Err(SubscriptionError::IndexOutOfRange { index, len }) => {
            assert_eq!(index, 2);
            assert_eq!(len, 2);
        }
        other => panic!("Expected IndexOutOfRange, got {:?}", other),
    }
}

// --- Write-scope Exclusivity ---

#[test]
fn test_concurrent_update_fails_fast() {
    let subs = seeded();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));

    let writer = {
        let subs = subs.clone();
        let entered = Arc::clone(&entered);
        let release = Arc::clone(&release);
        thread::spawn(move || {
            subs.update(|s| {
                entered.wait();
                release.wait();
                s.add("Bird", "canFly == true")?;
                Ok(())
            })
        })
    };

    entered.wait();
    let result = subs.update(|s| {
        s.add("Fish", "fins > 2")?;
        Ok(())
    });
    assert!(matches!(result, Err(SubscriptionError::InvalidState(_))));
    release.wait();

    let set = writer.join().unwrap().unwrap();
    assert_eq!(set.version(), Version(2));
    assert!(set.find_by_query("Fish", "fins > 2").is_none());
}

#[test]
fn test_superseded_snapshot_update_rejected() {
    let subs = seeded();
    let mut old = subs.current();
    subs.update(|_| Ok(())).unwrap();

    let result = old.update(|_| Ok(()));
    assert!(matches!(result, Err(SubscriptionError::InvalidState(_))));
    assert_eq!(old.state(), SubscriptionState::Superseded);
}

// --- Reports ---

#[test]
fn test_stale_reports_are_ignored() {
    let subs = seeded();
    let reporter = subs.reporter();
    subs.update(|_| Ok(())).unwrap();

    assert!(!reporter.acknowledge(Version(1)));
    assert!(!reporter.reject(Version(1), "late"));
    assert!(!reporter.acknowledge(Version(9)));
    assert_eq!(subs.current().state(), SubscriptionState::Pending);
}

// --- Persistence ---

#[test]
fn test_second_owner_locked_out() {
    let dir = TempDir::new().unwrap();
    let _first = Subscriptions::open(SubscriptionsConfig::at(dir.path())).unwrap();

    let result = Subscriptions::open(SubscriptionsConfig::at(dir.path()));
    assert!(matches!(result, Err(SubscriptionError::Locked)));
}

#[test]
fn test_missing_store_without_create() {
    let dir = TempDir::new().unwrap();
    let config = SubscriptionsConfig {
        create_if_missing: false,
        ..SubscriptionsConfig::at(dir.path().join("absent"))
    };

    assert!(matches!(
        Subscriptions::open(config),
        Err(SubscriptionError::Io(_))
    ));
}
