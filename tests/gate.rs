use proptest::prelude::*;
use snackgate::AdmissionGate;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn checked_out_never_exceeds_capacity(
        capacity in 1usize..4,
        holds in prop::collection::vec(prop::collection::vec(0u64..300, 1..6), 1..8),
    ) {
        let gate = AdmissionGate::new(capacity).unwrap();
        let holding = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = holds
            .into_iter()
            .map(|schedule| {
                let gate = gate.clone();
                let holding = holding.clone();
                let peak = peak.clone();
                thread::spawn(move || {
                    for micros in schedule {
                        let permit = gate.acquire();
                        let now = holding.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        assert!(gate.checked_out() <= gate.capacity());
                        thread::sleep(Duration::from_micros(micros));
                        holding.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        prop_assert!(peak.load(Ordering::SeqCst) <= capacity);
        prop_assert_eq!(gate.available(), capacity);
    }

    #[test]
    fn admitted_total_counts_every_acquire(capacity in 1usize..5, rounds in 1usize..20) {
        let gate = AdmissionGate::new(capacity).unwrap();
        for _ in 0..rounds {
            let _permit = gate.acquire();
        }
        let stats = gate.stats();
        prop_assert_eq!(stats.admitted_total, rounds as u64);
        prop_assert_eq!(stats.checked_out, 0);
        prop_assert_eq!(stats.inflight, rounds % capacity);
    }
}

#[test]
fn clones_share_one_pool() {
    let gate = AdmissionGate::new(1).unwrap();
    let other = gate.clone();
    let _held = gate.acquire();
    assert!(other.try_acquire().is_none());
}
