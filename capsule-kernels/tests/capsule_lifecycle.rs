// Lifecycle and accounting checks against the public API
use capsule_kernels::host::{filter_line, filter_neighbourhoods, transform_coordinates};
use capsule_kernels::kernels::{builtin_capsule, Kernel};
use capsule_kernels::{
    BlobAllocator, BudgetAllocator, Capsule, CapsuleError, ContextData, CountingAllocator,
};
use std::sync::Arc;
use std::thread;

fn contexts() -> Vec<ContextData> {
    vec![
        ContextData::window(3),
        ContextData::weights(vec![0.5, 0.5, 0.5]),
        ContextData::shift(2.0),
    ]
}

#[test]
fn repeated_create_release_cycles_do_not_leak() {
    let counter = Arc::new(CountingAllocator::new());

    for _ in 0..1000 {
        for data in contexts() {
            let mut capsule = builtin_capsule(&data, counter.clone()).unwrap();
            assert!(capsule.release());
        }
    }

    let stats = counter.stats();
    assert_eq!(stats.allocations, 3000);
    assert_eq!(stats.deallocations, 3000);
    assert_eq!(stats.live_bytes, 0);
}

#[test]
fn double_release_frees_exactly_once() {
    let counter = Arc::new(CountingAllocator::new());
    let mut capsule = builtin_capsule(&ContextData::window(2), counter.clone()).unwrap();

    assert!(capsule.release());
    assert!(!capsule.release());
    drop(capsule);

    assert_eq!(counter.stats().deallocations, 1);
}

#[test]
fn unsatisfiable_allocation_leaves_no_capsule() {
    let counter = Arc::new(CountingAllocator::wrap(BudgetAllocator::new(0)));

    for data in contexts() {
        let err = builtin_capsule(&data, counter.clone()).unwrap_err();
        assert!(matches!(err, CapsuleError::AllocationError { .. }));
    }

    let stats = counter.stats();
    assert_eq!(stats.failed, 3);
    assert_eq!(stats.allocations, 0);
    assert_eq!(stats.live_bytes, 0);
}

#[test]
fn budget_is_returned_when_capsules_drop() {
    let budget = Arc::new(BudgetAllocator::new(64));
    let shared: Arc<dyn BlobAllocator> = budget.clone();

    let capsules: Vec<Capsule> = (1..=8)
        .map(|w| builtin_capsule(&ContextData::window(w), shared.clone()).unwrap())
        .collect();
    assert_eq!(budget.in_use(), 64);
    assert!(builtin_capsule(&ContextData::window(9), shared.clone()).is_err());

    drop(capsules);
    assert_eq!(budget.in_use(), 0);
    assert!(builtin_capsule(&ContextData::window(9), shared).is_ok());
}

#[test]
fn documented_kernel_results() {
    let alloc = Arc::new(CountingAllocator::new());

    let average = builtin_capsule(&ContextData::window(3), alloc.clone()).unwrap();
    assert_eq!(
        filter_line(&average, &[1.0, 2.0, 3.0, 4.0, 5.0], 3).unwrap(),
        vec![2.0, 3.0, 4.0]
    );

    let stencil = builtin_capsule(&ContextData::weights(vec![0.5, 0.5, 0.5]), alloc.clone())
        .unwrap();
    assert_eq!(stencil.call_stencil(&[1.0, 2.0, 3.0]).unwrap(), 3.0);

    let shift = builtin_capsule(&ContextData::shift(2.0), alloc).unwrap();
    assert_eq!(
        transform_coordinates(&shift, &[vec![5, 5]], 2).unwrap(),
        vec![vec![3.0, 3.0]]
    );
}

#[test]
fn concurrent_invocations_share_one_capsule() {
    let capsule = Arc::new(
        Capsule::create(Kernel::WeightedStencil, &ContextData::weights(vec![1.0, -1.0])).unwrap(),
    );
    let input: Vec<f64> = (0..64).map(|i| (i * i) as f64).collect();
    let expected = filter_neighbourhoods(&capsule, &input, 2).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let capsule = Arc::clone(&capsule);
            let input = input.clone();
            thread::spawn(move || filter_neighbourhoods(&capsule, &input, 2).unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn mismatched_kernel_and_context_are_rejected() {
    let counter = Arc::new(CountingAllocator::new());
    // A stencil would read the window value as its weight count.
    let err = Capsule::create_in(Kernel::WeightedStencil, &ContextData::window(3), counter.clone())
        .unwrap_err();
    assert!(matches!(err, CapsuleError::InvalidContext(_)));
    assert_eq!(counter.stats().allocations, 0);

    let stencil = builtin_capsule(&ContextData::weights(vec![1.0, 1.0, 1.0]), counter.clone())
        .unwrap();
    assert_eq!(stencil.call_stencil(&[1.0, 1.0, 1.0]).unwrap(), 3.0);
}
