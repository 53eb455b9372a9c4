// Cross-process-shaped shared-memory ring round trip, simulated with two
// independent `ShmRing` handles attached to the same segment name in one
// process — spawning a second OS process is outside what an integration
// test harness can assert on deterministically (see DESIGN.md).

use ferrolog::shm::ring::{ShmReadOutcome, ShmRing, ShmWriteOutcome};

fn unique_name(tag: &str) -> String {
    format!("/ferrolog-test-{tag}-{}", std::process::id())
}

#[test]
fn two_handles_on_the_same_segment_see_each_others_writes() {
    let name = unique_name("roundtrip");
    let writer = ShmRing::create_or_attach(&name, 4096, None).unwrap();
    let reader = ShmRing::create_or_attach(&name, 4096, None).unwrap();

    assert_eq!(writer.write(b"hello"), ShmWriteOutcome::Written);
    assert_eq!(writer.write(b"world"), ShmWriteOutcome::Written);

    let mut seen = Vec::new();
    for _ in 0..2 {
        let outcome = reader.read_next(|payload| {
            seen.push(payload.to_vec());
            true
        });
        assert_eq!(outcome, ShmReadOutcome::Next(true));
    }

    assert_eq!(seen, vec![b"hello".to_vec(), b"world".to_vec()]);

    let _ = ferrolog::shm::ring::unlink(&name);
}

#[test]
fn reading_an_empty_ring_reports_again() {
    let name = unique_name("empty");
    let ring = ShmRing::create_or_attach(&name, 4096, None).unwrap();

    let outcome = ring.read_next(|_| true);
    assert_eq!(outcome, ShmReadOutcome::Again);

    let _ = ferrolog::shm::ring::unlink(&name);
}

#[test]
fn fresh_create_reports_created_true_on_first_attach() {
    let name = unique_name("created-flag");
    let first = ShmRing::create_or_attach(&name, 4096, None).unwrap();
    assert!(first.created());

    let second = ShmRing::create_or_attach(&name, 4096, None).unwrap();
    assert!(!second.created());

    let _ = ferrolog::shm::ring::unlink(&name);
}
