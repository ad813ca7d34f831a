// tests/sentinel_chunking.rs

use std::time::Duration;

use proptest::prelude::*;
use t32ctl::output::{MemoryPipe, OutputChannel, SentinelMatcher};

const SENTINEL: &[u8] = b"QXZQXZKW";

// Payload drawn from an alphabet that shares letters with the sentinel, so
// partial matches show up often.
fn payload() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(prop::sample::select(b"QXZKWab\n".to_vec()), 0..200)
        .prop_filter("payload must not contain the sentinel", |bytes| {
            !bytes.windows(SENTINEL.len()).any(|w| w == SENTINEL)
        })
}

/// Cut `bytes` at the given (unsorted, possibly repeated) offsets.
fn split_at_points(bytes: &[u8], mut cuts: Vec<usize>) -> Vec<Vec<u8>> {
    cuts.iter_mut().for_each(|c| *c %= bytes.len() + 1);
    cuts.sort_unstable();
    cuts.dedup();

    let mut chunks = Vec::new();
    let mut start = 0;
    for cut in cuts {
        chunks.push(bytes[start..cut].to_vec());
        start = cut;
    }
    chunks.push(bytes[start..].to_vec());
    chunks
}

proptest! {
    #[test]
    fn output_is_independent_of_chunking(
        data in payload(),
        trailer in proptest::collection::vec(any::<u8>(), 0..20),
        cuts in proptest::collection::vec(any::<usize>(), 0..12),
    ) {
        let mut stream = data.clone();
        stream.extend_from_slice(SENTINEL);
        stream.extend_from_slice(&trailer);

        let mut matcher = SentinelMatcher::new(SENTINEL);
        let mut emitted = Vec::new();
        let mut hits = 0;
        for chunk in split_at_points(&stream, cuts) {
            if matcher.is_found() {
                break;
            }
            let step = matcher.push(&chunk);
            emitted.extend_from_slice(&step.emit);
            if step.found {
                hits += 1;
            }
        }

        prop_assert!(matcher.is_found());
        prop_assert_eq!(hits, 1);
        prop_assert_eq!(emitted, data);
    }
}

#[tokio::test]
async fn sentinel_split_across_reads_is_found() {
    let pipe = MemoryPipe::new("/virtual/pipe");
    for chunk in [&b"ABCDE"[..], b"FGH", b"IJ"] {
        pipe.push(chunk);
    }
    let mut output = OutputChannel::new(pipe, 64);
    let collected = output
        .read_until(b"EFGHI", Duration::from_millis(1))
        .collect()
        .await
        .unwrap();
    assert_eq!(collected, b"ABCD");
}
