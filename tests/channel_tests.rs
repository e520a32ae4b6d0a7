use imgflow::runtime::{BoundedChannel, TryAdd};
use imgflow::{ChannelError, runtime::SequenceGenerator};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// --- capacity and ordering ---

#[test]
fn test_fifo_order() {
    let ch = BoundedChannel::new(4);
    for i in 0..4 {
        ch.add(i).unwrap();
    }
    let got: Vec<i32> = (0..4).map(|_| ch.take().unwrap()).collect();
    assert_eq!(got, vec![0, 1, 2, 3]);
}

#[test]
fn test_try_add_full_hands_item_back() {
    let ch = BoundedChannel::new(1);
    ch.add("a").unwrap();
    let start = Instant::now();
    let r = ch.try_add("b", Duration::from_millis(50)).unwrap();
    assert_eq!(r, TryAdd::Full("b"));
    assert!(start.elapsed() >= Duration::from_millis(40));
    assert_eq!(ch.len(), 1);
}

#[test]
fn test_capacity_two_add_blocks_until_take() {
    let ch = Arc::new(BoundedChannel::new(2));
    ch.add('A').unwrap();
    ch.add('B').unwrap();

    let adder = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || ch.add('C'))
    };
    thread::sleep(Duration::from_millis(100));
    assert!(!adder.is_finished(), "third add must block on a full channel");
    assert_eq!(ch.len(), 2);

    assert_eq!(ch.take().unwrap(), 'A');
    adder.join().unwrap().unwrap();
    assert_eq!(ch.len(), 2);
    assert_eq!(ch.take().unwrap(), 'B');
    assert_eq!(ch.take().unwrap(), 'C');
}

#[test]
fn test_capacity_never_exceeded_under_contention() {
    let ch = Arc::new(BoundedChannel::new(3));
    let producers: Vec<_> = (0..4)
        .map(|p| {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                for i in 0..50 {
                    ch.add(p * 100 + i).unwrap();
                    assert!(ch.len() <= ch.capacity());
                }
            })
        })
        .collect();
    let mut taken = 0;
    while taken < 200 {
        assert!(ch.len() <= 3);
        ch.take().unwrap();
        taken += 1;
    }
    for p in producers {
        p.join().unwrap();
    }
    assert!(ch.is_empty());
}

#[test]
#[should_panic]
fn test_zero_capacity_rejected() {
    let _ = BoundedChannel::<u8>::new(0);
}

// --- concurrent producers and consumers ---

#[test]
fn test_no_item_lost_or_duplicated() {
    let ch = Arc::new(BoundedChannel::new(5));
    let ids = Arc::new(SequenceGenerator::new());
    let producers: Vec<_> = (0..3)
        .map(|_| {
            let ch = Arc::clone(&ch);
            let ids = Arc::clone(&ids);
            thread::spawn(move || {
                for _ in 0..100 {
                    ch.add(ids.next_id()).unwrap();
                }
            })
        })
        .collect();
    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let ch = Arc::clone(&ch);
            thread::spawn(move || {
                let mut got = Vec::new();
                loop {
                    match ch.take() {
                        Ok(v) => got.push(v),
                        Err(ChannelError::EndOfChannel) => return got,
                        Err(e) => panic!("unexpected {e}"),
                    }
                }
            })
        })
        .collect();
    for p in producers {
        p.join().unwrap();
    }
    ch.complete();

    let mut seen = HashSet::new();
    for c in consumers {
        for v in c.join().unwrap() {
            assert!(seen.insert(v), "item {v} taken twice");
        }
    }
    assert_eq!(seen.len(), 300);
    assert_eq!(ids.peek(), 300);
}

// --- completion ---

#[test]
fn test_complete_drains_then_ends() {
    let ch = BoundedChannel::new(3);
    ch.add(1).unwrap();
    ch.add(2).unwrap();
    ch.complete();
    assert!(ch.is_completed());
    assert!(!ch.is_drained());
    assert_eq!(ch.take().unwrap(), 1);
    assert_eq!(ch.take().unwrap(), 2);
    assert!(ch.is_drained());
    assert_eq!(ch.take(), Err(ChannelError::EndOfChannel));
    assert_eq!(
        ch.try_take(Duration::from_millis(10)),
        Err(ChannelError::EndOfChannel)
    );
}

#[test]
fn test_add_after_complete_is_invalid_state() {
    let ch = BoundedChannel::new(2);
    ch.complete();
    ch.complete();
    assert_eq!(ch.add(1), Err(ChannelError::InvalidState));
    assert_eq!(
        ch.try_add(1, Duration::from_millis(10)),
        Err(ChannelError::InvalidState)
    );
}

#[test]
fn test_complete_wakes_blocked_adder() {
    let ch = Arc::new(BoundedChannel::new(1));
    ch.add(0).unwrap();
    let adder = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || ch.add(1))
    };
    thread::sleep(Duration::from_millis(50));
    ch.complete();
    assert_eq!(adder.join().unwrap(), Err(ChannelError::InvalidState));
}

#[test]
fn test_complete_wakes_blocked_taker() {
    let ch = Arc::new(BoundedChannel::<u8>::new(1));
    let taker = {
        let ch = Arc::clone(&ch);
        thread::spawn(move || ch.take())
    };
    thread::sleep(Duration::from_millis(50));
    ch.complete();
    assert_eq!(taker.join().unwrap(), Err(ChannelError::EndOfChannel));
}

#[test]
fn test_try_take_times_out_on_empty_open_channel() {
    let ch = BoundedChannel::<u8>::new(1);
    let start = Instant::now();
    assert_eq!(ch.try_take(Duration::from_millis(50)).unwrap(), None);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

// --- sequence generator ---

#[test]
fn test_sequence_generator_unique_across_threads() {
    let ids = Arc::new(SequenceGenerator::starting_at(10));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ids = Arc::clone(&ids);
            thread::spawn(move || (0..25).map(|_| ids.next_id()).collect::<Vec<_>>())
        })
        .collect();
    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    assert_eq!(all, (10..110).collect::<Vec<_>>());
}
