//! Fuzz target: `EventQueue`
//!
//! Replays arbitrary push / pop / clear sequences against a small queue
//! and a `VecDeque` model, verifying:
//! - No panics under any sequence
//! - `len()` never exceeds capacity
//! - Pops come out in the model's order (oldest surviving first)
//!
//! cargo fuzz run fuzz_event_queue

#![no_main]

use std::collections::VecDeque;

use libfuzzer_sys::fuzz_target;
use powerpath::{Event, EventQueue};

const CAP: usize = 4;

fuzz_target!(|data: &[u8]| {
    let queue: EventQueue<CAP> = EventQueue::new();
    let mut model: VecDeque<Event> = VecDeque::new();

    for &byte in data {
        match byte {
            0xFF => {
                queue.clear();
                model.clear();
            }
            0xF0..=0xFE => {
                assert_eq!(queue.pop(), model.pop_front());
            }
            tag => {
                let Some(event) = Event::from_u8(tag) else {
                    continue;
                };
                let overwritten = queue.push(event);
                if model.len() == CAP {
                    assert_eq!(overwritten, model.pop_front());
                } else {
                    assert_eq!(overwritten, None);
                }
                model.push_back(event);
            }
        }
        assert!(queue.len() <= queue.capacity());
        assert_eq!(queue.len(), model.len());
    }
});
