use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::time::{Duration, Instant};

pub trait SaltChecker: Send + Sync + Debug {
    fn insert_and_check(&mut self, salt: &[u8]) -> bool;
}

#[derive(Debug)]
struct TimeEntry {
    instant: Instant,
    salt: Box<[u8]>,
}

#[derive(Debug)]
pub struct TimedSaltChecker {
    last_salts: VecDeque<TimeEntry>,
    known_salts: HashSet<Box<[u8]>>,
    window: Duration,
}

impl TimedSaltChecker {
    pub fn new(window: Duration) -> Self {
        Self {
            last_salts: VecDeque::with_capacity(2000),
            known_salts: HashSet::with_capacity(2000),
            window,
        }
    }

    pub fn len(&self) -> usize {
        self.known_salts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known_salts.is_empty()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(time_entry) = self.last_salts.front() {
            if now.duration_since(time_entry.instant) < self.window {
                break;
            }
            self.known_salts.remove(&time_entry.salt);
            self.last_salts.pop_front();
        }
    }
}

impl SaltChecker for TimedSaltChecker {
    fn insert_and_check(&mut self, salt: &[u8]) -> bool {
        let now = Instant::now();
        self.expire(now);

        if self.known_salts.contains(salt) {
            return false;
        }

        let salt: Box<[u8]> = salt.into();
        self.known_salts.insert(salt.clone());
        self.last_salts.push_back(TimeEntry { instant: now, salt });

        true
    }
}
