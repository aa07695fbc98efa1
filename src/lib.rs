// Cooperative task queues, deferred callbacks and software timers
// for single-core embedded targets (ESP32-C3 and friends).

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

pub mod kernel;
