//! # RA Lightning Gateway Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── benches/          # Table and codec throughput (criterion)
//! └── src/integration/  # Gateway flows over the in-memory transport
//!     ├── flows.rs          # Request/response, chaining, timeout scenarios
//!     ├── concurrency.rs    # Racing dispatch, response, timeout, cancel
//!     └── properties.rs     # Exactly-once settlement under random schedules
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p ra-lnd-tests
//! cargo test -p ra-lnd-tests integration::flows::
//! cargo bench -p ra-lnd-tests
//! ```

#![allow(dead_code)]

pub mod integration;
