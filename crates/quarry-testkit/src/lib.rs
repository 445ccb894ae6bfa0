//! # Quarry Testkit
//!
//! Testing utilities for the quarry workspace.
//!
//! - **Fixtures**: deterministic logbooks and recording buses for
//!   integration scenarios
//! - **Generators**: proptest strategies over op payloads and chains
//!
//! ```rust
//! use quarry_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new(1, "alice");
//! assert_eq!(fixture.book.username(), "alice");
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{multi_party_fixtures, TestFixture};
pub use generators::{chain_from_params, ChainParams};
