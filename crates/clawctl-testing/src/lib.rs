//! Shared fixtures for integration tests: throwaway runtime homes with
//! session JSONL trees (append/rewrite/mtime control included) and a
//! scripted stand-in for the external runtime binary, so dispatch and
//! status paths can be exercised without a real runtime installed.

mod fake_runtime;
mod world;

pub use fake_runtime::{CommandScript, FakeRuntime};
pub use world::TestWorld;
