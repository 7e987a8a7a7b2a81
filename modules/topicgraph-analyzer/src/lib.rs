pub mod assembler;
pub mod coordinator;
pub mod decoder;
pub mod extractor;
pub mod filter;
pub mod ingest;
pub mod pipeline;
pub mod queue;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
