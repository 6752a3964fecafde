//! Generic concurrency primitives used by the shared-file index. None of
//! these types know anything about Soulseek; they are reused wherever the
//! scanner, repository, and service layer need a worker-pool fan-out
//! channel, a keyed rendezvous, an observable cell, or a rate limiter.

pub mod channel_reader;
pub mod managed_state;
pub mod token_bucket;
pub mod wait_key;
pub mod waiter;

pub use channel_reader::ChannelReader;
pub use managed_state::ManagedState;
pub use token_bucket::TokenBucket;
pub use wait_key::WaitKey;
pub use waiter::Waiter;
