//! Cryptographic utilities shared by the whole OT/triple stack: the 128-bit
//! [Block] type, the AES-backed cipher and correlation-robust hash, the
//! seedable [AesPrg](prg::AesPrg), the commit-open public-seed agreement and
//! the async double buffer.

pub mod aes;
pub mod async_buffer;
pub mod block;
pub mod prg;
pub mod seed_agreement;

pub use aes::{Aes, Expander};
pub use block::{random_block_from_entropy, Block};
pub use prg::AesPrg;
